//! 流程编排器
//!
//! 以固定顺序驱动四个阶段代理，把每个阶段的增量按流式逐个吐出。
//! 消费方拿到的是(阶段名, 增量)对，自行调用`ResearchState::apply`
//! 维护快照。failed增量或代理硬错误都会提前收束流。

use anyhow::Result;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::pipeline::agents::{
    AnalyzerAgent, ComparatorAgent, PipelineAgent, ResearcherAgent, SynthesizerAgent,
};
use crate::pipeline::context::JobContext;
use crate::pipeline::state::{ResearchState, Stage, StateDelta};

/// 阶段事件：阶段代理名与其产出的状态增量
pub type StageEvent = (&'static str, StateDelta);

pub struct ResearchPipeline {
    ctx: Arc<JobContext>,
}

impl ResearchPipeline {
    pub fn new(ctx: Arc<JobContext>) -> Self {
        Self { ctx }
    }

    /// 启动一次研究作业，返回阶段增量流
    pub fn run(&self, job_id: &str, topic: &str, max_papers: usize) -> PipelineStream {
        let (tx, rx) = mpsc::channel::<Result<StageEvent>>(1);
        let ctx = Arc::clone(&self.ctx);
        let mut state = ResearchState::new(job_id, topic, max_papers);

        let handle = tokio::spawn(async move {
            let agents: Vec<Box<dyn PipelineAgent>> = vec![
                Box::new(ResearcherAgent),
                Box::new(AnalyzerAgent),
                Box::new(ComparatorAgent),
                Box::new(SynthesizerAgent),
            ];

            for agent in agents {
                let delta = match agent.execute(&ctx, &state).await {
                    Ok(delta) => delta,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };

                let stage = delta.processing_stage;
                if tx.send(Ok((agent.name(), delta.clone()))).await.is_err() {
                    // 消费方已放弃，停止推进
                    return;
                }
                state = state.apply(delta);

                if stage == Stage::Failed {
                    return;
                }
            }
        });

        PipelineStream { rx, _handle: handle }
    }
}

/// 阶段增量流
///
/// 通道容量为1，生产端与消费端步调耦合，不会积压整条流水线的增量。
pub struct PipelineStream {
    rx: mpsc::Receiver<Result<StageEvent>>,
    _handle: JoinHandle<()>,
}

impl Stream for PipelineStream {
    type Item = Result<StageEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
