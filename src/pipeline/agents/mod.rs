//! 阶段代理
//!
//! 每个代理对应流程中的一个阶段：检索、模式分析、指标对比、综合。
//! 代理读取当前状态快照，产出自己的增量，由编排器负责合并与推进。

pub mod analyzer;
pub mod comparator;
pub mod researcher;
pub mod synthesizer;

use anyhow::Result;
use async_trait::async_trait;

use crate::pipeline::context::JobContext;
use crate::pipeline::state::{ResearchState, StateDelta};

pub use analyzer::AnalyzerAgent;
pub use comparator::ComparatorAgent;
pub use researcher::ResearcherAgent;
pub use synthesizer::SynthesizerAgent;

/// 阶段代理契约
#[async_trait]
pub trait PipelineAgent: Send + Sync {
    fn name(&self) -> &'static str;

    /// 基于当前状态快照执行本阶段，返回状态增量
    async fn execute(&self, ctx: &JobContext, state: &ResearchState) -> Result<StateDelta>;
}
