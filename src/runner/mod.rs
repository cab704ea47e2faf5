//! 后台作业执行器
//!
//! 消费编排器的阶段增量流，把进度与终态写入作业台账。
//! 台账是唯一的对外进度出口，执行器自身不持有可查询状态。

use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;

use crate::error::ResearchError;
use crate::ledger::{JobStatus, JobStore, JobUpdate};
use crate::pipeline::state::Stage;
use crate::pipeline::{JobContext, ResearchPipeline, ResearchState};

const TOPIC_MIN_CHARS: usize = 3;
const TOPIC_MAX_CHARS: usize = 200;
const MAX_PAPERS_CEILING: usize = 10;

/// 入参校验，不合法的作业根本不该碰网络
pub fn validate_request(topic: &str, max_papers: usize) -> Result<(), ResearchError> {
    let trimmed = topic.trim();
    if trimmed.chars().count() < TOPIC_MIN_CHARS || trimmed.chars().count() > TOPIC_MAX_CHARS {
        return Err(ResearchError::Validation(format!(
            "topic must be {}..={} characters, got {}",
            TOPIC_MIN_CHARS,
            TOPIC_MAX_CHARS,
            trimmed.chars().count()
        )));
    }
    if max_papers < 1 || max_papers > MAX_PAPERS_CEILING {
        return Err(ResearchError::Validation(format!(
            "max_papers must be 1..={}, got {}",
            MAX_PAPERS_CEILING, max_papers
        )));
    }
    Ok(())
}

/// 阶段到进度百分比与进度消息的映射
fn stage_progress(stage: Stage) -> (u8, &'static str) {
    match stage {
        Stage::Researching => (10, "Searching arXiv and extracting paper text"),
        Stage::Analyzing => (40, "Extracting patterns from papers"),
        Stage::Comparing => (60, "Comparing quantitative metrics"),
        Stage::Synthesizing => (80, "Synthesizing research report"),
        Stage::Complete => (100, "Research complete"),
        Stage::Failed => (0, "Research failed"),
    }
}

/// 把执行错误归类为对外可读的失败消息
fn categorize(error: &anyhow::Error) -> String {
    match error.downcast_ref::<ResearchError>() {
        Some(e) => e.to_string(),
        None => format!("unexpected error: {}", error),
    }
}

/// 执行一个研究作业并把全程进度写入台账
///
/// 返回Err时台账已经写入失败终态，调用方不需要再补写。
pub async fn run_research_job(
    ctx: Arc<JobContext>,
    store: JobStore,
    job_id: &str,
    topic: &str,
    max_papers: usize,
) -> Result<()> {
    if let Err(e) = validate_request(topic, max_papers) {
        store.update_job(
            job_id,
            JobUpdate {
                error: Some(e.to_string()),
                progress_percentage: Some(0),
                current_message: Some("Request rejected".to_string()),
                ..Default::default()
            },
        )?;
        return Err(e.into());
    }

    let (progress, message) = stage_progress(Stage::Researching);
    store.update_job(
        job_id,
        JobUpdate {
            status: Some(JobStatus::Researching),
            processing_stage: Some(Stage::Researching.as_str().to_string()),
            progress_percentage: Some(progress),
            current_message: Some(message.to_string()),
            ..Default::default()
        },
    )?;

    let pipeline = ResearchPipeline::new(ctx);
    let mut stream = pipeline.run(job_id, topic, max_papers);
    let mut state = ResearchState::new(job_id, topic, max_papers);
    let mut reached_terminal = false;

    while let Some(event) = stream.next().await {
        let (agent_name, delta) = match event {
            Ok(event) => event,
            Err(e) => {
                let message = categorize(&e);
                store.update_job(
                    job_id,
                    JobUpdate {
                        error: Some(message),
                        progress_percentage: Some(0),
                        current_message: Some("Research failed".to_string()),
                        ..Default::default()
                    },
                )?;
                return Err(e);
            }
        };

        let stage = delta.processing_stage;
        state = state.apply(delta);

        match stage {
            Stage::Complete => {
                reached_terminal = true;
                state.strip_transients();
                let snapshot = serde_json::to_string(&state)?;
                let (progress, message) = stage_progress(stage);
                store.update_job(
                    job_id,
                    JobUpdate {
                        status: Some(JobStatus::Complete),
                        processing_stage: Some(stage.as_str().to_string()),
                        progress_percentage: Some(progress),
                        current_message: Some(message.to_string()),
                        final_state_json: Some(snapshot),
                        ..Default::default()
                    },
                )?;
            }
            Stage::Failed => {
                reached_terminal = true;
                let reason = state
                    .error_log
                    .last()
                    .map(|e| e.error.clone())
                    .unwrap_or_else(|| format!("{} stage failed", agent_name));
                state.strip_transients();
                let snapshot = serde_json::to_string(&state)?;
                store.update_job(
                    job_id,
                    JobUpdate {
                        error: Some(reason),
                        progress_percentage: Some(0),
                        current_message: Some("Research failed".to_string()),
                        final_state_json: Some(snapshot),
                        ..Default::default()
                    },
                )?;
            }
            stage => {
                let (progress, message) = stage_progress(stage);
                store.update_job(
                    job_id,
                    JobUpdate {
                        status: Some(match stage {
                            Stage::Analyzing => JobStatus::Analyzing,
                            Stage::Comparing => JobStatus::Comparing,
                            Stage::Synthesizing => JobStatus::Synthesizing,
                            _ => JobStatus::Researching,
                        }),
                        processing_stage: Some(stage.as_str().to_string()),
                        progress_percentage: Some(progress),
                        current_message: Some(message.to_string()),
                        ..Default::default()
                    },
                )?;
            }
        }
    }

    // 流在未到达终态前就枯竭属于异常，同样落为失败
    if !reached_terminal {
        store.update_job(
            job_id,
            JobUpdate {
                error: Some("pipeline ended before reaching a terminal stage".to_string()),
                progress_percentage: Some(0),
                current_message: Some("Research failed".to_string()),
                ..Default::default()
            },
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_request_bounds() {
        assert!(validate_request("solid state batteries", 5).is_ok());
        assert!(validate_request("ab", 5).is_err());
        assert!(validate_request(&"x".repeat(201), 5).is_err());
        assert!(validate_request("topic", 0).is_err());
        assert!(validate_request("topic", 11).is_err());
        // 边界值本身合法
        assert!(validate_request("abc", 1).is_ok());
        assert!(validate_request(&"x".repeat(200), 10).is_ok());
    }

    #[test]
    fn test_stage_progress_is_monotonic_until_terminal() {
        let stages = [
            Stage::Researching,
            Stage::Analyzing,
            Stage::Comparing,
            Stage::Synthesizing,
            Stage::Complete,
        ];
        let mut last = 0;
        for stage in stages {
            let (progress, _) = stage_progress(stage);
            assert!(progress > last);
            last = progress;
        }
        assert_eq!(stage_progress(Stage::Failed).0, 0);
    }

    #[test]
    fn test_categorize_known_errors() {
        let validation: anyhow::Error = ResearchError::Validation("bad topic".into()).into();
        assert!(categorize(&validation).starts_with("validation error"));

        let connectivity: anyhow::Error = ResearchError::Connectivity("llm down".into()).into();
        assert!(categorize(&connectivity).starts_with("connection failed"));

        let other = anyhow::anyhow!("boom");
        assert!(categorize(&other).starts_with("unexpected error"));
    }
}
