//! 离线端到端测试
//!
//! 用桩检索源驱动流水线，全程不碰网络：零结果作业必须以failed
//! 终态落进台账；下载失败的作业降级运行到底，靠模板报告收束为
//! complete。LLM重试参数调到最小，连接拒绝即快速失败。

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;

use researchmill::arxiv::{PaperMeta, PaperSource};
use researchmill::ledger::{JobStatus, JobStore};
use researchmill::pipeline::state::Stage;
use researchmill::pipeline::{JobContext, ResearchPipeline};
use researchmill::{Config, run_research_job};

struct EmptySource;

#[async_trait]
impl PaperSource for EmptySource {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<PaperMeta>> {
        Ok(Vec::new())
    }

    async fn fetch_pdf(&self, _pdf_url: &str, _dest: &Path) -> bool {
        false
    }
}

struct UnfetchableSource;

#[async_trait]
impl PaperSource for UnfetchableSource {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<PaperMeta>> {
        Ok(vec![PaperMeta {
            arxiv_id: "2401.12345".to_string(),
            title: "Solid-State Batteries: A Review".to_string(),
            authors: vec!["Alice Chen".to_string()],
            published: None,
            summary: "A review.".to_string(),
            pdf_url: "http://example.invalid/2401.12345.pdf".to_string(),
        }])
    }

    async fn fetch_pdf(&self, _pdf_url: &str, _dest: &Path) -> bool {
        false
    }
}

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.workspace_path = dir.to_path_buf();
    config.internal_path = dir.join(".researchmill");
    config.output_path = dir.join("reports");
    config.ledger.db_path = dir.join(".researchmill/jobs.db");
    config.llm.retry_attempts = 1;
    config.llm.retry_delay_ms = 1;
    config
}

fn test_context(dir: &Path, source: Arc<dyn PaperSource>) -> Arc<JobContext> {
    Arc::new(JobContext::with_source(test_config(dir), source).unwrap())
}

#[tokio::test]
async fn zero_search_results_end_the_stream_with_failed_stage() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path(), Arc::new(EmptySource));

    let pipeline = ResearchPipeline::new(ctx);
    let mut stream = pipeline.run("job-1", "solid state batteries", 3);

    let (agent, delta) = stream.next().await.unwrap().unwrap();
    assert_eq!(agent, "researcher");
    assert_eq!(delta.processing_stage, Stage::Failed);
    assert!(delta.documents.is_empty());
    assert_eq!(delta.error_log.len(), 1);
    assert!(delta.error_log[0].error.contains("No papers found"));

    // failed增量之后流必须收束，不再推进后续阶段
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn zero_search_results_are_recorded_as_failed_job() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path(), Arc::new(EmptySource));
    let store = JobStore::open_in_memory().unwrap();
    store.create_job("job-1", "solid state batteries", 3).unwrap();

    run_research_job(ctx, store.clone(), "job-1", "solid state batteries", 3)
        .await
        .unwrap();

    let job = store.get_job("job-1").unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress_percentage, 0);
    assert!(job.error.unwrap().contains("No papers found"));

    let snapshot: serde_json::Value =
        serde_json::from_str(&job.final_state_json.unwrap()).unwrap();
    assert_eq!(snapshot["documents"].as_array().unwrap().len(), 0);
    assert_eq!(snapshot["processing_stage"], "failed");
}

#[tokio::test]
async fn download_failure_degrades_and_stages_stay_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path(), Arc::new(UnfetchableSource));

    let pipeline = ResearchPipeline::new(ctx);
    let mut stream = pipeline.run("job-1", "solid state batteries", 3);

    let (agent, delta) = stream.next().await.unwrap().unwrap();
    assert_eq!(agent, "researcher");
    // 单篇下载失败不终止作业，阶段照常推进，只是没有索引
    assert_eq!(delta.processing_stage, Stage::Analyzing);
    assert_eq!(delta.documents.len(), 1);
    assert!(delta.index_path.is_none());

    let doc = &delta.documents[0];
    assert_eq!(doc.arxiv_id, "2401.12345");
    assert!(!doc.is_success());
    assert!(doc.text.is_none());
    assert!(doc.pdf_path.is_none());
    assert_eq!(doc.citation, "[Chen, 0, arXiv:2401.12345]");

    let download_errors: Vec<_> = delta
        .error_log
        .iter()
        .filter(|e| e.stage == "pdf_download")
        .collect();
    assert_eq!(download_errors.len(), 1);
    assert_eq!(download_errors[0].arxiv_id.as_deref(), Some("2401.12345"));

    // 剩余阶段在无索引下全部短路，阶段序号不回退，最终complete
    let mut last_rank = delta.processing_stage.rank();
    let mut last_stage = delta.processing_stage;
    while let Some(event) = stream.next().await {
        let (_, delta) = event.unwrap();
        assert!(delta.processing_stage.rank() >= last_rank);
        last_rank = delta.processing_stage.rank();
        last_stage = delta.processing_stage;
    }
    assert_eq!(last_stage, Stage::Complete);
}

#[tokio::test]
async fn degraded_job_completes_with_fallback_report() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path(), Arc::new(UnfetchableSource));
    let store = JobStore::open_in_memory().unwrap();
    store.create_job("job-1", "solid state batteries", 3).unwrap();

    run_research_job(ctx, store.clone(), "job-1", "solid state batteries", 3)
        .await
        .unwrap();

    let job = store.get_job("job-1").unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.progress_percentage, 100);
    assert!(job.error.is_none());

    let snapshot: serde_json::Value =
        serde_json::from_str(&job.final_state_json.unwrap()).unwrap();
    let doc = &snapshot["documents"][0];
    assert!(
        doc["extraction_status"]
            .as_str()
            .unwrap()
            .starts_with("failed")
    );
    // 快照里不允许携带全文字段
    assert!(doc.get("text").is_none());
    // 模板报告兜底，作业仍然有最终报告
    assert!(
        snapshot["final_report"]
            .as_str()
            .unwrap()
            .contains("solid state batteries")
    );

    // 完成作业的列表摘要能推导出成功与失败计数
    let summaries = store.job_summaries().unwrap();
    assert_eq!(summaries[0].papers_analyzed, Some(0));
    assert_eq!(summaries[0].papers_failed, Some(1));
}

#[tokio::test]
async fn invalid_requests_never_reach_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path(), Arc::new(EmptySource));
    let store = JobStore::open_in_memory().unwrap();
    store.create_job("job-1", "ab", 3).unwrap();

    let result = run_research_job(ctx, store.clone(), "job-1", "ab", 3).await;
    assert!(result.is_err());

    let job = store.get_job("job-1").unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress_percentage, 0);
    assert!(job.error.unwrap().starts_with("validation error"));
}
