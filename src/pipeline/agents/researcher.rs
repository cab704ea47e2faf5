//! 检索代理
//!
//! 按主题检索arXiv、下载PDF并提取正文，随后对提取成功的论文
//! 构建语义索引。单篇失败降级为带原因的失败记录，索引构建失败
//! 降级为无索引，只有检索零结果才以failed阶段提前终止。

use anyhow::Result;
use async_trait::async_trait;

use crate::arxiv::PaperMeta;
use crate::index::VectorStore;
use crate::pdf;
use crate::pipeline::agents::PipelineAgent;
use crate::pipeline::context::JobContext;
use crate::pipeline::state::{
    ErrorEntry, ExtractionStatus, PaperRecord, ResearchState, Stage, StateDelta,
};

pub struct ResearcherAgent;

impl ResearcherAgent {
    /// 没有正文的最小失败记录，保留元数据供报告引用
    fn failed_record(meta: &PaperMeta, citation: String, reason: &str) -> PaperRecord {
        PaperRecord {
            arxiv_id: meta.arxiv_id.clone(),
            title: meta.title.clone(),
            authors: meta.authors.clone(),
            year: meta.year(),
            summary: meta.summary.clone(),
            pdf_path: None,
            citation,
            extraction_status: ExtractionStatus::Failed(reason.to_string()),
            text: None,
        }
    }
}

#[async_trait]
impl PipelineAgent for ResearcherAgent {
    fn name(&self) -> &'static str {
        "researcher"
    }

    async fn execute(&self, ctx: &JobContext, state: &ResearchState) -> Result<StateDelta> {
        println!("📚 检索阶段: '{}'", state.topic);

        let candidates = ctx.papers.search(&state.topic, state.max_papers).await?;
        if candidates.is_empty() {
            return Ok(StateDelta {
                error_log: vec![ErrorEntry {
                    arxiv_id: None,
                    error: format!("No papers found for topic: {}", state.topic),
                    stage: "research".to_string(),
                }],
                processing_stage: Stage::Failed,
                ..Default::default()
            });
        }

        let pdf_dir = ctx.config.job_pdf_dir(&state.job_id)?;
        let mut documents = Vec::new();
        let mut error_log = Vec::new();

        for meta in &candidates {
            let citation = pdf::format_citation(&meta.authors, meta.year(), &meta.arxiv_id);
            let dest = pdf_dir.join(format!("{}.pdf", meta.arxiv_id.replace('/', "_")));

            // 已有缓存就不再下载
            let available = dest.exists() || ctx.papers.fetch_pdf(&meta.pdf_url, &dest).await;
            if !available {
                error_log.push(ErrorEntry {
                    arxiv_id: Some(meta.arxiv_id.clone()),
                    error: format!("PDF download failed: {}", meta.pdf_url),
                    stage: "pdf_download".to_string(),
                });
                documents.push(Self::failed_record(meta, citation, "PDF download failed"));
                continue;
            }

            match pdf::extract_text(&dest, ctx.config.research.min_text_length) {
                Ok(text) => {
                    println!("  ✓ {} ({} 字符)", meta.arxiv_id, text.len());
                    documents.push(PaperRecord {
                        arxiv_id: meta.arxiv_id.clone(),
                        title: meta.title.clone(),
                        authors: meta.authors.clone(),
                        year: meta.year(),
                        summary: meta.summary.clone(),
                        pdf_path: Some(dest),
                        citation,
                        extraction_status: ExtractionStatus::Success,
                        text: Some(text),
                    });
                }
                Err(e) => {
                    eprintln!("  ❌ {} 正文提取失败: {}", meta.arxiv_id, e);
                    error_log.push(ErrorEntry {
                        arxiv_id: Some(meta.arxiv_id.clone()),
                        error: format!("Text extraction failed: {}", e),
                        stage: "pdf_extraction".to_string(),
                    });
                    documents.push(Self::failed_record(meta, citation, "text extraction failed"));
                }
            }
        }

        // 索引构建失败降级为无索引，后续阶段各自短路，作业不中断
        let successes = documents.iter().filter(|d| d.is_success()).count();
        let index_path = if successes > 0 {
            let mut store = VectorStore::new(&ctx.config);
            match store.build_index(&documents, &state.job_id).await {
                Ok(path) => Some(path),
                Err(e) => {
                    eprintln!("  ❌ 索引构建失败: {}", e);
                    error_log.push(ErrorEntry {
                        arxiv_id: None,
                        error: format!("Index build failed: {}", e),
                        stage: "index_build".to_string(),
                    });
                    None
                }
            }
        } else {
            error_log.push(ErrorEntry {
                arxiv_id: None,
                error: "No paper text was extracted, skipping index build".to_string(),
                stage: "index_build".to_string(),
            });
            None
        };
        println!("📚 检索完成: {}/{} 篇提取成功", successes, documents.len());

        Ok(StateDelta {
            documents,
            error_log,
            index_path,
            processing_stage: Stage::Analyzing,
            ..Default::default()
        })
    }
}
