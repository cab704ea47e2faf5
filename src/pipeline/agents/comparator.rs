//! 指标对比代理
//!
//! 逐篇检索定量结果片段，让LLM抽取`name: value`指标行，
//! 汇总成稀疏对比表。指标列在运行时发现，没有固定schema。

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

use crate::index::{SearchHit, VectorStore};
use crate::llm::response::{self, METRICS_SENTINEL};
use crate::pipeline::agents::PipelineAgent;
use crate::pipeline::context::JobContext;
use crate::pipeline::state::{Comparison, MetricRow, ResearchState, Stage, StateDelta};

/// 定量结果的检索查询面
const METRIC_QUERIES: &[&str] = &[
    "experimental results with numbers",
    "performance metrics and measurements",
    "quantitative evaluation values",
];

// 检索深度要远大于单篇上限：全局top命中通常被一两篇论文占满，
// 浅检索会让排名靠后的论文一个自有块都捞不到
const METRIC_SEARCH_K: usize = 50;
const MAX_CHUNKS_PER_PAPER: usize = 5;
const CHUNKS_TO_LLM: usize = 3;
const SUMMARY_ROW_CAP: usize = 5;

const METRIC_SYSTEM: &str = "You extract quantitative metrics from research paper excerpts. \
You respond only with metric lines or the sentinel, never with prose.";

pub struct ComparatorAgent;

#[async_trait]
impl PipelineAgent for ComparatorAgent {
    fn name(&self) -> &'static str {
        "comparator"
    }

    async fn execute(&self, ctx: &JobContext, state: &ResearchState) -> Result<StateDelta> {
        println!("📊 指标对比阶段");

        let Some(index_path) = &state.index_path else {
            return Ok(StateDelta {
                comparison: Some(Comparison::default()),
                processing_stage: Stage::Synthesizing,
                ..Default::default()
            });
        };

        let mut store = VectorStore::new(&ctx.config);
        store.load_index(index_path)?;

        let mut metrics_table = Vec::new();
        let mut all_names: BTreeSet<String> = BTreeSet::new();

        for doc in state.documents.iter().filter(|d| d.is_success()) {
            let lines = self.extract_paper_metrics(ctx, &store, &doc.arxiv_id).await;
            if lines.is_empty() {
                continue;
            }

            let mut metrics = BTreeMap::new();
            for line in &lines {
                if let Some((name, value)) = response::split_metric_line(line) {
                    all_names.insert(name.clone());
                    metrics.insert(name, value);
                }
            }
            if metrics.is_empty() {
                continue;
            }
            metrics_table.push(MetricRow {
                paper: doc.citation.clone(),
                metrics,
            });
        }

        let metric_names: Vec<String> = all_names.into_iter().collect();
        println!(
            "  ✓ {} 篇论文, {} 个指标列",
            metrics_table.len(),
            metric_names.len()
        );

        let comparison_summary = self.summarize(ctx, &metrics_table).await;

        Ok(StateDelta {
            comparison: Some(Comparison {
                metrics_table,
                metric_names,
                comparison_summary,
            }),
            processing_stage: Stage::Synthesizing,
            ..Default::default()
        })
    }
}

impl ComparatorAgent {
    /// 检索本篇论文的定量片段并抽取去重后的指标行
    async fn extract_paper_metrics(
        &self,
        ctx: &JobContext,
        store: &VectorStore,
        arxiv_id: &str,
    ) -> Vec<String> {
        let mut own_chunks = Vec::new();
        for query in METRIC_QUERIES {
            let hits = match store.search(query, METRIC_SEARCH_K).await {
                Ok(hits) => hits,
                Err(e) => {
                    eprintln!("  ⚠️ 指标检索失败 '{}': {}", query, e);
                    continue;
                }
            };
            collect_own_chunks(hits, arxiv_id, &mut own_chunks, MAX_CHUNKS_PER_PAPER);
            if own_chunks.len() >= MAX_CHUNKS_PER_PAPER {
                break;
            }
        }
        if own_chunks.is_empty() {
            return Vec::new();
        }

        let excerpts = own_chunks
            .iter()
            .take(CHUNKS_TO_LLM)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n---\n");
        let prompt = format!(
            "Excerpts from one paper:\n\n{}\n\n\
             Extract every quantitative metric as one line in the form \
             `metric name: value with unit`. \
             Example: Energy density: 475 Wh/kg\n\
             If the excerpts contain no quantitative metrics, reply with exactly {}.",
            excerpts, METRICS_SENTINEL
        );

        match ctx.llm.generate_factual(METRIC_SYSTEM, &prompt).await {
            Ok(reply) => response::dedup_metrics(&response::parse_metric_lines(&reply)),
            Err(e) => {
                eprintln!("  ⚠️ 指标抽取失败 ({}): {}", arxiv_id, e);
                Vec::new()
            }
        }
    }

    /// 对比表的文字摘要，LLM不可用时退回计数模板
    async fn summarize(&self, ctx: &JobContext, rows: &[MetricRow]) -> String {
        let fallback = format!(
            "Extracted quantitative metrics from {} paper(s).",
            rows.len()
        );
        if rows.is_empty() {
            return fallback;
        }

        let table_text = rows
            .iter()
            .take(SUMMARY_ROW_CAP)
            .map(|row| {
                let cells = row
                    .metrics
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect::<Vec<_>>()
                    .join("; ");
                format!("{} | {}", row.paper, cells)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Metric table:\n{}\n\n\
             Write a 2-3 sentence comparison of these papers based only on the table.",
            table_text
        );
        match ctx.llm.generate(METRIC_SYSTEM, &prompt).await {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                eprintln!("  ⚠️ 对比摘要失败: {}", e);
                fallback
            }
        }
    }
}

/// 从按距离排序的命中中按序收集本篇论文的块，不超过cap
fn collect_own_chunks(
    hits: Vec<SearchHit>,
    arxiv_id: &str,
    own_chunks: &mut Vec<String>,
    cap: usize,
) {
    for hit in hits {
        if own_chunks.len() >= cap {
            break;
        }
        if hit.chunk.arxiv_id == arxiv_id {
            own_chunks.push(hit.chunk.text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ChunkMeta, VectorIndex};

    fn chunk(id: &str, n: usize) -> ChunkMeta {
        ChunkMeta {
            arxiv_id: id.to_string(),
            title: format!("paper {}", id),
            citation: format!("[X, 2024, arXiv:{}]", id),
            chunk_id: n,
            text: format!("chunk {} of {}", n, id),
        }
    }

    #[test]
    fn test_deeply_ranked_paper_still_yields_own_chunks() {
        // 一篇论文霸占全局top命中时，另一篇的块排在第5名之外
        let mut index = VectorIndex::new(2);
        for n in 0..6 {
            index.push(vec![0.0, n as f32 * 0.01], chunk("dominant", n));
        }
        index.push(vec![5.0, 0.0], chunk("quiet", 0));
        index.push(vec![5.0, 1.0], chunk("quiet", 1));

        let hits = index.nearest(&[0.0, 0.0], METRIC_SEARCH_K);
        assert!(hits[..5].iter().all(|h| h.chunk.arxiv_id == "dominant"));

        let mut own_chunks = Vec::new();
        collect_own_chunks(hits, "quiet", &mut own_chunks, MAX_CHUNKS_PER_PAPER);
        assert_eq!(own_chunks.len(), 2);
        assert!(own_chunks.iter().all(|text| text.ends_with("of quiet")));
    }

    #[test]
    fn test_own_chunk_cap_is_respected() {
        let hits: Vec<SearchHit> = (0..10)
            .map(|n| SearchHit {
                chunk: chunk("a", n),
                distance: n as f32,
            })
            .collect();

        let mut own_chunks = Vec::new();
        collect_own_chunks(hits, "a", &mut own_chunks, MAX_CHUNKS_PER_PAPER);
        assert_eq!(own_chunks.len(), MAX_CHUNKS_PER_PAPER);
        assert_eq!(own_chunks[0], "chunk 0 of a");
    }
}
