//! 模式分析代理
//!
//! 在语义索引上做多路检索，驱动LLM抽取关键发现、判定发现间关系、
//! 归纳趋势、共识与研究空白。所有子流程都可降级为空结果，
//! 本阶段自身不会让作业失败。

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::index::{SearchHit, VectorStore};
use crate::llm::response::{
    self, FINDING_SENTINEL, ModelReply, RelationCategory,
};
use crate::pipeline::agents::PipelineAgent;
use crate::pipeline::context::JobContext;
use crate::pipeline::state::{
    Analysis, Complementary, Contradiction, Finding, ResearchState, Stage, StateDelta,
};

/// 关键发现的检索查询面
const KEY_FINDING_QUERIES: &[&str] = &[
    "main contribution of this work",
    "key experimental results",
    "performance improvement over baseline",
    "novel method or approach proposed",
    "quantitative evaluation results",
    "limitations and drawbacks",
    "comparison with state of the art",
    "dataset and benchmark used",
    "theoretical analysis and proofs",
    "ablation study results",
    "conclusions and implications",
];

/// 冲突信号的检索查询面
const CONFLICT_QUERIES: &[&str] = &[
    "contradictory or conflicting results",
    "disagreement with prior work",
    "results that challenge previous conclusions",
];

const SEARCH_K: usize = 50;
const CONFLICT_K: usize = 3;
const MIN_CHUNK_CHARS: usize = 200;
const MAX_PER_PAPER_PER_QUERY: usize = 3;
const DEDUP_PREFIX_CHARS: usize = 100;
const CHUNK_TARGET: usize = 20;
const FINDING_LLM_CAP: usize = 10;
const PAIR_BUDGET: usize = 5;

const FINDING_SYSTEM: &str = "You are a careful research analyst. \
You extract concrete, specific findings from paper excerpts. \
You never invent findings and you never make small talk.";

const RELATION_SYSTEM: &str = "You compare findings from different research papers. \
You respond only in the exact format requested.";

const THEME_SYSTEM: &str = "You summarize themes across research paper excerpts \
as short bullet points.";

pub struct AnalyzerAgent;

#[async_trait]
impl PipelineAgent for AnalyzerAgent {
    fn name(&self) -> &'static str {
        "analyzer"
    }

    async fn execute(&self, ctx: &JobContext, state: &ResearchState) -> Result<StateDelta> {
        println!("🔬 分析阶段");

        let Some(index_path) = &state.index_path else {
            // 没有索引就没有可分析的内容，直接空产物进入综合
            return Ok(StateDelta {
                analysis: Some(Analysis::default()),
                processing_stage: Stage::Synthesizing,
                ..Default::default()
            });
        };

        let mut store = VectorStore::new(&ctx.config);
        store.load_index(index_path)?;

        let key_findings = self.extract_key_findings(ctx, &store).await;
        println!("  ✓ 关键发现: {}", key_findings.len());

        let (contradictions, complementary_findings) = self.detect_relations(ctx, &store).await;
        println!(
            "  ✓ 矛盾: {}, 互补: {}",
            contradictions.len(),
            complementary_findings.len()
        );

        let trends = self
            .summarize_theme(ctx, &store, "emerging trends and future directions", "trends")
            .await;
        let consensus_points = self
            .summarize_theme(ctx, &store, "points of agreement across papers", "consensus")
            .await;
        let gaps = self
            .summarize_theme(ctx, &store, "open problems and unexplored questions", "gaps")
            .await;

        Ok(StateDelta {
            analysis: Some(Analysis {
                key_findings,
                contradictions,
                complementary_findings,
                trends,
                consensus_points,
                gaps,
            }),
            processing_stage: Stage::Comparing,
            ..Default::default()
        })
    }
}

impl AnalyzerAgent {
    /// 多路检索收集候选块，再按上限逐块抽取发现
    async fn extract_key_findings(&self, ctx: &JobContext, store: &VectorStore) -> Vec<Finding> {
        let mut seen_prefixes: BTreeSet<String> = BTreeSet::new();
        let mut candidates: Vec<SearchHit> = Vec::new();

        'queries: for query in KEY_FINDING_QUERIES {
            let hits = match store.search(query, SEARCH_K).await {
                Ok(hits) => hits,
                Err(e) => {
                    eprintln!("  ⚠️ 检索失败 '{}': {}", query, e);
                    continue;
                }
            };

            let mut per_paper_counts = std::collections::BTreeMap::new();
            for hit in hits {
                if hit.chunk.text.len() < MIN_CHUNK_CHARS {
                    continue;
                }
                let count = per_paper_counts
                    .entry(hit.chunk.arxiv_id.clone())
                    .or_insert(0usize);
                if *count >= MAX_PER_PAPER_PER_QUERY {
                    continue;
                }
                let prefix: String = hit.chunk.text.chars().take(DEDUP_PREFIX_CHARS).collect();
                if !seen_prefixes.insert(prefix) {
                    continue;
                }
                *count += 1;
                candidates.push(hit);
                if candidates.len() >= CHUNK_TARGET {
                    break 'queries;
                }
            }
        }

        let mut findings = Vec::new();
        for hit in candidates.into_iter().take(FINDING_LLM_CAP) {
            let prompt = format!(
                "Excerpt from {}:\n\n{}\n\n\
                 State ONE concrete finding from this excerpt in a single sentence. \
                 Include specific numbers or claims where present. \
                 If the excerpt contains no concrete finding, reply with exactly {}.",
                hit.chunk.citation, hit.chunk.text, FINDING_SENTINEL
            );
            let reply = match ctx.llm.generate_factual(FINDING_SYSTEM, &prompt).await {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("  ⚠️ 发现抽取失败: {}", e);
                    continue;
                }
            };
            if let ModelReply::FreeText(finding) = response::classify_finding(&reply) {
                findings.push(Finding {
                    finding,
                    citation: hit.chunk.citation.clone(),
                    arxiv_id: hit.chunk.arxiv_id.clone(),
                });
            }
        }
        findings
    }

    /// 冲突查询取回的块做跨论文无序配对，按论文对去重后送LLM四分类
    ///
    /// 同一对论文最多判定一次，判定总数受预算约束；
    /// 只认显式CATEGORY标签，只记录矛盾与互补两类。
    async fn detect_relations(
        &self,
        ctx: &JobContext,
        store: &VectorStore,
    ) -> (Vec<Contradiction>, Vec<Complementary>) {
        let mut contradictions = Vec::new();
        let mut complementary = Vec::new();

        let mut candidates: Vec<SearchHit> = Vec::new();
        for query in CONFLICT_QUERIES {
            match store.search(query, CONFLICT_K).await {
                Ok(hits) => candidates.extend(hits),
                Err(e) => eprintln!("  ⚠️ 冲突检索失败 '{}': {}", query, e),
            }
        }

        let source_ids: Vec<&str> = candidates
            .iter()
            .map(|hit| hit.chunk.arxiv_id.as_str())
            .collect();
        for (i, j) in select_cross_source_pairs(&source_ids, PAIR_BUDGET) {
            let a = &candidates[i].chunk;
            let b = &candidates[j].chunk;
            let excerpt_a: String = a.text.chars().take(600).collect();
            let excerpt_b: String = b.text.chars().take(600).collect();
            let prompt = format!(
                "Excerpt 1 {}: {}\n\nExcerpt 2 {}: {}\n\n\
                 Classify the relationship between the claims in Excerpt 1 and Excerpt 2. \
                 Respond in exactly this format:\n\
                 CATEGORY: <CONTRADICTION|COMPLEMENTARY|UNRELATED|INSUFFICIENT>\n\
                 EXPLANATION: <one sentence>\n\n\
                 Do NOT answer CONTRADICTION unless the two excerpts make directly \
                 incompatible claims about the same quantity or phenomenon. \
                 Differences in methodology, scope, dataset, or emphasis are NOT \
                 contradictions.",
                a.citation, excerpt_a, b.citation, excerpt_b
            );

            let reply = match ctx.llm.generate_factual(RELATION_SYSTEM, &prompt).await {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("  ⚠️ 关系判定失败: {}", e);
                    continue;
                }
            };

            match response::classify_relation(&reply) {
                ModelReply::Category(RelationCategory::Contradiction) => {
                    contradictions.push(Contradiction {
                        finding_1: excerpt_a.clone(),
                        finding_2: excerpt_b.clone(),
                        citation_1: a.citation.clone(),
                        citation_2: b.citation.clone(),
                        explanation: response::extract_explanation(&reply),
                    });
                }
                ModelReply::Category(RelationCategory::Complementary) => {
                    complementary.push(Complementary {
                        finding_1: excerpt_a.clone(),
                        finding_2: excerpt_b.clone(),
                        citation_1: a.citation.clone(),
                        citation_2: b.citation.clone(),
                        relationship: response::extract_explanation(&reply),
                    });
                }
                // unrelated、信息不足或自由文本一律丢弃
                _ => {}
            }
        }

        (contradictions, complementary)
    }

    /// 单查询主题归纳：取前3个命中摘要，要求最多3条要点
    async fn summarize_theme(
        &self,
        ctx: &JobContext,
        store: &VectorStore,
        query: &str,
        label: &str,
    ) -> Vec<String> {
        let hits = match store.search(query, 5).await {
            Ok(hits) => hits,
            Err(e) => {
                eprintln!("  ⚠️ {}检索失败: {}", label, e);
                return Vec::new();
            }
        };
        if hits.is_empty() {
            return Vec::new();
        }

        let excerpts: Vec<String> = hits
            .iter()
            .take(3)
            .map(|hit| {
                let excerpt: String = hit.chunk.text.chars().take(500).collect();
                format!("{} {}", hit.chunk.citation, excerpt)
            })
            .collect();

        let prompt = format!(
            "Excerpts:\n{}\n\nList at most 3 {} across these papers, \
             one bullet point each, grounded only in the excerpts.",
            excerpts.join("\n---\n"),
            label
        );

        match ctx.llm.generate_factual(THEME_SYSTEM, &prompt).await {
            Ok(reply) => response::parse_bullets(&reply, 3),
            Err(e) => {
                eprintln!("  ⚠️ {}归纳失败: {}", label, e);
                Vec::new()
            }
        }
    }
}

/// 按出现顺序挑选跨论文的无序配对
///
/// 同一篇论文内的配对跳过，同一对论文最多出现一次，总数不超过cap。
fn select_cross_source_pairs(source_ids: &[&str], cap: usize) -> Vec<(usize, usize)> {
    let mut judged: BTreeSet<(String, String)> = BTreeSet::new();
    let mut pairs = Vec::new();

    'outer: for i in 0..source_ids.len() {
        for j in (i + 1)..source_ids.len() {
            let (a, b) = (source_ids[i], source_ids[j]);
            if a == b {
                continue;
            }
            let key = if a < b {
                (a.to_string(), b.to_string())
            } else {
                (b.to_string(), a.to_string())
            };
            if !judged.insert(key) {
                continue;
            }
            pairs.push((i, j));
            if pairs.len() >= cap {
                break 'outer;
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_never_share_a_source() {
        let sources = ["a", "a", "b", "c"];
        for (i, j) in select_cross_source_pairs(&sources, 10) {
            assert_ne!(sources[i], sources[j]);
        }
    }

    #[test]
    fn test_each_source_pair_judged_at_most_once() {
        // 每篇论文出现多个块时，论文对仍只判定一次
        let sources = ["a", "b", "a", "b", "c"];
        let pairs = select_cross_source_pairs(&sources, 10);

        let mut seen = BTreeSet::new();
        for (i, j) in &pairs {
            let mut key = [sources[*i], sources[*j]];
            key.sort();
            assert!(seen.insert(key), "duplicate source pair: {:?}", key);
        }
        // a-b, a-c, b-c
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn test_pair_cap_is_respected() {
        let sources = ["a", "b", "c", "d", "e", "f"];
        assert_eq!(select_cross_source_pairs(&sources, 2).len(), 2);
        assert!(select_cross_source_pairs(&[], 5).is_empty());
        assert!(select_cross_source_pairs(&["a", "a"], 5).is_empty());
    }
}
