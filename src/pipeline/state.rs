//! 研究工作流的共享状态定义
//!
//! `ResearchState`是贯穿全部阶段的状态容器，各阶段只产出自己负责的
//! `StateDelta`，由编排器合并，不存在跨阶段的原地共享可变内存。

use chrono::{DateTime, Utc};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 处理阶段，固定全序推进，failed为提前终止态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Researching,
    Analyzing,
    Comparing,
    Synthesizing,
    Complete,
    Failed,
}

impl Stage {
    /// 阶段在全序中的序号，用于单调性校验
    pub fn rank(&self) -> u8 {
        match self {
            Stage::Researching => 0,
            Stage::Analyzing => 1,
            Stage::Comparing => 2,
            Stage::Synthesizing => 3,
            Stage::Complete => 4,
            Stage::Failed => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Researching => "researching",
            Stage::Analyzing => "analyzing",
            Stage::Comparing => "comparing",
            Stage::Synthesizing => "synthesizing",
            Stage::Complete => "complete",
            Stage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 论文提取状态：success，或带原因的失败变体
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionStatus {
    Success,
    Failed(String),
}

impl ExtractionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionStatus::Success)
    }
}

// 序列化为"success" / "failed: <reason>"，与台账快照格式保持一致
impl Serialize for ExtractionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ExtractionStatus::Success => serializer.serialize_str("success"),
            ExtractionStatus::Failed(reason) => {
                serializer.serialize_str(&format!("failed: {}", reason))
            }
        }
    }
}

impl<'de> Deserialize<'de> for ExtractionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == "success" {
            Ok(ExtractionStatus::Success)
        } else if let Some(reason) = s.strip_prefix("failed: ") {
            Ok(ExtractionStatus::Failed(reason.to_string()))
        } else if s.starts_with("failed") {
            Ok(ExtractionStatus::Failed(String::new()))
        } else {
            Err(D::Error::custom(format!("unknown extraction status: {}", s)))
        }
    }
}

/// 单篇论文记录
///
/// `text`是仅供索引构建使用的临时重量级字段，持久化前必须剥离。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperRecord {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: i32,
    pub summary: String,
    pub pdf_path: Option<PathBuf>,
    /// 预格式化引文：[Lastname et al., Year, arXiv:ID]
    pub citation: String,
    pub extraction_status: ExtractionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl PaperRecord {
    pub fn is_success(&self) -> bool {
        self.extraction_status.is_success()
    }
}

/// 错误日志条目，按论文与阶段标记，只追加不删除
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,
    pub error: String,
    pub stage: String,
}

/// 关键发现
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub finding: String,
    pub citation: String,
    pub arxiv_id: String,
}

/// 经负面约束校验后的真实矛盾
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub finding_1: String,
    pub finding_2: String,
    pub citation_1: String,
    pub citation_2: String,
    pub explanation: String,
}

/// 互补发现（同一主题的不同侧面）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Complementary {
    pub finding_1: String,
    pub finding_2: String,
    pub citation_1: String,
    pub citation_2: String,
    pub relationship: String,
}

/// 分析阶段的结构化产物
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    pub key_findings: Vec<Finding>,
    pub contradictions: Vec<Contradiction>,
    pub complementary_findings: Vec<Complementary>,
    pub trends: Vec<String>,
    pub consensus_points: Vec<String>,
    pub gaps: Vec<String>,
}

/// 对比表中一篇论文对应的一行，指标列在运行时发现，稀疏存储
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRow {
    pub paper: String,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, String>,
}

/// 指标对比阶段的产物
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Comparison {
    pub metrics_table: Vec<MetricRow>,
    pub metric_names: Vec<String>,
    pub comparison_summary: String,
}

/// 综合阶段产出的结构化洞察
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SynthesisInsights {
    /// 一句话结论
    pub headline: String,
    /// 核心要点
    pub key_takeaways: Vec<String>,
    /// 值得进一步研究的方向
    pub open_questions: Vec<String>,
}

/// 贯穿所有阶段的主状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchState {
    pub job_id: String,
    pub topic: String,
    pub max_papers: usize,

    pub documents: Vec<PaperRecord>,
    pub index_path: Option<PathBuf>,
    pub error_log: Vec<ErrorEntry>,

    pub analysis: Option<Analysis>,
    pub comparison: Option<Comparison>,

    pub final_report: Option<String>,
    pub insights: Option<SynthesisInsights>,

    pub timestamp: DateTime<Utc>,
    pub processing_stage: Stage,
}

impl ResearchState {
    pub fn new(job_id: &str, topic: &str, max_papers: usize) -> Self {
        Self {
            job_id: job_id.to_string(),
            topic: topic.to_string(),
            max_papers,
            documents: Vec::new(),
            index_path: None,
            error_log: Vec::new(),
            analysis: None,
            comparison: None,
            final_report: None,
            insights: None,
            timestamp: Utc::now(),
            processing_stage: Stage::Researching,
        }
    }

    /// 合并一个阶段增量，纯函数式：documents与error_log只追加，
    /// 其余字段后写覆盖（各阶段字段不相交，实际不会冲突）
    pub fn apply(mut self, delta: StateDelta) -> Self {
        self.documents.extend(delta.documents);
        self.error_log.extend(delta.error_log);
        if delta.index_path.is_some() {
            self.index_path = delta.index_path;
        }
        if delta.analysis.is_some() {
            self.analysis = delta.analysis;
        }
        if delta.comparison.is_some() {
            self.comparison = delta.comparison;
        }
        if delta.final_report.is_some() {
            self.final_report = delta.final_report;
        }
        if delta.insights.is_some() {
            self.insights = delta.insights;
        }
        self.processing_stage = delta.processing_stage;
        self
    }

    /// 持久化前剥离每篇论文的全文字段
    pub fn strip_transients(&mut self) {
        for doc in &mut self.documents {
            doc.text = None;
        }
    }

    /// 提取成功的论文数量
    pub fn successful_count(&self) -> usize {
        self.documents.iter().filter(|d| d.is_success()).count()
    }
}

/// 单个阶段贡献的部分更新
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDelta {
    #[serde(default)]
    pub documents: Vec<PaperRecord>,
    #[serde(default)]
    pub error_log: Vec<ErrorEntry>,
    pub index_path: Option<PathBuf>,
    pub analysis: Option<Analysis>,
    pub comparison: Option<Comparison>,
    pub final_report: Option<String>,
    pub insights: Option<SynthesisInsights>,
    pub processing_stage: Stage,
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Researching
    }
}
