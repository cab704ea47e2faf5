//! LLM响应分类器
//!
//! 生成式模型的响应没有结构化契约，这里集中做全部的字符串判定：
//! 哨兵值、四分类关系标签、要点列表、指标行。与具体模型无关，
//! 可用固定字符串离线单测。

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// 关系四分类，负面约束提示词要求模型只能输出其中之一
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationCategory {
    Contradiction,
    Complementary,
    Unrelated,
    Insufficient,
}

/// 对模型响应的统一判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    /// 模型显式声明无可用输出
    Sentinel,
    /// 命中固定分类
    Category(RelationCategory),
    /// 普通自由文本
    FreeText(String),
}

/// 发现抽取的哨兵值
pub const FINDING_SENTINEL: &str = "SKIP";
/// 指标抽取的哨兵值
pub const METRICS_SENTINEL: &str = "NO_METRICS";

/// 模型拒答或寒暄时的常见措辞，命中即丢弃
const CONVERSATIONAL_PHRASES: &[&str] = &[
    "i'd be happy",
    "please provide",
    "it seems",
    "unfortunately",
    "you forgot",
    "didn't provide",
    "no text provided",
];

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+)$").unwrap());

static CATEGORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*CATEGORY:\s*(\w+)").unwrap());

/// 判定关系对比响应
///
/// 只认显式的`CATEGORY: <tag>`行；模型含糊其辞或忽略格式时回落为
/// FreeText，绝不凭空判定为矛盾。
pub fn classify_relation(response: &str) -> ModelReply {
    if let Some(caps) = CATEGORY_RE.captures(response) {
        let tag = caps[1].to_uppercase();
        let category = match tag.as_str() {
            "CONTRADICTION" => Some(RelationCategory::Contradiction),
            "COMPLEMENTARY" => Some(RelationCategory::Complementary),
            "UNRELATED" => Some(RelationCategory::Unrelated),
            "INSUFFICIENT" => Some(RelationCategory::Insufficient),
            _ => None,
        };
        if let Some(category) = category {
            return ModelReply::Category(category);
        }
    }
    ModelReply::FreeText(response.trim().to_string())
}

/// 从关系对比响应中提取`EXPLANATION:`行，缺失时截断原文兜底
pub fn extract_explanation(response: &str) -> String {
    for line in response.lines() {
        if let Some(rest) = line.trim().strip_prefix("EXPLANATION:") {
            return rest.trim().to_string();
        }
    }
    response.chars().take(200).collect()
}

/// 判定发现抽取响应：哨兵、拒答措辞，或一条有效的发现文本
pub fn classify_finding(response: &str) -> ModelReply {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return ModelReply::Sentinel;
    }
    if trimmed.starts_with(FINDING_SENTINEL)
        || trimmed.to_lowercase().contains("no concrete finding")
    {
        return ModelReply::Sentinel;
    }
    let lower = trimmed.to_lowercase();
    if CONVERSATIONAL_PHRASES
        .iter()
        .any(|phrase| lower.contains(phrase))
    {
        return ModelReply::Sentinel;
    }
    ModelReply::FreeText(trimmed.to_string())
}

/// 解析要点列表响应：取以符号或序号开头的行，截断到cap条
pub fn parse_bullets(response: &str, cap: usize) -> Vec<String> {
    response
        .lines()
        .filter_map(|line| {
            BULLET_RE
                .captures(line)
                .map(|caps| caps[1].trim().to_string())
        })
        .filter(|item| !item.is_empty())
        .take(cap)
        .collect()
}

/// 解析指标抽取响应为`name: value`行
///
/// 命中NO_METRICS哨兵返回空；跳过示例行与表头行。
pub fn parse_metric_lines(response: &str) -> Vec<String> {
    if response.contains(METRICS_SENTINEL) {
        return Vec::new();
    }

    response
        .lines()
        .map(|line| line.trim().trim_start_matches("- ").trim())
        .filter(|line| !line.is_empty())
        .filter(|line| line.contains(':'))
        .filter(|line| !line.starts_with("Extracted") && !line.starts_with("Example"))
        .map(|line| line.to_string())
        .collect()
}

/// 按集合语义去重指标行，幂等，不保证插入顺序
pub fn dedup_metrics(lines: &[String]) -> Vec<String> {
    let set: BTreeSet<&String> = lines.iter().collect();
    set.into_iter().cloned().collect()
}

/// 拆分一条`name: value`指标行
pub fn split_metric_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_relation_exact_categories() {
        let response = "CATEGORY: CONTRADICTION\nEXPLANATION: Paper A reports 475 Wh/kg while paper B reports that value is unreachable.";
        assert_eq!(
            classify_relation(response),
            ModelReply::Category(RelationCategory::Contradiction)
        );
        assert_eq!(
            extract_explanation(response),
            "Paper A reports 475 Wh/kg while paper B reports that value is unreachable."
        );

        assert_eq!(
            classify_relation("CATEGORY: COMPLEMENTARY\nEXPLANATION: Different aspects."),
            ModelReply::Category(RelationCategory::Complementary)
        );
        assert_eq!(
            classify_relation("  CATEGORY: unrelated"),
            ModelReply::Category(RelationCategory::Unrelated)
        );
        assert_eq!(
            classify_relation("CATEGORY: INSUFFICIENT\nEXPLANATION: Too little context."),
            ModelReply::Category(RelationCategory::Insufficient)
        );
    }

    #[test]
    fn test_classify_relation_never_invents_a_category() {
        // hedging without the tag line must not become a contradiction
        let hedged = "These two findings might be in tension, hard to say.";
        assert_eq!(
            classify_relation(hedged),
            ModelReply::FreeText(hedged.to_string())
        );

        // unknown tag value falls through to free text
        let unknown = "CATEGORY: MAYBE\nEXPLANATION: not sure";
        assert!(matches!(classify_relation(unknown), ModelReply::FreeText(_)));
    }

    #[test]
    fn test_extract_explanation_fallback_truncates() {
        let long = "x".repeat(400);
        assert_eq!(extract_explanation(&long).len(), 200);
    }

    #[test]
    fn test_classify_finding_sentinel_and_refusals() {
        assert_eq!(
            classify_finding("SKIP - no concrete finding"),
            ModelReply::Sentinel
        );
        assert_eq!(
            classify_finding("The text contains no concrete finding."),
            ModelReply::Sentinel
        );
        assert_eq!(
            classify_finding("I'd be happy to help! Please provide the text."),
            ModelReply::Sentinel
        );
        assert_eq!(
            classify_finding("Unfortunately, you forgot to include the excerpt."),
            ModelReply::Sentinel
        );
        assert_eq!(classify_finding("   "), ModelReply::Sentinel);

        assert_eq!(
            classify_finding("The cell retains 92% capacity after 1000 cycles."),
            ModelReply::FreeText("The cell retains 92% capacity after 1000 cycles.".to_string())
        );
    }

    #[test]
    fn test_parse_bullets_markers_and_cap() {
        let response = "Here are the trends:\n- Trend one\n* Trend two\n• Trend three\n1. Trend four\nnot a bullet";
        let bullets = parse_bullets(response, 3);
        assert_eq!(bullets, vec!["Trend one", "Trend two", "Trend three"]);

        assert!(parse_bullets("no bullets at all", 3).is_empty());
    }

    #[test]
    fn test_parse_metric_lines_sentinel_and_headers() {
        assert!(parse_metric_lines("NO_METRICS").is_empty());

        let response = "Extracted metrics (one per line):\n- Energy density: 475 Wh/kg\nCycle life: 1000 cycles\nExample outputs: ignored\nnot a metric";
        let lines = parse_metric_lines(response);
        assert_eq!(
            lines,
            vec!["Energy density: 475 Wh/kg", "Cycle life: 1000 cycles"]
        );
    }

    #[test]
    fn test_dedup_metrics_is_idempotent_set_semantics() {
        let raw = vec![
            "Energy density: 475 Wh/kg".to_string(),
            "Cycle life: 1000 cycles".to_string(),
            "Energy density: 475 Wh/kg".to_string(),
        ];
        let once = dedup_metrics(&raw);
        let twice = dedup_metrics(&once);
        assert_eq!(once.len(), 2);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_split_metric_line() {
        assert_eq!(
            split_metric_line("Ionic conductivity: 1.2 mS/cm at 25°C"),
            Some(("Ionic conductivity".to_string(), "1.2 mS/cm at 25°C".to_string()))
        );
        assert_eq!(split_metric_line("no separator"), None);
        assert_eq!(split_metric_line("name:"), None);
    }
}
