//! PDF文本提取与引文格式化

use anyhow::{Context, Result, bail};
use std::path::Path;

/// 从PDF中提取正文文本
///
/// 清理空字节并归一化空白；提取结果过短视为失败（扫描件、
/// 损坏文件等），由调用方记入错误日志。
pub fn extract_text(pdf_path: &Path, min_length: usize) -> Result<String> {
    let raw = pdf_extract::extract_text(pdf_path)
        .context(format!("PDF extraction failed for {:?}", pdf_path))?;

    let cleaned = raw.replace('\0', "");
    let text = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if text.len() < min_length {
        bail!(
            "Extracted text too short ({} chars) from {:?}",
            text.len(),
            pdf_path
        );
    }

    Ok(text)
}

/// 格式化行内引文：[FirstAuthorLastname et al., Year, arXiv:ID]
pub fn format_citation(authors: &[String], year: i32, arxiv_id: &str) -> String {
    let Some(first_author) = authors.first() else {
        return format!("[Unknown, {}, arXiv:{}]", year, arxiv_id);
    };

    let last_name = first_author
        .split_whitespace()
        .last()
        .unwrap_or(first_author);

    if authors.len() == 1 {
        format!("[{}, {}, arXiv:{}]", last_name, year, arxiv_id)
    } else {
        format!("[{} et al., {}, arXiv:{}]", last_name, year, arxiv_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_citation_single_author() {
        let authors = vec!["Alice Chen".to_string()];
        assert_eq!(
            format_citation(&authors, 2025, "2501.0001"),
            "[Chen, 2025, arXiv:2501.0001]"
        );
    }

    #[test]
    fn test_format_citation_multiple_authors() {
        let authors = vec!["Alice Chen".to_string(), "Bob Müller".to_string()];
        assert_eq!(
            format_citation(&authors, 2024, "2401.5678"),
            "[Chen et al., 2024, arXiv:2401.5678]"
        );
    }

    #[test]
    fn test_format_citation_no_authors() {
        assert_eq!(
            format_citation(&[], 2023, "2301.0002"),
            "[Unknown, 2023, arXiv:2301.0002]"
        );
    }

    #[test]
    fn test_extract_text_missing_file_fails() {
        let result = extract_text(Path::new("/nonexistent/paper.pdf"), 100);
        assert!(result.is_err());
    }
}
