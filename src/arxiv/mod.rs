//! arXiv论文检索与下载
//!
//! 检索走arXiv的Atom查询API，下载为普通HTTP GET。`PaperSource`
//! trait是检索协作方的契约边界，测试中可替换为桩实现。

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::path::Path;
use std::time::Duration;

use crate::config::ResearchConfig;
use crate::error::ResearchError;

/// 检索返回的论文元数据（不含全文）
#[derive(Debug, Clone)]
pub struct PaperMeta {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub published: Option<DateTime<Utc>>,
    pub summary: String,
    pub pdf_url: String,
}

impl PaperMeta {
    pub fn year(&self) -> i32 {
        use chrono::Datelike;
        self.published.map(|d| d.year()).unwrap_or(0)
    }
}

/// 论文检索协作方契约
///
/// `search`可以返回少于请求数量的结果，空列表是有效响应（无匹配）。
/// `fetch_pdf`按布尔值报告成败，调用方先做缓存检查再调用。
#[async_trait]
pub trait PaperSource: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<PaperMeta>>;
    async fn fetch_pdf(&self, pdf_url: &str, dest: &Path) -> bool;
}

/// 基于arXiv公开API的检索实现
pub struct ArxivSource {
    client: reqwest::Client,
    api_base_url: String,
    rate_limit_ms: u64,
}

impl ArxivSource {
    pub fn new(config: &ResearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.arxiv_timeout_seconds))
            .build()
            .context("Failed to build arXiv HTTP client")?;

        Ok(Self {
            client,
            api_base_url: String::from("http://export.arxiv.org/api/query"),
            rate_limit_ms: config.arxiv_rate_limit_ms,
        })
    }
}

#[async_trait]
impl PaperSource for ArxivSource {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<PaperMeta>> {
        println!("🔍 检索arXiv: '{}' (max_results={})", query, max_results);

        let response = self
            .client
            .get(&self.api_base_url)
            .query(&[
                ("search_query", format!("all:{}", query).as_str()),
                ("start", "0"),
                ("max_results", max_results.to_string().as_str()),
                ("sortBy", "relevance"),
                ("sortOrder", "descending"),
            ])
            .send()
            .await
            .map_err(|e| ResearchError::Connectivity(format!("arXiv query failed: {}", e)))?;

        let body = response
            .text()
            .await
            .map_err(|e| ResearchError::Connectivity(format!("arXiv response error: {}", e)))?;

        // 遵守arXiv速率限制
        tokio::time::sleep(Duration::from_millis(self.rate_limit_ms)).await;

        let papers = parse_atom_feed(&body)?;
        println!("✓ arXiv返回 {} 篇论文", papers.len());
        Ok(papers)
    }

    async fn fetch_pdf(&self, pdf_url: &str, dest: &Path) -> bool {
        if let Some(parent) = dest.parent()
            && std::fs::create_dir_all(parent).is_err()
        {
            return false;
        }

        let response = match self.client.get(pdf_url).send().await {
            Ok(r) => r,
            Err(e) => {
                eprintln!("❌ PDF下载失败 {}: {}", pdf_url, e);
                return false;
            }
        };
        if !response.status().is_success() {
            eprintln!("❌ PDF下载失败 {}: HTTP {}", pdf_url, response.status());
            return false;
        }

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                eprintln!("❌ PDF读取失败 {}: {}", pdf_url, e);
                return false;
            }
        };

        tokio::fs::write(dest, &bytes).await.is_ok()
    }
}

/// 解析arXiv Atom响应
///
/// 与网络层分离，便于用固定报文单测。
pub fn parse_atom_feed(xml: &str) -> Result<Vec<PaperMeta>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();

    let mut in_entry = false;
    let mut in_author = false;
    let mut current_tag: Vec<u8> = Vec::new();

    let mut entry_id = String::new();
    let mut title = String::new();
    let mut summary = String::new();
    let mut published = String::new();
    let mut authors: Vec<String> = Vec::new();
    let mut pdf_url = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current_tag = e.name().as_ref().to_vec();
                match current_tag.as_slice() {
                    b"entry" => {
                        in_entry = true;
                        entry_id.clear();
                        title.clear();
                        summary.clear();
                        published.clear();
                        authors.clear();
                        pdf_url.clear();
                    }
                    b"author" => in_author = true,
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                if in_entry && e.name().as_ref() == b"link" {
                    let mut href = None;
                    let mut is_pdf = false;
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"href" => {
                                href = Some(String::from_utf8_lossy(&attr.value).into_owned())
                            }
                            b"title" => is_pdf = attr.value.as_ref() == b"pdf",
                            _ => {}
                        }
                    }
                    if is_pdf && let Some(href) = href {
                        pdf_url = href;
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if !in_entry {
                    continue;
                }
                let text = t.xml_content().unwrap_or_default().into_owned();
                match current_tag.as_slice() {
                    b"id" => entry_id.push_str(&text),
                    b"title" => title.push_str(&text),
                    b"summary" => summary.push_str(&text),
                    b"published" => published.push_str(&text),
                    b"name" if in_author => authors.push(text),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"entry" => {
                    in_entry = false;
                    if !entry_id.is_empty() {
                        papers.push(build_paper_meta(
                            &entry_id, &title, &summary, &published, &authors, &pdf_url,
                        ));
                    }
                }
                b"author" => in_author = false,
                _ => current_tag.clear(),
            },
            Ok(Event::Eof) => break,
            Err(e) => anyhow::bail!("Failed to parse arXiv Atom feed: {}", e),
            _ => {}
        }
    }

    Ok(papers)
}

fn build_paper_meta(
    entry_id: &str,
    title: &str,
    summary: &str,
    published: &str,
    authors: &[String],
    pdf_url: &str,
) -> PaperMeta {
    // entry id形如 http://arxiv.org/abs/2401.12345v2，去掉版本号
    let arxiv_id = entry_id
        .rsplit('/')
        .next()
        .unwrap_or(entry_id)
        .split('v')
        .next()
        .unwrap_or(entry_id)
        .to_string();

    let pdf_url = if pdf_url.is_empty() {
        entry_id.replace("/abs/", "/pdf/")
    } else {
        pdf_url.to_string()
    };

    PaperMeta {
        arxiv_id,
        title: normalize_whitespace(title),
        authors: authors.to_vec(),
        published: DateTime::parse_from_rfc3339(published)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        summary: normalize_whitespace(summary),
        pdf_url,
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
