//! 语义索引
//!
//! 论文全文分块后经嵌入接口向量化，存为平铺L2索引并持久化成JSON。
//! 索引按作业隔离，同一作业重复构建会生成新的索引文件。

pub mod chunker;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{Config, EmbeddingConfig};
use crate::error::ResearchError;
use crate::pipeline::state::{ExtractionStatus, PaperRecord};

/// 索引中一个文本块的元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub arxiv_id: String,
    pub title: String,
    pub citation: String,
    pub chunk_id: usize,
    pub text: String,
}

/// 检索命中
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: ChunkMeta,
    pub distance: f32,
}

/// 平铺向量索引，线性扫描取最近邻
#[derive(Debug, Serialize, Deserialize)]
pub struct VectorIndex {
    pub dimension: usize,
    pub vectors: Vec<Vec<f32>>,
    pub chunks: Vec<ChunkMeta>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            chunks: Vec::new(),
        }
    }

    pub fn push(&mut self, vector: Vec<f32>, chunk: ChunkMeta) {
        self.vectors.push(vector);
        self.chunks.push(chunk);
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 按L2距离升序返回前k个块
    pub fn nearest(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (l2_distance(query, v), i))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(k)
            .map(|(distance, i)| SearchHit {
                chunk: self.chunks[i].clone(),
                distance,
            })
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write index file: {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read index file: {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse index file: {}", path.display()))
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// OpenAI兼容嵌入接口的HTTP客户端
pub struct EmbeddingClient {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// 批量嵌入，按配置的batch_size分批请求
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!(
            "{}/embeddings",
            self.config.api_base_url.trim_end_matches('/')
        );
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let mut request = self.client.post(&url).json(&EmbeddingRequest {
                model: &self.config.model,
                input: batch,
            });
            if !self.config.api_key.is_empty() {
                request = request.bearer_auth(&self.config.api_key);
            }

            let response = request
                .send()
                .await
                .map_err(|e| ResearchError::Connectivity(format!("embedding request failed: {}", e)))?;
            if !response.status().is_success() {
                return Err(ResearchError::Connectivity(format!(
                    "embedding API returned HTTP {}",
                    response.status()
                ))
                .into());
            }

            let parsed: EmbeddingResponse = response
                .json()
                .await
                .context("Failed to parse embedding response")?;
            if parsed.data.len() != batch.len() {
                return Err(anyhow!(
                    "embedding count mismatch: sent {}, received {}",
                    batch.len(),
                    parsed.data.len()
                ));
            }
            vectors.extend(parsed.data.into_iter().map(|d| d.embedding));
        }

        Ok(vectors)
    }
}

/// 作业级向量存储：构建、持久化、加载、检索
pub struct VectorStore {
    config: Config,
    embeddings: EmbeddingClient,
    index: Option<VectorIndex>,
}

impl VectorStore {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            embeddings: EmbeddingClient::new(config.embedding.clone()),
            index: None,
        }
    }

    /// 对提取成功且正文足够长的论文建索引
    ///
    /// 零块是硬错误：此时后续阶段没有任何可检索内容。
    pub async fn build_index(&mut self, documents: &[PaperRecord], job_id: &str) -> Result<PathBuf> {
        let chunks = collect_chunks(
            documents,
            self.config.research.chunk_size,
            self.config.research.chunk_overlap,
            self.config.research.min_text_length,
        );
        if chunks.is_empty() {
            anyhow::bail!("No usable text chunks to index");
        }

        println!("📥 嵌入 {} 个文本块...", chunks.len());
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embeddings.embed(&texts).await?;
        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);

        let mut index = VectorIndex::new(dimension);
        for (vector, chunk) in vectors.into_iter().zip(chunks) {
            index.push(vector, chunk);
        }

        let path = self
            .config
            .job_index_dir(job_id)?
            .join(format!("index_{}.json", chrono::Utc::now().timestamp()));
        index.save(&path)?;
        println!("✅ 索引已写入: {}", path.display());

        self.index = Some(index);
        Ok(path)
    }

    pub fn load_index(&mut self, path: &Path) -> Result<()> {
        self.index = Some(VectorIndex::load(path)?);
        Ok(())
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// 语义检索，索引未构建时报错
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| anyhow!("Vector index has not been built"))?;

        let query_vec = self
            .embeddings
            .embed(std::slice::from_ref(&query.to_string()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Embedding API returned no vector for query"))?;

        Ok(index.nearest(&query_vec, k))
    }
}

/// 只收录提取成功且正文足够长的论文的分块
fn collect_chunks(
    documents: &[PaperRecord],
    chunk_size: usize,
    chunk_overlap: usize,
    min_text_length: usize,
) -> Vec<ChunkMeta> {
    let mut chunks = Vec::new();
    for doc in documents {
        if !matches!(doc.extraction_status, ExtractionStatus::Success) {
            continue;
        }
        let Some(text) = &doc.text else { continue };
        if text.len() < min_text_length {
            continue;
        }

        for (chunk_id, piece) in chunker::split_text(text, chunk_size, chunk_overlap)
            .into_iter()
            .enumerate()
        {
            chunks.push(ChunkMeta {
                arxiv_id: doc.arxiv_id.clone(),
                title: doc.title.clone(),
                citation: doc.citation.clone(),
                chunk_id,
                text: piece,
            });
        }
    }
    chunks
}
