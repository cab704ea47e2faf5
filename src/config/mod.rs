use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "ollama")]
    #[default]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// 工作区根路径
    pub workspace_path: PathBuf,

    /// 报告输出路径
    pub output_path: PathBuf,

    /// 内部工作目录路径 (.researchmill)
    pub internal_path: PathBuf,

    /// LLM模型配置
    pub llm: LLMConfig,

    /// 向量嵌入配置
    pub embedding: EmbeddingConfig,

    /// 研究流程配置
    pub research: ResearchConfig,

    /// 任务台账配置
    pub ledger: LedgerConfig,

    /// 是否启用详细日志
    pub verbose: bool,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 推理模型
    pub model: String,

    /// 最大tokens
    pub max_tokens: u32,

    /// 温度（泛化推理）
    pub temperature: f64,

    /// 温度（事实抽取，偏低以减少幻觉）
    pub extraction_temperature: f64,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 超时时间（秒）
    pub timeout_seconds: u64,
}

/// 向量嵌入配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// 嵌入服务API基地址（OpenAI兼容的/embeddings端点）
    pub api_base_url: String,

    /// 嵌入服务API KEY
    pub api_key: String,

    /// 嵌入模型
    pub model: String,

    /// 单次请求的最大文本条数
    pub batch_size: usize,
}

/// 研究流程配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResearchConfig {
    /// 默认检索的论文数量
    pub max_papers: usize,

    /// 文本分块大小（字符）
    pub chunk_size: usize,

    /// 分块重叠（字符）
    pub chunk_overlap: usize,

    /// PDF提取文本的最小有效长度
    pub min_text_length: usize,

    /// arXiv请求超时时间（秒）
    pub arxiv_timeout_seconds: u64,

    /// arXiv请求间隔（毫秒），遵守速率限制
    pub arxiv_rate_limit_ms: u64,
}

/// 任务台账配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LedgerConfig {
    /// SQLite数据库文件路径
    pub db_path: PathBuf,

    /// 任务保留时长（小时），超龄任务可被清理
    pub retention_hours: u64,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// 获取指定任务的PDF缓存目录，按job_id隔离
    pub fn job_pdf_dir(&self, job_id: &str) -> Result<PathBuf> {
        let path = self.internal_path.join("pdfs").join(job_id);
        std::fs::create_dir_all(&path).context(format!("Failed to create pdf dir: {:?}", path))?;
        Ok(path)
    }

    /// 获取指定任务的向量索引目录，按job_id隔离
    pub fn job_index_dir(&self, job_id: &str) -> Result<PathBuf> {
        let path = self.internal_path.join("index").join(job_id);
        std::fs::create_dir_all(&path)
            .context(format!("Failed to create index dir: {:?}", path))?;
        Ok(path)
    }

    /// 获取指定任务的报告输出目录
    pub fn job_output_dir(&self, job_id: &str) -> Result<PathBuf> {
        let path = self.output_path.join(job_id);
        std::fs::create_dir_all(&path)
            .context(format!("Failed to create output dir: {:?}", path))?;
        Ok(path)
    }

    /// 获取任务台账数据库路径，确保父目录存在
    pub fn ledger_db_path(&self) -> Result<PathBuf> {
        if let Some(parent) = self.ledger.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create ledger dir: {:?}", parent))?;
        }
        Ok(self.ledger.db_path.clone())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_path: PathBuf::from("."),
            output_path: PathBuf::from("./researchmill.out"),
            internal_path: PathBuf::from("./.researchmill"),
            llm: LLMConfig::default(),
            embedding: EmbeddingConfig::default(),
            research: ResearchConfig::default(),
            ledger: LedgerConfig::default(),
            verbose: false,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: std::env::var("RESEARCHMILL_LLM_API_KEY").unwrap_or_default(),
            api_base_url: String::from("http://localhost:11434"),
            model: String::from("llama3.1"),
            max_tokens: 8192,
            temperature: 0.7,
            extraction_temperature: 0.3,
            retry_attempts: 3,
            retry_delay_ms: 3000,
            timeout_seconds: 300,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::from("http://localhost:11434/v1"),
            api_key: std::env::var("RESEARCHMILL_EMBEDDING_API_KEY").unwrap_or_default(),
            model: String::from("all-minilm"),
            batch_size: 32,
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_papers: 7,
            chunk_size: 700,
            chunk_overlap: 250,
            min_text_length: 100,
            arxiv_timeout_seconds: 30,
            arxiv_rate_limit_ms: 3000,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./.researchmill/jobs.db"),
            retention_hours: 24,
        }
    }
}

// Include tests
#[cfg(test)]
mod tests;
