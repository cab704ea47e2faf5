use crate::config::{Config, LLMProvider};
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_default_config_values() {
    let config = Config::default();

    assert_eq!(config.workspace_path, PathBuf::from("."));
    assert_eq!(config.output_path, PathBuf::from("./researchmill.out"));
    assert_eq!(config.internal_path, PathBuf::from("./.researchmill"));
    assert!(!config.verbose);

    assert_eq!(config.llm.provider, LLMProvider::Ollama);
    assert_eq!(config.llm.model, "llama3.1");
    assert_eq!(config.llm.temperature, 0.7);
    assert_eq!(config.llm.extraction_temperature, 0.3);
    assert_eq!(config.llm.retry_attempts, 3);

    assert_eq!(config.research.max_papers, 7);
    assert_eq!(config.research.chunk_size, 700);
    assert_eq!(config.research.chunk_overlap, 250);
    assert_eq!(config.research.min_text_length, 100);

    assert_eq!(config.ledger.retention_hours, 24);
}

#[test]
fn test_provider_from_str() {
    assert_eq!("openai".parse::<LLMProvider>(), Ok(LLMProvider::OpenAI));
    assert_eq!("DeepSeek".parse::<LLMProvider>(), Ok(LLMProvider::DeepSeek));
    assert_eq!("OLLAMA".parse::<LLMProvider>(), Ok(LLMProvider::Ollama));
    assert!("bogus".parse::<LLMProvider>().is_err());
}

#[test]
fn test_config_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("researchmill.toml");

    let content = r#"
workspace_path = "/tmp/ws"
output_path = "/tmp/out"
internal_path = "/tmp/internal"
verbose = true

[llm]
provider = "openai"
api_key = "sk-test"
api_base_url = "https://api.example.com/v1"
model = "gpt-4o-mini"
max_tokens = 4096
temperature = 0.5
extraction_temperature = 0.2
retry_attempts = 5
retry_delay_ms = 1000
timeout_seconds = 120

[embedding]
api_base_url = "http://localhost:11434/v1"
api_key = ""
model = "all-minilm"
batch_size = 16

[research]
max_papers = 5
chunk_size = 600
chunk_overlap = 100
min_text_length = 100
arxiv_timeout_seconds = 30
arxiv_rate_limit_ms = 3000

[ledger]
db_path = "/tmp/internal/jobs.db"
retention_hours = 48
"#;
    std::fs::write(&config_path, content).unwrap();

    let config = Config::from_file(&config_path).unwrap();
    assert_eq!(config.llm.provider, LLMProvider::OpenAI);
    assert_eq!(config.llm.model, "gpt-4o-mini");
    assert_eq!(config.research.max_papers, 5);
    assert_eq!(config.embedding.batch_size, 16);
    assert_eq!(config.ledger.retention_hours, 48);
    assert!(config.verbose);
}

#[test]
fn test_job_scoped_dirs_are_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        internal_path: temp_dir.path().join(".researchmill"),
        output_path: temp_dir.path().join("out"),
        ..Default::default()
    };

    let pdf_a = config.job_pdf_dir("job-a").unwrap();
    let pdf_b = config.job_pdf_dir("job-b").unwrap();
    let index_a = config.job_index_dir("job-a").unwrap();
    let out_a = config.job_output_dir("job-a").unwrap();

    assert_ne!(pdf_a, pdf_b);
    assert!(pdf_a.exists());
    assert!(index_a.exists());
    assert!(out_a.exists());
    assert!(pdf_a.ends_with("pdfs/job-a"));
    assert!(index_a.ends_with("index/job-a"));
}
