pub mod arxiv;
pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod ledger;
pub mod llm;
pub mod pdf;
pub mod pipeline;
pub mod runner;

// Re-export commonly used types
pub use config::Config;
pub use error::ResearchError;
pub use ledger::JobStore;
pub use pipeline::{JobContext, ResearchPipeline, ResearchState};
pub use runner::run_research_job;
