//! 作业上下文
//!
//! 把配置、LLM客户端与论文检索源捆成一个共享句柄，
//! 各阶段代理只读借用，不做跨阶段可变共享。

use anyhow::Result;
use std::sync::Arc;

use crate::arxiv::{ArxivSource, PaperSource};
use crate::config::Config;
use crate::llm::LLMClient;

pub struct JobContext {
    pub config: Config,
    pub llm: LLMClient,
    pub papers: Arc<dyn PaperSource>,
}

impl JobContext {
    pub fn new(config: Config) -> Result<Self> {
        let llm = LLMClient::new(config.clone())?;
        let papers: Arc<dyn PaperSource> = Arc::new(ArxivSource::new(&config.research)?);
        Ok(Self {
            config,
            llm,
            papers,
        })
    }

    /// 注入自定义检索源，集成测试用
    pub fn with_source(config: Config, papers: Arc<dyn PaperSource>) -> Result<Self> {
        let llm = LLMClient::new(config.clone())?;
        Ok(Self {
            config,
            llm,
            papers,
        })
    }
}
