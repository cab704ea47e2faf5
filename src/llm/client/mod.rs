//! LLM客户端 - 提供统一的LLM服务接口

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::config::Config;
use crate::error::ResearchError;

mod providers;

use providers::ProviderClient;

/// LLM客户端 - 提供统一的LLM服务接口
///
/// 响应没有结构化契约，调用方用`llm::response`做字符串判定。
#[derive(Clone)]
pub struct LLMClient {
    config: Config,
    client: ProviderClient,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(config: Config) -> Result<Self> {
        let client = ProviderClient::new(&config.llm)?;
        Ok(Self { client, config })
    }

    /// 检查模型连接和功能是否正常
    pub async fn check_connection(&self) -> Result<()> {
        println!("🔄 正在检查模型连接...");
        match self
            .generate("System: You are a helpful assistant.", "Hello")
            .await
        {
            Ok(_) => {
                println!("✅ 模型连接正常");
                Ok(())
            }
            Err(e) => {
                eprintln!("❌ 模型连接失败: {}", e);
                Err(ResearchError::Connectivity(format!(
                    "LLM service unreachable at {}: {}",
                    self.config.llm.api_base_url, e
                ))
                .into())
            }
        }
    }

    /// 通用重试逻辑，用于处理异步操作的重试机制
    async fn retry_with_backoff<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        let llm_config = &self.config.llm;
        let max_retries = llm_config.retry_attempts;
        let retry_delay_ms = llm_config.retry_delay_ms;
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    eprintln!(
                        "❌ 调用模型服务出错，重试中 (第 {} / {}次尝试): {}",
                        retries, max_retries, err
                    );
                    if retries >= max_retries {
                        return Err(err);
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(retry_delay_ms)).await;
                }
            }
        }
    }

    /// 泛化推理（默认温度）
    pub async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.generate_with_temperature(system_prompt, user_prompt, self.config.llm.temperature)
            .await
    }

    /// 事实抽取（低温度，减少编造）
    pub async fn generate_factual(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.generate_with_temperature(
            system_prompt,
            user_prompt,
            self.config.llm.extraction_temperature,
        )
        .await
    }

    async fn generate_with_temperature(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f64,
    ) -> Result<String> {
        let agent = self.client.create_agent(
            &self.config.llm.model,
            system_prompt,
            &self.config.llm,
            temperature,
        );

        self.retry_with_backoff(|| async { agent.prompt(user_prompt).await })
            .await
    }

    /// 结构化数据提取方法
    pub async fn extract<T>(&self, system_prompt: &str, user_prompt: &str) -> Result<T>
    where
        T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
    {
        let llm_config = &self.config.llm;
        let extractor =
            self.client
                .create_extractor::<T>(&llm_config.model, system_prompt, llm_config);

        self.retry_with_backoff(|| async {
            extractor.extract(user_prompt).await
        })
        .await
    }
}
