use crate::config::{Config, LLMProvider};
use crate::ledger::{JobStatus, JobStore};
use crate::pipeline::JobContext;
use crate::runner;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// ResearchMill - 由Rust与AI驱动的论文研究综合引擎
#[derive(Parser, Debug)]
#[command(name = "researchmill")]
#[command(
    about = "AI-based research synthesis engine. It fetches arXiv papers on a topic, \
extracts patterns and metrics, and synthesizes a cited research report."
)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// 配置文件路径
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// 工作区路径
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,

    /// 报告输出路径
    #[arg(short, long, global = true)]
    pub output_path: Option<PathBuf>,

    /// LLM Provider (openai, deepseek, anthropic, ollama)
    #[arg(long, global = true)]
    pub llm_provider: Option<String>,

    /// LLM API基地址
    #[arg(long, global = true)]
    pub llm_api_base_url: Option<String>,

    /// LLM API KEY
    #[arg(long, global = true)]
    pub llm_api_key: Option<String>,

    /// 模型名称
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// 最大tokens数
    #[arg(long, global = true)]
    pub max_tokens: Option<u32>,

    /// 温度参数
    #[arg(long, global = true)]
    pub temperature: Option<f64>,

    /// 是否启用详细日志
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 启动一个研究作业并跟踪进度
    Run {
        /// 研究主题
        topic: String,

        /// 最多检索的论文数
        #[arg(long, default_value_t = 7)]
        max_papers: usize,
    },
    /// 查询作业状态
    Status {
        /// 作业ID
        job_id: String,
    },
    /// 输出已完成作业的报告
    Report {
        /// 作业ID
        job_id: String,
    },
    /// 列出全部作业
    Jobs,
    /// 删除一个作业
    Delete {
        /// 作业ID
        job_id: String,
    },
    /// 清理超过保留期的终态作业
    Cleanup {
        /// 保留小时数，缺省用配置值
        #[arg(long)]
        hours: Option<u64>,
    },
}

impl Args {
    /// 拆出子命令并把CLI覆盖项合入配置
    pub fn into_parts(self) -> Result<(Command, Config)> {
        let mut config = if let Some(config_path) = &self.config {
            Config::from_file(config_path)?
        } else {
            // 没有显式指定时尝试默认位置
            let default_config_path = std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("researchmill.toml");
            if default_config_path.exists() {
                Config::from_file(&default_config_path)?
            } else {
                Config::default()
            }
        };

        if let Some(workspace) = self.workspace {
            config.internal_path = workspace.join(".researchmill");
            config.workspace_path = workspace;
        }
        if let Some(output_path) = self.output_path {
            config.output_path = output_path;
        }

        // 覆盖LLM配置
        if let Some(provider_str) = self.llm_provider {
            match provider_str.parse::<LLMProvider>() {
                Ok(provider) => config.llm.provider = provider,
                Err(_) => {
                    eprintln!("⚠️ 警告: 未知的provider: {}，使用默认provider", provider_str)
                }
            }
        }
        if let Some(llm_api_base_url) = self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url;
        }
        if let Some(llm_api_key) = self.llm_api_key {
            config.llm.api_key = llm_api_key;
        }
        if let Some(model) = self.model {
            config.llm.model = model;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }
        config.verbose = self.verbose;

        Ok((self.command, config))
    }
}

/// 轮询上限：600次 x 2秒，覆盖最长的正常作业时长
const POLL_ATTEMPTS: usize = 600;
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub async fn execute(command: Command, config: Config) -> Result<()> {
    let store = JobStore::open(&config.ledger_db_path()?)?;

    match command {
        Command::Run { topic, max_papers } => run_and_wait(config, store, topic, max_papers).await,
        Command::Status { job_id } => show_status(&store, &job_id),
        Command::Report { job_id } => show_report(&config, &store, &job_id),
        Command::Jobs => list_jobs(&store),
        Command::Delete { job_id } => {
            if store.delete_job(&job_id)? {
                println!("🗑️ 已删除作业 {}", job_id);
            } else {
                println!("⚠️ 作业不存在: {}", job_id);
            }
            Ok(())
        }
        Command::Cleanup { hours } => {
            let hours = hours.unwrap_or(config.ledger.retention_hours);
            let removed = store.cleanup_old_jobs(hours)?;
            println!("🧹 已清理 {} 个超过 {} 小时的终态作业", removed, hours);
            Ok(())
        }
    }
}

async fn run_and_wait(
    config: Config,
    store: JobStore,
    topic: String,
    max_papers: usize,
) -> Result<()> {
    // 网络不可用时尽早失败，不留下悬空的排队作业
    runner::validate_request(&topic, max_papers)?;
    let ctx = Arc::new(JobContext::new(config)?);
    ctx.llm.check_connection().await?;

    let job_id = uuid::Uuid::new_v4().to_string();
    store.create_job(&job_id, &topic, max_papers)?;
    println!("🚀 作业已创建: {}", job_id);

    let worker_store = store.clone();
    let worker_topic = topic.clone();
    let worker_job_id = job_id.clone();
    let handle = tokio::spawn(async move {
        runner::run_research_job(ctx, worker_store, &worker_job_id, &worker_topic, max_papers)
            .await
    });

    if !wait_for_terminal(&store, &job_id, POLL_ATTEMPTS, POLL_INTERVAL).await? {
        // 超时后不再等待后台任务，作业留在台账里继续跑
        println!(
            "⏳ 轮询超时，作业仍在后台运行。稍后可用 `researchmill status {}` 查询",
            job_id
        );
        return show_status(&store, &job_id);
    }

    // 执行器自身的结果以台账为准，join错误只提示
    if let Err(e) = handle.await {
        eprintln!("⚠️ 后台任务异常退出: {}", e);
    }
    show_status(&store, &job_id)
}

/// 轮询台账直到作业进入终态或尝试次数耗尽，打印进度消息的变化
///
/// 返回是否观察到终态；作业记录消失视为终止。
async fn wait_for_terminal(
    store: &JobStore,
    job_id: &str,
    attempts: usize,
    interval: Duration,
) -> Result<bool> {
    let mut last_message = String::new();
    for _ in 0..attempts {
        tokio::time::sleep(interval).await;
        let Some(job) = store.get_job(job_id)? else {
            return Ok(true);
        };
        if job.current_message != last_message {
            println!(
                "  [{:>3}%] {} - {}",
                job.progress_percentage, job.processing_stage, job.current_message
            );
            last_message = job.current_message;
        }
        if job.status.is_terminal() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn show_status(store: &JobStore, job_id: &str) -> Result<()> {
    let Some(job) = store.get_job(job_id)? else {
        println!("⚠️ 作业不存在: {}", job_id);
        return Ok(());
    };

    println!("作业: {}", job.job_id);
    println!("  主题: {}", job.topic);
    println!("  状态: {} ({}%)", job.status.as_str(), job.progress_percentage);
    println!("  阶段: {}", job.processing_stage);
    println!("  消息: {}", job.current_message);
    if let Some(error) = &job.error {
        println!("  错误: {}", error);
    }
    println!("  创建: {}", job.created_at);
    println!("  更新: {}", job.updated_at);
    Ok(())
}

fn show_report(config: &Config, store: &JobStore, job_id: &str) -> Result<()> {
    let Some(job) = store.get_job(job_id)? else {
        println!("⚠️ 作业不存在: {}", job_id);
        return Ok(());
    };
    if job.status != JobStatus::Complete {
        println!("⚠️ 作业尚未完成: {}", job.status.as_str());
        return Ok(());
    }

    let report_path = config.job_output_dir(job_id)?.join("report.md");
    if report_path.exists() {
        println!("{}", std::fs::read_to_string(&report_path)?);
        return Ok(());
    }

    // 报告文件缺失时回落到台账快照
    if let Some(snapshot) = &job.final_state_json {
        let state: crate::pipeline::ResearchState = serde_json::from_str(snapshot)?;
        if let Some(report) = state.final_report {
            println!("{}", report);
            return Ok(());
        }
    }
    println!("⚠️ 未找到报告内容");
    Ok(())
}

fn list_jobs(store: &JobStore) -> Result<()> {
    let summaries = store.job_summaries()?;
    if summaries.is_empty() {
        println!("暂无作业");
        return Ok(());
    }

    for summary in summaries {
        let papers = match (summary.papers_analyzed, summary.papers_failed) {
            (Some(ok), Some(failed)) => format!("{}成功/{}失败", ok, failed),
            _ => "-".to_string(),
        };
        println!(
            "{}  {:<12} {:>3}%  {}  {}",
            summary.job_id,
            summary.status.as_str(),
            summary.progress_percentage,
            papers,
            summary.topic
        );
    }
    Ok(())
}

// Include tests
#[cfg(test)]
mod tests;
