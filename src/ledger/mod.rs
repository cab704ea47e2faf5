//! 作业台账
//!
//! SQLite单表记录每个研究作业的状态、进度与最终快照。
//! 连接包在互斥锁里，后台任务与CLI查询共用同一个存储句柄。

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// 台账中的作业状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Researching,
    Analyzing,
    Comparing,
    Synthesizing,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Researching => "researching",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Comparing => "comparing",
            JobStatus::Synthesizing => "synthesizing",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "researching" => Ok(JobStatus::Researching),
            "analyzing" => Ok(JobStatus::Analyzing),
            "comparing" => Ok(JobStatus::Comparing),
            "synthesizing" => Ok(JobStatus::Synthesizing),
            "complete" => Ok(JobStatus::Complete),
            "failed" => Ok(JobStatus::Failed),
            other => anyhow::bail!("unknown job status: {}", other),
        }
    }
}

/// 单个作业的完整台账记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub topic: String,
    pub max_papers: usize,
    pub status: JobStatus,
    pub processing_stage: String,
    pub progress_percentage: u8,
    pub current_message: String,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub final_state_json: Option<String>,
}

/// 列表视图的轻量摘要，不携带快照
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub topic: String,
    pub status: JobStatus,
    pub progress_percentage: u8,
    pub created_at: String,
    pub papers_analyzed: Option<usize>,
    pub papers_failed: Option<usize>,
}

/// 作业更新的增量字段，None表示保持现值
#[derive(Debug, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub processing_stage: Option<String>,
    pub progress_percentage: Option<u8>,
    pub current_message: Option<String>,
    pub error: Option<String>,
    pub final_state_json: Option<String>,
}

/// SQLite作业存储
pub struct JobStore {
    conn: Arc<Mutex<Connection>>,
}

impl JobStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open ledger database: {}", db_path.display()))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 内存数据库，测试用
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS research_jobs (
                job_id TEXT PRIMARY KEY,
                topic TEXT NOT NULL,
                max_papers INTEGER NOT NULL,
                status TEXT NOT NULL,
                processing_stage TEXT NOT NULL DEFAULT '',
                progress_percentage INTEGER NOT NULL DEFAULT 0,
                current_message TEXT NOT NULL DEFAULT '',
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                final_state_json TEXT
            )",
            [],
        )?;
        Ok(())
    }

    pub fn create_job(&self, job_id: &str, topic: &str, max_papers: usize) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO research_jobs
                (job_id, topic, max_papers, status, processing_stage,
                 progress_percentage, current_message, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'queued', 'queued', 0, 'Job queued', ?4, ?4)",
            rusqlite::params![job_id, topic, max_papers, now],
        )?;
        Ok(())
    }

    /// 动态拼接SET子句，只改给出的字段
    ///
    /// 带error的更新强制status为failed，updated_at总是刷新。
    pub fn update_job(&self, job_id: &str, mut update: JobUpdate) -> Result<()> {
        if update.error.is_some() {
            update.status = Some(JobStatus::Failed);
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(status) = update.status {
            sets.push("status = ?");
            values.push(Box::new(status.as_str().to_string()));
        }
        if let Some(stage) = update.processing_stage {
            sets.push("processing_stage = ?");
            values.push(Box::new(stage));
        }
        if let Some(progress) = update.progress_percentage {
            sets.push("progress_percentage = ?");
            values.push(Box::new(progress));
        }
        if let Some(message) = update.current_message {
            sets.push("current_message = ?");
            values.push(Box::new(message));
        }
        if let Some(error) = update.error {
            sets.push("error = ?");
            values.push(Box::new(error));
        }
        if let Some(snapshot) = update.final_state_json {
            sets.push("final_state_json = ?");
            values.push(Box::new(snapshot));
        }

        sets.push("updated_at = ?");
        values.push(Box::new(Utc::now().to_rfc3339()));
        values.push(Box::new(job_id.to_string()));

        let sql = format!(
            "UPDATE research_jobs SET {} WHERE job_id = ?",
            sets.join(", ")
        );
        let conn = self.lock()?;
        let changed = conn.execute(&sql, params_from_iter(values.iter().map(|v| v.as_ref())))?;
        if changed == 0 {
            anyhow::bail!("Job not found: {}", job_id);
        }
        Ok(())
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT job_id, topic, max_papers, status, processing_stage,
                        progress_percentage, current_message, error,
                        created_at, updated_at, final_state_json
                 FROM research_jobs WHERE job_id = ?1",
                [job_id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// 全部作业，新的在前，不带快照
    pub fn all_jobs(&self) -> Result<Vec<JobRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT job_id, topic, max_papers, status, processing_stage,
                    progress_percentage, current_message, error,
                    created_at, updated_at, NULL
             FROM research_jobs ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], Self::row_to_record)?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }

    /// 列表摘要，完成的作业从快照推导论文计数
    pub fn job_summaries(&self) -> Result<Vec<JobSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT job_id, topic, status, progress_percentage, created_at, final_state_json
             FROM research_jobs ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u8>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (job_id, topic, status_str, progress, created_at, snapshot) = row?;
            let status: JobStatus = status_str.parse()?;
            let (analyzed, failed) = match (&status, snapshot) {
                (JobStatus::Complete, Some(json)) => count_papers(&json),
                _ => (None, None),
            };
            summaries.push(JobSummary {
                job_id,
                topic,
                status,
                progress_percentage: progress,
                created_at,
                papers_analyzed: analyzed,
                papers_failed: failed,
            });
        }
        Ok(summaries)
    }

    /// 删除单个作业，返回是否存在
    pub fn delete_job(&self, job_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM research_jobs WHERE job_id = ?1", [job_id])?;
        Ok(changed > 0)
    }

    /// 清理早于保留期的终态作业，返回删除数量
    pub fn cleanup_old_jobs(&self, retention_hours: u64) -> Result<usize> {
        let cutoff = (Utc::now() - chrono::Duration::hours(retention_hours as i64)).to_rfc3339();
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM research_jobs
             WHERE created_at < ?1 AND status IN ('complete', 'failed')",
            [cutoff],
        )?;
        Ok(changed)
    }

    pub fn active_jobs_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: usize = conn.query_row(
            "SELECT COUNT(*) FROM research_jobs
             WHERE status NOT IN ('complete', 'failed')",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
        let status_str: String = row.get(3)?;
        let status = status_str.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("bad status: {}", status_str).into(),
            )
        })?;
        Ok(JobRecord {
            job_id: row.get(0)?,
            topic: row.get(1)?,
            max_papers: row.get::<_, i64>(2)? as usize,
            status,
            processing_stage: row.get(4)?,
            progress_percentage: row.get(5)?,
            current_message: row.get(6)?,
            error: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            final_state_json: row.get(10)?,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Ledger lock poisoned"))
    }
}

impl Clone for JobStore {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

/// 从最终快照里数出成功与失败的论文数
fn count_papers(snapshot_json: &str) -> (Option<usize>, Option<usize>) {
    #[derive(Deserialize)]
    struct Doc {
        extraction_status: String,
    }
    #[derive(Deserialize)]
    struct Snapshot {
        #[serde(default)]
        documents: Vec<Doc>,
    }

    match serde_json::from_str::<Snapshot>(snapshot_json) {
        Ok(snapshot) => {
            let ok = snapshot
                .documents
                .iter()
                .filter(|d| d.extraction_status == "success")
                .count();
            let failed = snapshot.documents.len() - ok;
            (Some(ok), Some(failed))
        }
        Err(_) => (None, None),
    }
}
