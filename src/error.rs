use thiserror::Error;

/// 可归类的任务级错误
///
/// 仅用于后台执行器生成面向用户的失败消息，三类错误最终都落到
/// 同一个failed终态，区别只在消息文案。
#[derive(Debug, Error)]
pub enum ResearchError {
    /// 输入校验失败（主题过短、论文数越界等）
    #[error("validation error: {0}")]
    Validation(String),

    /// 外部服务连接失败（arXiv、LLM、嵌入服务）
    #[error("connection failed: {0}")]
    Connectivity(String),
}
