//! 存储层错误类型
//!
//! - `WriteError`：单条写入失败（网络、鉴权、数据点被拒绝），由调用方记录后丢弃
//! - `SinkInitError`：启动时无法连接时序库，进程级致命错误

/// 单次写入错误。
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication failed: status {0}")]
    Unauthorized(u16),
    #[error("point rejected: status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid point: {0}")]
    InvalidPoint(String),
    #[error("sink closed")]
    Closed,
}

/// 时序库初始化错误。
#[derive(Debug, thiserror::Error)]
pub enum SinkInitError {
    #[error("http client error: {0}")]
    Client(String),
    #[error("sink unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },
}
