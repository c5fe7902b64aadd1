//! 错误定义模块

use thiserror::Error;

/// 影像导入系统统一错误类型
#[derive(Error, Debug)]
pub enum PacsError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("网络传输错误: {0}")]
    Transport(String),

    #[error("请求超时: {0}")]
    Timeout(String),

    #[error("归档服务拒绝请求: HTTP {status}: {body}")]
    ArchiveRejected { status: u16, body: String },

    #[error("归档服务响应无效: {0}")]
    InvalidResponse(String),

    #[error("文件未写入完成: {0}")]
    Unsettled(String),

    #[error("目录监控错误: {0}")]
    Watch(String),
}

impl PacsError {
    /// 是否属于传输层失败（连接、DNS、超时、读文件）
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            PacsError::Transport(_) | PacsError::Timeout(_) | PacsError::Io(_)
        )
    }
}

/// 影像导入系统统一结果类型
pub type Result<T> = std::result::Result<T, PacsError>;
