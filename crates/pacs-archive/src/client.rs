//! 归档服务客户端接口

use async_trait::async_trait;
use pacs_core::{ArchivePatientRecord, Result};

/// 远程影像归档服务
///
/// 导入流程只通过这两个调用与归档服务交互，便于在测试中替换。
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// 获取归档服务已知的患者列表
    ///
    /// 非成功状态返回 `PacsError::ArchiveRejected`，网络错误返回
    /// `Transport`/`Timeout`，响应无法解析返回 `InvalidResponse`。
    async fn list_patients(&self) -> Result<Vec<ArchivePatientRecord>>;

    /// 上传一个实例文件的原始字节
    ///
    /// 只有 HTTP 200 视为成功，其余状态返回 `PacsError::ArchiveRejected`。
    async fn store_instance(&self, body: Vec<u8>) -> Result<()>;

    /// 归档服务地址，用于日志
    fn endpoint(&self) -> &str;
}
