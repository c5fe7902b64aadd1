//! 影像文件上传
//!
//! 整个文件读入内存后一次性上传。任何失败都在这里转换为 `UploadOutcome`，
//! 不会向调用方传播，单个文件失败不影响同批其他文件。

use pacs_archive::ArchiveClient;
use pacs_core::{PacsError, UploadOutcome};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 日志中保留的响应体最大长度
const MAX_LOGGED_BODY: usize = 2048;

pub struct Uploader {
    archive: Arc<dyn ArchiveClient>,
}

impl Uploader {
    pub fn new(archive: Arc<dyn ArchiveClient>) -> Self {
        Self { archive }
    }

    /// 上传单个文件，不重试
    pub async fn upload(&self, path: &Path) -> UploadOutcome {
        let body = match tokio::fs::read(path).await {
            Ok(body) => body,
            Err(e) => {
                error!("读取文件失败 {}: {}", path.display(), e);
                return UploadOutcome::TransportFailure {
                    reason: e.to_string(),
                };
            }
        };

        match self.archive.store_instance(body).await {
            Ok(()) => {
                info!("上传成功: {}", path.display());
                UploadOutcome::Uploaded
            }
            Err(PacsError::ArchiveRejected { status, body }) => {
                warn!(
                    "上传被拒绝 {}: HTTP {}, 响应: {}",
                    path.display(),
                    status,
                    truncate(&body, MAX_LOGGED_BODY)
                );
                UploadOutcome::Rejected { status, body }
            }
            Err(e) => {
                error!("上传失败 {} -> {}: {}", path.display(), self.archive.endpoint(), e);
                UploadOutcome::TransportFailure {
                    reason: e.to_string(),
                }
            }
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
