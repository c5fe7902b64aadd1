//! 文件写入完成判定
//!
//! 轮询文件大小与修改时间，连续若干次不变才视为写入完成。
//! 这只是启发式判断：写入方长时间停顿后继续写仍可能被误判。

use pacs_config::ImportConfig;
use pacs_core::{PacsError, Result};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tracing::debug;

/// 文件稳定性等待策略
#[derive(Debug, Clone)]
pub struct SettlePolicy {
    pub interval: Duration,
    pub checks: u32,
    pub timeout: Duration,
}

#[derive(Debug, PartialEq, Eq)]
struct Snapshot {
    len: u64,
    modified: Option<SystemTime>,
}

impl SettlePolicy {
    pub fn from_config(config: &ImportConfig) -> Self {
        Self {
            interval: config.settle_interval(),
            checks: config.settle_checks.max(1),
            timeout: config.settle_timeout(),
        }
    }

    /// 等待文件写入完成
    ///
    /// 超时仍在变化返回 `Unsettled`；文件消失返回 `Io`。
    pub async fn wait_until_settled(&self, path: &Path) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        let mut last = snapshot(path).await?;
        let mut stable = 0;

        loop {
            tokio::time::sleep(self.interval).await;
            let current = snapshot(path).await?;

            if current == last {
                stable += 1;
                if stable >= self.checks {
                    debug!("文件已稳定: {} ({} bytes)", path.display(), current.len);
                    return Ok(());
                }
            } else {
                stable = 0;
                last = current;
            }

            if Instant::now() >= deadline {
                return Err(PacsError::Unsettled(format!(
                    "{} 在 {:?} 内仍在变化",
                    path.display(),
                    self.timeout
                )));
            }
        }
    }
}

async fn snapshot(path: &Path) -> Result<Snapshot> {
    let metadata = tokio::fs::metadata(path).await?;
    Ok(Snapshot {
        len: metadata.len(),
        modified: metadata.modified().ok(),
    })
}
