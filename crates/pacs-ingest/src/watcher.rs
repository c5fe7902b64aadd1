//! 导入目录实时监控
//!
//! 订阅根目录（递归）的文件系统创建事件，由单个消费循环逐个处理：
//! - 新文件：匹配扩展名则等待写入完成后上传
//! - 新目录：按其深度遍历剩余层级，上传其中全部影像
//!
//! 监控路径不做患者存在性检查。一个事件处理完才处理下一个。

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use pacs_archive::ArchiveClient;
use pacs_config::ImporterConfig;
use pacs_core::{ImagingFile, PacsError, Result, ScanSummary};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::settle::SettlePolicy;
use crate::uploader::Uploader;
use crate::walker::DirectoryWalker;

/// 监控循环处理的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    FileCreated(PathBuf),
    DirectoryCreated(PathBuf),
}

impl WatchEvent {
    /// 把文件系统通知转换为监控事件，非创建类事件忽略
    ///
    /// 移入监控目录的重命名（`Name(To)`/`Name(Both)` 的目标路径，
    /// 以及仍存在的 `Name(Any)` 路径）也视为创建。
    pub fn from_notify(event: &Event) -> Vec<WatchEvent> {
        let paths: Vec<&PathBuf> = match event.kind {
            EventKind::Create(_) => event.paths.iter().collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.iter().collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                event.paths.last().into_iter().collect()
            }
            // FSEvents 与 Windows 不区分移入移出，只认仍存在的路径
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
                event.paths.iter().filter(|path| path.exists()).collect()
            }
            _ => return Vec::new(),
        };

        paths
            .into_iter()
            .map(|path| {
                let is_dir = match event.kind {
                    EventKind::Create(CreateKind::Folder) => true,
                    EventKind::Create(CreateKind::File) => false,
                    _ => path.is_dir(),
                };
                if is_dir {
                    WatchEvent::DirectoryCreated(path.clone())
                } else {
                    WatchEvent::FileCreated(path.clone())
                }
            })
            .collect()
    }
}

/// 实时监控器
pub struct LiveWatcher {
    root: PathBuf,
    walker: DirectoryWalker,
    uploader: Uploader,
    settle: SettlePolicy,
    dedup_window: Duration,
    recent: HashMap<PathBuf, Instant>,
    summary: ScanSummary,
}

impl LiveWatcher {
    pub fn new(config: &ImporterConfig, archive: Arc<dyn ArchiveClient>) -> Self {
        Self {
            root: config.import.root_dir.clone(),
            walker: DirectoryWalker::new(&config.import.extension),
            uploader: Uploader::new(archive),
            settle: SettlePolicy::from_config(&config.import),
            dedup_window: config.import.dedup_window(),
            recent: HashMap::new(),
            summary: ScanSummary::start(),
        }
    }

    /// 订阅根目录并持续处理事件，直到 `shutdown` 被取消
    ///
    /// 正在处理的事件会完成，队列中尚未处理的事件被丢弃。
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<ScanSummary> {
        // 通知中的路径是规范化后的绝对路径，根目录需与之一致才能推断层级
        if let Ok(canonical) = self.root.canonicalize() {
            self.root = canonical;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            })
            .map_err(watch_error)?;
        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(watch_error)?;

        info!("开始监控目录: {}", self.root.display());
        info!("监控所有子目录中的 *{} 文件", self.walker.extension());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("收到停止信号，结束监控");
                    break;
                }
                received = rx.recv() => {
                    match received {
                        Some(Ok(event)) => {
                            for watch_event in WatchEvent::from_notify(&event) {
                                self.handle_event(watch_event, &shutdown).await;
                            }
                        }
                        Some(Err(e)) => warn!("文件系统通知错误: {}", e),
                        None => {
                            warn!("文件系统通知通道已关闭");
                            break;
                        }
                    }
                }
            }
        }

        drop(watcher);
        self.summary.finish();
        info!("监控结束: {}", self.summary);
        Ok(self.summary)
    }

    /// 处理单个监控事件
    pub async fn handle_event(&mut self, event: WatchEvent, shutdown: &CancellationToken) {
        match event {
            WatchEvent::FileCreated(path) => {
                if !self.walker.matches(&path) {
                    debug!("忽略非影像文件: {}", path.display());
                    return;
                }
                let file = ImagingFile::from_root(&self.root, &path);
                info!(
                    "处理文件: 患者={}, 检查={}, 系列={}",
                    file.patient.as_deref().unwrap_or("-"),
                    file.study.as_deref().unwrap_or("-"),
                    file.series.as_deref().unwrap_or("-")
                );
                let span = info_span!("file", patient = file.patient.as_deref().unwrap_or("-"));
                self.dispatch(file).instrument(span).await;
            }
            WatchEvent::DirectoryCreated(dir) => {
                let files = self.walker.walk_created_dir(&self.root, &dir);
                info!("新目录 {}: 发现 {} 个影像文件", dir.display(), files.len());
                for file in files {
                    if shutdown.is_cancelled() {
                        info!("停止中，剩余文件不再上传: {}", dir.display());
                        break;
                    }
                    let span =
                        info_span!("file", patient = file.patient.as_deref().unwrap_or("-"));
                    self.dispatch(file).instrument(span).await;
                }
            }
        }
    }

    /// 统计信息
    pub fn summary(&self) -> &ScanSummary {
        &self.summary
    }

    async fn dispatch(&mut self, file: ImagingFile) {
        if !self.claim(&file.path) {
            debug!("去重窗口内已处理，跳过: {}", file.path.display());
            return;
        }
        self.summary.files_discovered += 1;

        if let Err(e) = self.settle.wait_until_settled(&file.path).await {
            warn!("文件未就绪，跳过上传 {}: {}", file.path.display(), e);
            self.summary.files_failed += 1;
            return;
        }

        info!("上传影像: {}", file.file_name());
        let outcome = self.uploader.upload(&file.path).await;
        self.summary.record_outcome(&outcome);
    }

    /// 在去重窗口内首次出现的路径返回 true
    fn claim(&mut self, path: &Path) -> bool {
        let now = Instant::now();
        let window = self.dedup_window;
        self.recent
            .retain(|_, seen| now.duration_since(*seen) < window);

        if self.recent.contains_key(path) {
            false
        } else {
            self.recent.insert(path.to_path_buf(), now);
            true
        }
    }
}

fn watch_error(e: notify::Error) -> PacsError {
    PacsError::Watch(e.to_string())
}
