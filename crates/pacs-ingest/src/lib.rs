//! # PACS影像导入模块
//!
//! 从导入目录向归档服务转发影像文件，文件内容按原样上传，不做解析。
//! - 批量扫描：按患者检查归档服务，只上传尚不存在的患者
//! - 实时监控：新文件或新目录出现后立即上传
//!
//! 两种模式共用同一个目录遍历器与上传器。

pub mod existence;
pub mod scanner;
pub mod settle;
pub mod uploader;
pub mod walker;
pub mod watcher;

#[cfg(test)]
mod test_support;

pub use existence::ExistenceCheck;
pub use scanner::BatchScanner;
pub use settle::SettlePolicy;
pub use uploader::Uploader;
pub use walker::DirectoryWalker;
pub use watcher::{LiveWatcher, WatchEvent};
