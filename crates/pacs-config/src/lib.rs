//! # PACS导入配置模块
//!
//! 归档服务地址、认证信息、导入目录和各类超时都通过显式的配置结构传递给各组件。

pub mod config;

pub use crate::config::{
    ArchiveConfig, ConfigValidator, ImportConfig, ImporterConfig, LoggingConfig,
    QueryFailurePolicy, ENV_PREFIX,
};
