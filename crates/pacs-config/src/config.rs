//! 配置管理
//!
//! 按“内置默认值 → 配置文件 → 环境变量”的顺序分层加载导入配置，并在使用前统一验证。

use config::{Config, Environment, File};
use pacs_core::{utils, PacsError, PatientMatch, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

/// 环境变量前缀，例如 `PACS_IMPORT_ARCHIVE__BASE_URL`
pub const ENV_PREFIX: &str = "PACS_IMPORT";

/// 导入系统完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImporterConfig {
    /// 归档服务配置
    pub archive: ArchiveConfig,
    /// 导入目录配置
    pub import: ImportConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 患者列表查询失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryFailurePolicy {
    /// 视为患者不存在，继续上传
    AssumeAbsent,
    /// 视为患者已存在，跳过
    AssumeExists,
    /// 记为该患者处理失败，不上传，留给操作员处理
    Fail,
}

/// 归档服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// 归档服务基础URL
    pub base_url: String,
    /// 基本认证用户名
    pub username: String,
    /// 基本认证密码
    pub password: String,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    /// 建立连接超时（秒）
    pub connect_timeout_secs: u64,
    /// 患者标识匹配方式
    pub patient_match: PatientMatch,
    /// 患者查询返回非成功状态时的策略
    pub on_query_status_error: QueryFailurePolicy,
    /// 患者查询发生网络或解析错误时的策略
    pub on_query_transport_error: QueryFailurePolicy,
    /// 查询患者列表时附加 `?expand`，让归档服务返回完整记录
    pub expand_patients: bool,
}

/// 导入目录配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// 导入根目录
    pub root_dir: PathBuf,
    /// 匹配的文件扩展名
    pub extension: String,
    /// 文件稳定性轮询间隔（毫秒）
    pub settle_interval_ms: u64,
    /// 连续多少次轮询大小与修改时间不变才视为写入完成
    pub settle_checks: u32,
    /// 等待文件稳定的最长时间（毫秒）
    pub settle_timeout_ms: u64,
    /// 监控模式下同一路径的去重窗口（秒）
    pub dedup_window_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或过滤表达式
    pub level: String,
    /// 输出格式：text 或 json
    pub format: String,
}

impl ArchiveConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl ImportConfig {
    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }

    /// 规范化后的扩展名
    pub fn normalized_extension(&self) -> String {
        utils::normalize_extension(&self.extension)
    }
}

impl ImporterConfig {
    /// 分层加载配置：默认值、可选配置文件、环境变量
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&ImporterConfig::default()).map_err(config_error)?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        );

        let settings = builder.build().map_err(config_error)?;
        let config: ImporterConfig = settings.try_deserialize().map_err(config_error)?;

        match config_path {
            Some(path) => info!("配置加载完成: {}", path.display()),
            None => info!("配置加载完成: 使用默认值与环境变量"),
        }
        Ok(config)
    }

    /// 序列化为TOML，密码以星号代替
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        if !redacted.archive.password.is_empty() {
            redacted.archive.password = "********".to_string();
        }
        toml::to_string_pretty(&redacted)
            .map_err(|e| PacsError::Config(format!("配置序列化失败: {}", e)))
    }
}

fn config_error(e: config::ConfigError) -> PacsError {
    PacsError::Config(e.to_string())
}

/// 配置验证规则
struct ValidationRule {
    field_path: &'static str,
    validator: fn(&ImporterConfig) -> std::result::Result<(), String>,
}

/// 配置验证器
pub struct ConfigValidator {
    validation_rules: Vec<ValidationRule>,
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "archive.base_url",
                validator: |config| {
                    let url = config.archive.base_url.trim();
                    if url.starts_with("http://") || url.starts_with("https://") {
                        Ok(())
                    } else {
                        Err(format!("必须是 http(s) 地址，当前为 '{}'", url))
                    }
                },
            },
            ValidationRule {
                field_path: "archive.request_timeout_secs",
                validator: |config| {
                    if config.archive.request_timeout_secs == 0 {
                        Err("请求超时不能为0".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "archive.connect_timeout_secs",
                validator: |config| {
                    if config.archive.connect_timeout_secs == 0 {
                        Err("连接超时不能为0".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "import.extension",
                validator: |config| {
                    if config.import.extension.trim().trim_start_matches('.').is_empty() {
                        Err("扩展名不能为空".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "import.settle_interval_ms",
                validator: |config| {
                    if config.import.settle_interval_ms == 0 {
                        Err("稳定性轮询间隔不能为0".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "import.settle_timeout_ms",
                validator: |config| {
                    if config.import.settle_timeout_ms < config.import.settle_interval_ms {
                        Err("等待超时不能小于轮询间隔".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "logging.format",
                validator: |config| match config.logging.format.as_str() {
                    "text" | "json" => Ok(()),
                    other => Err(format!("未知日志格式 '{}'", other)),
                },
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置，遇到第一条失败的规则即返回
    pub fn validate(&self, config: &ImporterConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(reason) = (rule.validator)(config) {
                error!("配置验证失败 {}: {}", rule.field_path, reason);
                return Err(PacsError::Config(format!("{}: {}", rule.field_path, reason)));
            }
        }
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: "http://pacs:8042".to_string(),
            username: "mapdr".to_string(),
            password: "mapdr".to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            patient_match: PatientMatch::Exact,
            on_query_status_error: QueryFailurePolicy::AssumeAbsent,
            on_query_transport_error: QueryFailurePolicy::Fail,
            expand_patients: true,
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/var/lib/orthanc/import"),
            extension: ".dcm".to_string(),
            settle_interval_ms: 1000,
            settle_checks: 1,
            settle_timeout_ms: 30_000,
            dedup_window_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}
