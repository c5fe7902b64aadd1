//! PACS影像导入程序

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pacs_archive::OrthancClient;
use pacs_config::{ConfigValidator, ImporterConfig, LoggingConfig};
use pacs_core::PatientIdentifier;
use pacs_ingest::{BatchScanner, LiveWatcher};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// 影像导入命令行参数
#[derive(Parser, Debug)]
#[command(name = "pacs-importer")]
#[command(about = "将导入目录中的DICOM文件转发到PACS归档服务")]
struct Args {
    /// 配置文件路径（TOML）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<String>,

    /// 归档服务地址，覆盖配置文件
    #[arg(long)]
    archive_url: Option<String>,

    /// 导入根目录，覆盖配置文件
    #[arg(short, long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 扫描一次导入目录并上传归档服务中尚不存在的患者（默认）
    Scan {
        /// 只检查与遍历，不上传
        #[arg(long)]
        dry_run: bool,
    },
    /// 持续监控导入目录，新文件出现即上传
    Watch,
    /// 输出患者目录名对应的患者标识
    PatientId {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// 输出生效配置（密码已隐藏）
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // 配置加载期间的日志先交给临时订阅者
    let mut config = {
        let _guard = tracing_subscriber::fmt()
            .with_env_filter(bootstrap_filter())
            .set_default();
        ImporterConfig::load(args.config.as_deref()).context("加载配置失败")?
    };
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(url) = args.archive_url {
        config.archive.base_url = url;
    }
    if let Some(root) = args.root {
        config.import.root_dir = root;
    }

    init_logging(&config.logging)?;
    ConfigValidator::new()
        .validate(&config)
        .context("配置验证失败")?;

    match args.command.unwrap_or(Command::Scan { dry_run: false }) {
        Command::Scan { dry_run } => run_scan(&config, dry_run).await,
        Command::Watch => run_watch(&config).await,
        Command::PatientId { names } => {
            for name in names {
                println!("{}\t{}", name, PatientIdentifier::from_patient_name(&name));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::ShowConfig => {
            print!("{}", config.to_redacted_toml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn bootstrap_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 初始化日志，`RUST_LOG` 优先于配置；未知格式按文本输出
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("无效的日志级别: {}", logging.level))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn run_scan(config: &ImporterConfig, dry_run: bool) -> Result<ExitCode> {
    info!("归档服务: {}", config.archive.base_url);
    info!("导入目录: {}", config.import.root_dir.display());

    let archive = Arc::new(OrthancClient::new(&config.archive)?);
    let scanner = BatchScanner::new(config, archive).with_dry_run(dry_run);

    let summary = scanner
        .scan_and_upload(&config.import.root_dir)
        .await
        .with_context(|| format!("无法扫描导入目录 {}", config.import.root_dir.display()))?;

    if summary.has_failures() {
        error!("存在上传失败的文件或患者，请检查日志");
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn run_watch(config: &ImporterConfig) -> Result<ExitCode> {
    info!("归档服务: {}", config.archive.base_url);

    let archive = Arc::new(OrthancClient::new(&config.archive)?);
    let watcher = LiveWatcher::new(config, archive);

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(shutdown.clone()));

    watcher.run(shutdown).await.context("目录监控失败")?;
    Ok(ExitCode::SUCCESS)
}

/// 等待 Ctrl-C 或 SIGTERM 后取消监控
async fn wait_for_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("无法监听 Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("无法监听 SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_scan() {
        let args = Args::parse_from(["pacs-importer", "--root", "/data/import"]);
        assert!(args.command.is_none());
        assert_eq!(args.root, Some(PathBuf::from("/data/import")));
    }

    #[test]
    fn test_parse_subcommands() {
        let args = Args::parse_from(["pacs-importer", "scan", "--dry-run"]);
        assert!(matches!(args.command, Some(Command::Scan { dry_run: true })));

        let args = Args::parse_from(["pacs-importer", "--archive-url", "http://localhost:8042", "watch"]);
        assert!(matches!(args.command, Some(Command::Watch)));
        assert_eq!(args.archive_url.as_deref(), Some("http://localhost:8042"));

        let args = Args::parse_from(["pacs-importer", "patient-id", "alice", "bob"]);
        match args.command {
            Some(Command::PatientId { names }) => assert_eq!(names, vec!["alice", "bob"]),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_bootstrap_logging_is_scoped() {
        let logging = LoggingConfig::default();
        {
            let _guard = tracing_subscriber::fmt()
                .with_env_filter(bootstrap_filter())
                .set_default();
            info!("临时日志");
        }
        assert!(EnvFilter::try_new(&logging.level).is_ok());
    }

    #[test]
    fn test_patient_id_requires_a_name() {
        assert!(Args::try_parse_from(["pacs-importer", "patient-id"]).is_err());
    }
}
