//! 批量扫描导入
//!
//! 单线程顺序执行：逐个患者做存在性检查，不存在则按发现顺序上传其下全部影像。
//! 去重只在患者粒度进行；单个文件或患者失败不影响后续处理。

use pacs_archive::ArchiveClient;
use pacs_config::ImporterConfig;
use pacs_core::{PatientIdentifier, Result, ScanSummary};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::existence::ExistenceCheck;
use crate::uploader::Uploader;
use crate::walker::DirectoryWalker;

/// 批量扫描器
pub struct BatchScanner {
    walker: DirectoryWalker,
    existence: ExistenceCheck,
    uploader: Uploader,
    dry_run: bool,
}

impl BatchScanner {
    pub fn new(config: &ImporterConfig, archive: Arc<dyn ArchiveClient>) -> Self {
        Self {
            walker: DirectoryWalker::new(&config.import.extension),
            existence: ExistenceCheck::new(archive.clone(), &config.archive),
            uploader: Uploader::new(archive),
            dry_run: false,
        }
    }

    /// 只检查与遍历，不实际上传
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 扫描根目录并上传归档服务中尚不存在的患者
    ///
    /// 只有根目录不可读时返回错误；其余失败都记录在统计中。
    pub async fn scan_and_upload(&self, root: &Path) -> Result<ScanSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("scan", run_id = %run_id);

        async move {
            info!("开始批量导入: {}", root.display());
            let patient_dirs = self.walker.patient_dirs(root)?;
            let mut summary = ScanSummary::start();

            for patient_dir in patient_dirs {
                let name = patient_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                summary.patients_seen += 1;

                self.process_patient(&patient_dir, &name, &mut summary)
                    .instrument(info_span!("patient", name = %name))
                    .await;
            }

            summary.finish();
            info!("批量导入完成: {}", summary);
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    async fn process_patient(&self, patient_dir: &Path, name: &str, summary: &mut ScanSummary) {
        let identifier = PatientIdentifier::from_patient_name(name);
        info!("处理患者: {} ({})", name, identifier);

        match self.existence.patient_exists(&identifier).await {
            Ok(true) => {
                info!("患者 {} ({}) 已存在于归档服务，跳过", name, identifier);
                summary.patients_skipped += 1;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                error!("患者 {} 存在性检查失败，本次不上传: {}", name, e);
                summary.patients_failed += 1;
                return;
            }
        }

        for file in self.walker.walk_patient(patient_dir) {
            summary.files_discovered += 1;
            if self.dry_run {
                info!("[dry-run] 待上传: {}", file.path.display());
                continue;
            }

            info!("上传影像: {}", file.file_name());
            let outcome = self.uploader.upload(&file.path).await;
            summary.record_outcome(&outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        patient_record, write_file, MockArchive, PatientsResponse, StoreResponse,
    };
    use pacs_config::QueryFailurePolicy;
    use pacs_core::PatientMatch;

    fn scanner(archive: Arc<MockArchive>, config: &ImporterConfig) -> BatchScanner {
        BatchScanner::new(config, archive)
    }

    #[tokio::test]
    async fn test_absent_patient_is_uploaded() {
        let root = tempfile::tempdir().unwrap();
        write_file(root.path(), "alice/study1/series1/a.dcm", b"alice-bytes");

        let archive = Arc::new(MockArchive::new());
        let summary = scanner(archive.clone(), &ImporterConfig::default())
            .scan_and_upload(root.path())
            .await
            .unwrap();

        assert_eq!(archive.uploaded(), vec![b"alice-bytes".to_vec()]);
        assert_eq!(summary.patients_seen, 1);
        assert_eq!(summary.files_uploaded, 1);
        assert!(!summary.has_failures());
    }

    #[tokio::test]
    async fn test_existing_patient_is_never_uploaded() {
        let root = tempfile::tempdir().unwrap();
        write_file(root.path(), "bob/study1/series1/b.dcm", b"bob-bytes");

        let bob = PatientIdentifier::from_patient_name("bob");
        let archive = Arc::new(MockArchive::with_patients(PatientsResponse::Records(vec![
            patient_record(&format!("X{}", bob)),
        ])));

        let mut config = ImporterConfig::default();
        config.archive.patient_match = PatientMatch::Contains;
        let summary = scanner(archive.clone(), &config)
            .scan_and_upload(root.path())
            .await
            .unwrap();

        assert!(archive.uploaded().is_empty());
        assert_eq!(summary.patients_skipped, 1);
        assert_eq!(summary.files_discovered, 0);
    }

    #[tokio::test]
    async fn test_query_status_error_uploads_everyone() {
        let root = tempfile::tempdir().unwrap();
        write_file(root.path(), "alice/study1/series1/a.dcm", b"a");
        write_file(root.path(), "bob/study1/series1/b.dcm", b"b");

        let archive = Arc::new(MockArchive::with_patients(PatientsResponse::Status(500)));
        let summary = scanner(archive.clone(), &ImporterConfig::default())
            .scan_and_upload(root.path())
            .await
            .unwrap();

        assert_eq!(archive.uploaded(), vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(archive.query_count(), 2);
        assert_eq!(summary.files_uploaded, 2);
    }

    #[tokio::test]
    async fn test_rejection_does_not_stop_series() {
        let root = tempfile::tempdir().unwrap();
        write_file(root.path(), "alice/study1/series1/1.dcm", b"first");
        write_file(root.path(), "alice/study1/series1/2.dcm", b"second");

        let archive = Arc::new(MockArchive::new());
        archive.script_store(vec![
            StoreResponse::Reject(409, "conflict".to_string()),
            StoreResponse::Ok,
        ]);
        let summary = scanner(archive.clone(), &ImporterConfig::default())
            .scan_and_upload(root.path())
            .await
            .unwrap();

        assert_eq!(archive.uploaded(), vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(summary.files_rejected, 1);
        assert_eq!(summary.files_uploaded, 1);
        assert!(summary.has_failures());
    }

    #[tokio::test]
    async fn test_query_transport_error_fails_patient_only() {
        let root = tempfile::tempdir().unwrap();
        write_file(root.path(), "alice/study1/series1/a.dcm", b"a");

        let archive = Arc::new(MockArchive::with_patients(PatientsResponse::Transport));
        let summary = scanner(archive.clone(), &ImporterConfig::default())
            .scan_and_upload(root.path())
            .await
            .unwrap();

        assert!(archive.uploaded().is_empty());
        assert_eq!(summary.patients_failed, 1);
        assert!(summary.has_failures());

        let mut config = ImporterConfig::default();
        config.archive.on_query_transport_error = QueryFailurePolicy::AssumeAbsent;
        let archive = Arc::new(MockArchive::with_patients(PatientsResponse::Transport));
        let summary = scanner(archive.clone(), &config)
            .scan_and_upload(root.path())
            .await
            .unwrap();
        assert_eq!(summary.files_uploaded, 1);
    }

    #[tokio::test]
    async fn test_dry_run_uploads_nothing() {
        let root = tempfile::tempdir().unwrap();
        write_file(root.path(), "alice/study1/series1/a.dcm", b"a");
        write_file(root.path(), "alice/study1/series2/b.dcm", b"b");

        let archive = Arc::new(MockArchive::new());
        let summary = scanner(archive.clone(), &ImporterConfig::default())
            .with_dry_run(true)
            .scan_and_upload(root.path())
            .await
            .unwrap();

        assert!(archive.uploaded().is_empty());
        assert_eq!(summary.files_discovered, 2);
        assert_eq!(archive.query_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_root_fails_the_scan() {
        let archive = Arc::new(MockArchive::new());
        let result = scanner(archive, &ImporterConfig::default())
            .scan_and_upload(Path::new("/nonexistent/import"))
            .await;
        assert!(result.is_err());
    }
}
