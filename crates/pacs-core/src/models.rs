//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::utils;

/// 待导入的影像文件
///
/// 由目录遍历或文件系统事件发现，只交给上传器消费一次，之后不再修改。
/// 患者、检查、系列标签按导入根目录下的路径段推断。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagingFile {
    pub path: PathBuf,
    pub patient: Option<String>, // 第0段：患者目录名
    pub study: Option<String>,   // 第1段：检查（dat）目录名
    pub series: Option<String>,  // 第2段：系列目录名
}

impl ImagingFile {
    /// 由遍历得到的完整三级结构构造
    pub fn new(path: PathBuf, patient: &str, study: &str, series: &str) -> Self {
        Self {
            path,
            patient: Some(patient.to_string()),
            study: Some(study.to_string()),
            series: Some(series.to_string()),
        }
    }

    /// 根据相对导入根目录的路径段推断标签
    ///
    /// 只取文件所在目录的前三段，文件名本身不作为标签；
    /// 不在根目录之下的路径得到全空标签。
    pub fn from_root(root: &Path, path: &Path) -> Self {
        let mut segments = path
            .strip_prefix(root)
            .ok()
            .and_then(|relative| relative.parent())
            .map(|dir| {
                dir.components()
                    .filter_map(|c| match c {
                        Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
            .into_iter();

        Self {
            path: path.to_path_buf(),
            patient: segments.next(),
            study: segments.next(),
            series: segments.next(),
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// 由患者目录名派生的患者标识
///
/// 同一目录名在任何一次运行中都得到相同的标识；不同目录名可能碰撞，不做检测。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatientIdentifier(String);

impl PatientIdentifier {
    pub fn from_patient_name(name: &str) -> Self {
        Self(utils::derive_patient_id(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 患者标识的匹配方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientMatch {
    /// PatientID 与派生标识完全相等
    Exact,
    /// PatientID 包含派生标识（旧版子串匹配）
    Contains,
}

/// 归档服务患者列表中的一条记录
///
/// 只使用 `MainDicomTags.PatientID`，其余字段忽略。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchivePatientRecord {
    #[serde(rename = "ID", default)]
    pub id: Option<String>,
    #[serde(rename = "MainDicomTags", default)]
    pub main_dicom_tags: BTreeMap<String, serde_json::Value>,
}

impl ArchivePatientRecord {
    /// 归档服务记录的 PatientID 标签
    pub fn patient_id(&self) -> Option<&str> {
        self.main_dicom_tags.get("PatientID").and_then(|v| v.as_str())
    }

    pub fn matches(&self, identifier: &PatientIdentifier, mode: PatientMatch) -> bool {
        match (self.patient_id(), mode) {
            (Some(id), PatientMatch::Exact) => id == identifier.as_str(),
            (Some(id), PatientMatch::Contains) => id.contains(identifier.as_str()),
            (None, _) => false,
        }
    }
}

/// 单个文件的上传结果（只记录日志，不持久化）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// 归档服务返回 200
    Uploaded,
    /// 归档服务返回非 200 状态
    Rejected { status: u16, body: String },
    /// 连接、超时或读文件失败
    TransportFailure { reason: String },
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded)
    }
}

/// 一次导入运行的统计
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub patients_seen: u64,
    pub patients_skipped: u64,
    pub patients_failed: u64,
    pub files_discovered: u64,
    pub files_uploaded: u64,
    pub files_rejected: u64,
    pub files_failed: u64,
}

impl ScanSummary {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            patients_seen: 0,
            patients_skipped: 0,
            patients_failed: 0,
            files_discovered: 0,
            files_uploaded: 0,
            files_rejected: 0,
            files_failed: 0,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn record_outcome(&mut self, outcome: &UploadOutcome) {
        match outcome {
            UploadOutcome::Uploaded => self.files_uploaded += 1,
            UploadOutcome::Rejected { .. } => self.files_rejected += 1,
            UploadOutcome::TransportFailure { .. } => self.files_failed += 1,
        }
    }

    /// 是否有任何文件或患者失败（决定进程退出码）
    pub fn has_failures(&self) -> bool {
        self.patients_failed > 0 || self.files_rejected > 0 || self.files_failed > 0
    }

    pub fn elapsed_ms(&self) -> i64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds()
    }
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "患者: {} 个 (跳过 {}, 失败 {}); 文件: 发现 {}, 上传 {}, 拒绝 {}, 失败 {}; 耗时 {} ms",
            self.patients_seen,
            self.patients_skipped,
            self.patients_failed,
            self.files_discovered,
            self.files_uploaded,
            self.files_rejected,
            self.files_failed,
            self.elapsed_ms()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_from_root() {
        let root = Path::new("/import");
        let file = ImagingFile::from_root(root, Path::new("/import/alice/study1/series1/a.dcm"));
        assert_eq!(file.patient.as_deref(), Some("alice"));
        assert_eq!(file.study.as_deref(), Some("study1"));
        assert_eq!(file.series.as_deref(), Some("series1"));
        assert_eq!(file.file_name(), "a.dcm");

        let shallow = ImagingFile::from_root(root, Path::new("/import/alice/a.dcm"));
        assert_eq!(shallow.patient.as_deref(), Some("alice"));
        assert_eq!(shallow.study, None);

        let outside = ImagingFile::from_root(root, Path::new("/elsewhere/a.dcm"));
        assert_eq!(outside.patient, None);
    }

    #[test]
    fn test_patient_record_from_archive_json() {
        let json = r#"[
            {"ID": "abc", "Type": "Patient", "MainDicomTags": {"PatientID": "PAT00042", "PatientName": "ALICE"}},
            {"ID": "def", "Type": "Patient", "MainDicomTags": {}}
        ]"#;
        let records: Vec<ArchivePatientRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].patient_id(), Some("PAT00042"));
        assert_eq!(records[1].patient_id(), None);
    }

    #[test]
    fn test_patient_match_modes() {
        let mut record = ArchivePatientRecord::default();
        record
            .main_dicom_tags
            .insert("PatientID".into(), serde_json::json!("XPAT00042"));

        let id = PatientIdentifier("PAT00042".into());
        assert!(!record.matches(&id, PatientMatch::Exact));
        assert!(record.matches(&id, PatientMatch::Contains));

        record
            .main_dicom_tags
            .insert("PatientID".into(), serde_json::json!("PAT00042"));
        assert!(record.matches(&id, PatientMatch::Exact));
    }

    #[test]
    fn test_summary_failures() {
        let mut summary = ScanSummary::start();
        summary.record_outcome(&UploadOutcome::Uploaded);
        assert!(!summary.has_failures());

        summary.record_outcome(&UploadOutcome::Rejected {
            status: 409,
            body: String::new(),
        });
        assert!(summary.has_failures());
        assert_eq!(summary.files_uploaded, 1);
        assert_eq!(summary.files_rejected, 1);
    }
}
