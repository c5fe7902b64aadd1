//! 测试用内存归档服务与目录夹具

use async_trait::async_trait;
use pacs_archive::ArchiveClient;
use pacs_core::{ArchivePatientRecord, PacsError, Result};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

/// 患者列表查询的预设响应
#[derive(Debug, Clone)]
pub enum PatientsResponse {
    Records(Vec<ArchivePatientRecord>),
    Status(u16),
    Transport,
}

/// 上传的预设响应，未预设时默认成功
#[derive(Debug, Clone)]
pub enum StoreResponse {
    Ok,
    Reject(u16, String),
    Transport,
}

pub struct MockArchive {
    patients: Mutex<PatientsResponse>,
    store_script: Mutex<VecDeque<StoreResponse>>,
    pub uploads: Mutex<Vec<Vec<u8>>>,
    pub patient_queries: Mutex<usize>,
}

impl MockArchive {
    pub fn new() -> Self {
        Self::with_patients(PatientsResponse::Records(Vec::new()))
    }

    pub fn with_patients(response: PatientsResponse) -> Self {
        Self {
            patients: Mutex::new(response),
            store_script: Mutex::new(VecDeque::new()),
            uploads: Mutex::new(Vec::new()),
            patient_queries: Mutex::new(0),
        }
    }

    pub fn script_store(&self, responses: Vec<StoreResponse>) {
        self.store_script.lock().unwrap().extend(responses);
    }

    pub fn uploaded(&self) -> Vec<Vec<u8>> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        *self.patient_queries.lock().unwrap()
    }
}

#[async_trait]
impl ArchiveClient for MockArchive {
    async fn list_patients(&self) -> Result<Vec<ArchivePatientRecord>> {
        *self.patient_queries.lock().unwrap() += 1;
        match self.patients.lock().unwrap().clone() {
            PatientsResponse::Records(records) => Ok(records),
            PatientsResponse::Status(status) => Err(PacsError::ArchiveRejected {
                status,
                body: "mock failure".to_string(),
            }),
            PatientsResponse::Transport => {
                Err(PacsError::Transport("connection refused".to_string()))
            }
        }
    }

    async fn store_instance(&self, body: Vec<u8>) -> Result<()> {
        self.uploads.lock().unwrap().push(body);
        let next = self
            .store_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StoreResponse::Ok);
        match next {
            StoreResponse::Ok => Ok(()),
            StoreResponse::Reject(status, body) => Err(PacsError::ArchiveRejected { status, body }),
            StoreResponse::Transport => Err(PacsError::Timeout("mock timeout".to_string())),
        }
    }

    fn endpoint(&self) -> &str {
        "mock://archive"
    }
}

/// 归档服务中的一条患者记录
pub fn patient_record(patient_id: &str) -> ArchivePatientRecord {
    let mut record = ArchivePatientRecord::default();
    record.main_dicom_tags.insert(
        "PatientID".to_string(),
        serde_json::Value::String(patient_id.to_string()),
    );
    record
}

/// 在根目录下写入文件，自动创建中间目录
pub fn write_file(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}
