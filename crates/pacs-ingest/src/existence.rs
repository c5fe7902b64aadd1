//! 患者存在性检查
//!
//! 每次调用都实时查询归档服务的患者列表，只反映查询时刻的状态。

use pacs_archive::ArchiveClient;
use pacs_config::{ArchiveConfig, QueryFailurePolicy};
use pacs_core::{PacsError, PatientIdentifier, PatientMatch, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// 患者存在性检查
pub struct ExistenceCheck {
    archive: Arc<dyn ArchiveClient>,
    patient_match: PatientMatch,
    on_status_error: QueryFailurePolicy,
    on_transport_error: QueryFailurePolicy,
}

impl ExistenceCheck {
    pub fn new(archive: Arc<dyn ArchiveClient>, config: &ArchiveConfig) -> Self {
        Self {
            archive,
            patient_match: config.patient_match,
            on_status_error: config.on_query_status_error,
            on_transport_error: config.on_query_transport_error,
        }
    }

    /// 归档服务中是否已有该患者
    ///
    /// 查询失败时按配置的策略处理；策略为 `Fail` 时返回原始错误。
    pub async fn patient_exists(&self, identifier: &PatientIdentifier) -> Result<bool> {
        match self.archive.list_patients().await {
            Ok(records) => {
                let found = records
                    .iter()
                    .any(|record| record.matches(identifier, self.patient_match));
                debug!(
                    "患者 {} 查询结果: {} (共 {} 条记录)",
                    identifier,
                    found,
                    records.len()
                );
                Ok(found)
            }
            Err(e @ PacsError::ArchiveRejected { .. }) => {
                Self::apply_policy(self.on_status_error, identifier, e)
            }
            Err(e) => Self::apply_policy(self.on_transport_error, identifier, e),
        }
    }

    fn apply_policy(
        policy: QueryFailurePolicy,
        identifier: &PatientIdentifier,
        error: PacsError,
    ) -> Result<bool> {
        match policy {
            QueryFailurePolicy::AssumeAbsent => {
                warn!("患者查询失败，按不存在处理 {}: {}", identifier, error);
                Ok(false)
            }
            QueryFailurePolicy::AssumeExists => {
                warn!("患者查询失败，按已存在处理 {}: {}", identifier, error);
                Ok(true)
            }
            QueryFailurePolicy::Fail => Err(error),
        }
    }
}
