//! Orthanc REST 客户端
//!
//! - `GET /patients`：查询已归档患者
//! - `POST /instances`：以 `application/dicom` 上传实例原始字节

use async_trait::async_trait;
use pacs_config::ArchiveConfig;
use pacs_core::{ArchivePatientRecord, PacsError, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::debug;

use crate::client::ArchiveClient;

/// DICOM 文件的 MIME 类型
pub const DICOM_CONTENT_TYPE: &str = "application/dicom";

/// 基本认证凭据
#[derive(Debug, Clone)]
struct Credentials {
    username: String,
    password: String,
}

/// Orthanc 归档服务客户端
pub struct OrthancClient {
    base_url: String,
    credentials: Credentials,
    expand_patients: bool,
    client: reqwest::Client,
}

impl OrthancClient {
    /// 按配置创建客户端，请求超时和连接超时都在此设置
    pub fn new(config: &ArchiveConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(concat!("pacs-importer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PacsError::Config(format!("无法创建HTTP客户端: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials: Credentials {
                username: config.username.clone(),
                password: config.password.clone(),
            },
            expand_patients: config.expand_patients,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(&self.credentials.username, Some(&self.credentials.password))
    }

    async fn rejection(response: reqwest::Response) -> PacsError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        PacsError::ArchiveRejected { status, body }
    }
}

/// 超时单独归类，其余请求错误统一视为传输失败
fn transport_error(e: reqwest::Error) -> PacsError {
    if e.is_timeout() {
        PacsError::Timeout(e.to_string())
    } else {
        PacsError::Transport(e.to_string())
    }
}

#[async_trait]
impl ArchiveClient for OrthancClient {
    async fn list_patients(&self) -> Result<Vec<ArchivePatientRecord>> {
        let url = if self.expand_patients {
            self.url("/patients?expand")
        } else {
            self.url("/patients")
        };
        debug!("查询患者列表: {}", url);

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() != StatusCode::OK {
            return Err(Self::rejection(response).await);
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| PacsError::InvalidResponse(format!("患者列表解析失败: {}", e)))
    }

    async fn store_instance(&self, body: Vec<u8>) -> Result<()> {
        let url = self.url("/instances");
        debug!("上传实例: {} ({} bytes)", url, body.len());

        let response = self
            .authorized(self.client.post(&url))
            .header(CONTENT_TYPE, DICOM_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::OK {
            Ok(())
        } else {
            Err(Self::rejection(response).await)
        }
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}
