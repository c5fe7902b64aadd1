//! # PACS归档服务客户端
//!
//! 提供访问远程影像归档服务（Orthanc）的HTTP客户端：
//! - 患者列表查询，用于患者级去重
//! - 实例上传，带基本认证与请求超时

pub mod client;
pub mod orthanc;

pub use client::ArchiveClient;
pub use orthanc::{OrthancClient, DICOM_CONTENT_TYPE};
