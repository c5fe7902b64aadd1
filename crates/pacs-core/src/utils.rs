//! 通用工具函数

use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

/// 患者标识前缀
pub const PATIENT_ID_PREFIX: &str = "PAT";

/// 患者标识数字部分的取模基数（5位）
const PATIENT_ID_MODULUS: u64 = 100_000;

/// 由患者目录名派生患者标识
///
/// 使用固定种子的 xxh3，结果跨进程、跨平台稳定。
pub fn derive_patient_id(patient_name: &str) -> String {
    let hash = xxh3_64(patient_name.as_bytes());
    format!("{}{:05}", PATIENT_ID_PREFIX, hash % PATIENT_ID_MODULUS)
}

/// 规范化扩展名为带前导点的小写形式，如 `DCM` -> `.dcm`
pub fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim().trim_start_matches('.');
    format!(".{}", trimmed.to_ascii_lowercase())
}

/// 文件名是否以给定扩展名结尾（不区分大小写）
pub fn has_extension(path: &Path, extension: &str) -> bool {
    let wanted = normalize_extension(extension);
    path.file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase().ends_with(&wanted))
        .unwrap_or(false)
}
