//! 导入目录遍历
//!
//! 目录结构固定为 `根目录/患者/检查(dat)/系列/*.dcm`。
//! 各层中的非目录条目直接跳过；层级不足或更深的文件不产出，也不报错。
//! 同一层内按名称排序，保证遍历顺序可复现。

use pacs_core::{utils, ImagingFile, Result};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// 患者目录到影像文件的层数：检查/系列/文件
const PATIENT_DEPTH: usize = 3;

/// 三级目录遍历器
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    extension: String,
}

impl DirectoryWalker {
    pub fn new(extension: &str) -> Self {
        Self {
            extension: utils::normalize_extension(extension),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// 是否为待导入的文件
    pub fn matches(&self, path: &Path) -> bool {
        utils::has_extension(path, &self.extension)
    }

    /// 根目录下的患者目录
    ///
    /// 根目录本身不可读时返回错误，这是唯一会中止批量扫描的文件系统错误。
    pub fn patient_dirs(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in level_walk(root, 1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(io::Error::from(e).into()),
                Err(e) => {
                    debug!("跳过无法读取的条目: {}", e);
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                dirs.push(entry.into_path());
            } else {
                debug!("跳过根目录下的非目录条目: {}", entry.path().display());
            }
        }
        Ok(dirs)
    }

    /// 遍历一个患者目录下的全部影像文件（惰性）
    pub fn walk_patient<'a>(&'a self, patient_dir: &Path) -> impl Iterator<Item = ImagingFile> + 'a {
        self.walk_levels(patient_dir, vec![dir_name(patient_dir)])
    }

    /// 遍历新建目录下的影像文件，按其相对根目录的深度决定剩余层数
    ///
    /// 深度1视为患者目录，深度2为检查目录，深度3为系列目录；其余深度不产出。
    pub fn walk_created_dir(&self, root: &Path, dir: &Path) -> Vec<ImagingFile> {
        let labels: Vec<String> = match dir.strip_prefix(root) {
            Ok(relative) => relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect(),
            Err(_) => return Vec::new(),
        };

        if labels.is_empty() || labels.len() > PATIENT_DEPTH {
            debug!("新建目录不在预期层级，忽略: {}", dir.display());
            return Vec::new();
        }
        self.walk_levels(dir, labels).collect()
    }

    /// 从 `base` 向下走完剩余层级，只产出恰好位于系列目录中的匹配文件
    ///
    /// `labels` 是 `base` 及其上层已确定的患者/检查/系列名。
    fn walk_levels<'a>(
        &'a self,
        base: &Path,
        labels: Vec<String>,
    ) -> impl Iterator<Item = ImagingFile> + 'a {
        let depth = PATIENT_DEPTH + 1 - labels.len();
        let base_dir = base.to_path_buf();

        level_walk(base, depth)
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("跳过无法读取的目录: {}", e);
                    None
                }
            })
            .filter(move |entry| entry.file_type().is_file() && self.matches(entry.path()))
            .map(move |entry| to_imaging_file(&base_dir, &labels, entry))
    }
}

/// 只产出恰好位于 `depth` 层的条目，同层按名称排序
///
/// 更浅或更深的条目都不产出。
fn level_walk(base: &Path, depth: usize) -> walkdir::IntoIter {
    WalkDir::new(base)
        .min_depth(depth)
        .max_depth(depth)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
}

fn to_imaging_file(base: &Path, labels: &[String], entry: DirEntry) -> ImagingFile {
    let mut names = labels.to_vec();
    if let Some(parent) = entry.path().parent().and_then(|p| p.strip_prefix(base).ok()) {
        names.extend(
            parent
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned()),
        );
    }
    let label = |i: usize| names.get(i).map(String::as_str).unwrap_or_default();
    ImagingFile::new(entry.into_path(), label(0), label(1), label(2))
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
