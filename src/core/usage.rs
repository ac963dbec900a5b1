//! 远程存储用量统计

use crate::storage::FileInfo;
use serde::Serialize;
use std::collections::BTreeMap;

/// 探测目录前缀，统计时跳过
pub const PROBE_DIR_PREFIX: &str = ".probe-";

const STRUCTURED_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "toml", "csv", "xml"];

/// 文档、图片、音视频与压缩包
const BINARY_EXTENSIONS: &[&str] = &[
    "pdf", "png", "jpg", "jpeg", "gif", "webp", "heic", "bmp", "tiff", "svg", "mp3", "m4a", "aac",
    "wav", "flac", "ogg", "mp4", "mov", "m4v", "avi", "mkv", "webm", "zip", "tar", "gz", "tgz",
    "bz2", "xz", "7z", "rar",
];

/// 文件分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UsageCategory {
    Structured,
    Binary,
    Other,
}

/// 单个分类的用量
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUsage {
    pub size: u64,
    pub file_count: u64,
}

impl CategoryUsage {
    fn add(&mut self, size: u64) {
        self.size += size;
        self.file_count += 1;
    }
}

/// 用量报告
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUsageReport {
    pub total_size: u64,
    pub file_count: u64,
    pub breakdown: BTreeMap<UsageCategory, CategoryUsage>,
    /// 按扩展名（小写，无扩展名为空串）统计的大小
    pub by_extension: BTreeMap<String, u64>,
}

impl StorageUsageReport {
    pub fn category(&self, category: UsageCategory) -> CategoryUsage {
        self.breakdown.get(&category).cloned().unwrap_or_default()
    }

    pub fn extension_size(&self, ext: &str) -> u64 {
        self.by_extension.get(ext).copied().unwrap_or(0)
    }
}

fn extension(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// 按扩展名分类
pub fn categorize(path: &str) -> UsageCategory {
    let ext = extension(path);
    if STRUCTURED_EXTENSIONS.contains(&ext.as_str()) {
        UsageCategory::Structured
    } else if BINARY_EXTENSIONS.contains(&ext.as_str()) {
        UsageCategory::Binary
    } else {
        UsageCategory::Other
    }
}

/// 路径中任一段是探测目录
pub(crate) fn is_probe_entry(path: &str) -> bool {
    path.split('/').any(|seg| seg.starts_with(PROBE_DIR_PREFIX))
}

/// 汇总文件列表，跳过目录与探测残留
pub fn summarize(files: &[FileInfo]) -> StorageUsageReport {
    let mut report = StorageUsageReport::default();

    for file in files
        .iter()
        .filter(|f| !f.is_dir && !is_probe_entry(&f.path))
    {
        report.total_size += file.size;
        report.file_count += 1;
        report
            .breakdown
            .entry(categorize(&file.path))
            .or_default()
            .add(file.size);
        *report.by_extension.entry(extension(&file.path)).or_default() += file.size;
    }

    report
}
