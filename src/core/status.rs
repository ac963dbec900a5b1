//! 远程文件同步状态查询

use crate::core::paths::SyncTarget;
use crate::error::SyncError;
use crate::storage::{DownloadingStatus, RemoteStore};
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// 文件同步状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSyncStatus {
    NotInRemote,
    NotDownloaded,
    Downloading,
    Downloaded,
    Current,
    Conflicted,
    Unknown,
    Error(String),
}

impl FileSyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileSyncStatus::NotInRemote => "notInRemote",
            FileSyncStatus::NotDownloaded => "notDownloaded",
            FileSyncStatus::Downloading => "downloading",
            FileSyncStatus::Downloaded => "downloaded",
            FileSyncStatus::Current => "current",
            FileSyncStatus::Conflicted => "conflicted",
            FileSyncStatus::Unknown => "unknown",
            FileSyncStatus::Error(_) => "error",
        }
    }

    /// 文件内容已在本机可用
    pub fn is_materialized(&self) -> bool {
        matches!(self, FileSyncStatus::Current | FileSyncStatus::Downloaded)
    }
}

impl From<DownloadingStatus> for FileSyncStatus {
    fn from(status: DownloadingStatus) -> Self {
        match status {
            DownloadingStatus::NotDownloaded => FileSyncStatus::NotDownloaded,
            DownloadingStatus::Downloading => FileSyncStatus::Downloading,
            DownloadingStatus::Downloaded => FileSyncStatus::Downloaded,
            DownloadingStatus::Current => FileSyncStatus::Current,
        }
    }
}

impl Serialize for FileSyncStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// 单个文件的状态报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatusReport {
    pub file_name: String,
    pub status: FileSyncStatus,
    pub is_downloaded: bool,
    pub is_uploaded: bool,
    pub has_conflicts: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FileStatusReport {
    fn new(file_name: &str, status: FileSyncStatus) -> Self {
        let message = match &status {
            FileSyncStatus::Error(detail) => Some(detail.clone()),
            _ => None,
        };
        Self {
            file_name: file_name.to_string(),
            is_downloaded: status.is_materialized(),
            status,
            is_uploaded: false,
            has_conflicts: false,
            last_modified: None,
            size: None,
            message,
        }
    }
}

/// 状态查询器，每次查询只读取一次远程元数据，不轮询
pub struct StatusInspector {
    remote: Arc<dyn RemoteStore>,
}

impl StatusInspector {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }

    pub async fn status(&self, target: &SyncTarget) -> FileStatusReport {
        let item = match self.remote.item_status(&target.remote_path).await {
            Ok(item) => item,
            Err(e) if SyncError::is_not_found(&e) => {
                return FileStatusReport::new(&target.file_name, FileSyncStatus::NotInRemote)
            }
            Err(e) => {
                tracing::warn!("读取同步状态失败 {}: {}", target.remote_path, e);
                return FileStatusReport::new(
                    &target.file_name,
                    FileSyncStatus::Error(e.to_string()),
                );
            }
        };

        // 冲突优先于下载状态
        let status = if item.has_conflicts {
            FileSyncStatus::Conflicted
        } else {
            item.downloading
                .map(FileSyncStatus::from)
                .unwrap_or(FileSyncStatus::Unknown)
        };

        let message = item
            .downloading_error
            .as_ref()
            .map(|e| format!("下载错误: {}", e))
            .or_else(|| item.uploading_error.as_ref().map(|e| format!("上传错误: {}", e)));

        FileStatusReport {
            file_name: target.file_name.clone(),
            is_downloaded: status.is_materialized(),
            status,
            is_uploaded: item.is_uploaded,
            has_conflicts: item.has_conflicts,
            last_modified: item.modified_time,
            size: item.size,
            message,
        }
    }
}
