//! 远程存储的物化语义
//!
//! 云端文档容器中的文件可能只存在元数据（尚未下载到本机），也可能处于下载中、
//! 已下载或与云端一致的状态。对象存储总是立即一致，而云盘类存储需要显式触发下载。

use super::Storage;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;

/// 远程文件的下载状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadingStatus {
    NotDownloaded,
    Downloading,
    /// 已下载，但可能不是最新版本
    Downloaded,
    /// 已下载且与云端一致
    Current,
}

/// 远程文件的同步元数据
#[derive(Debug, Clone, Default)]
pub struct ItemStatus {
    pub downloading: Option<DownloadingStatus>,
    pub has_conflicts: bool,
    pub is_uploaded: bool,
    pub downloading_error: Option<String>,
    pub uploading_error: Option<String>,
    pub size: Option<u64>,
    /// 修改时间（Unix 毫秒）
    pub modified_time: Option<i64>,
}

impl ItemStatus {
    /// 已物化并与云端一致
    pub fn current() -> Self {
        Self {
            downloading: Some(DownloadingStatus::Current),
            has_conflicts: false,
            is_uploaded: true,
            downloading_error: None,
            uploading_error: None,
            size: None,
            modified_time: None,
        }
    }
}

/// 远程容器的访问能力
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerAccess {
    pub reachable: bool,
    pub readable: bool,
    pub writable: bool,
}

/// 远程文档存储
#[async_trait]
pub trait RemoteStore: Storage {
    /// 当前会话身份，未登录或未挂载时为 None
    fn identity(&self) -> Option<String>;

    /// 检查容器根目录的可达性与读写权限
    async fn container_access(&self) -> Result<ContainerAccess>;

    /// 读取单个文件的同步元数据（一次读取，不轮询），文件不存在时返回 NotFound 错误
    async fn item_status(&self, path: &str) -> Result<ItemStatus>;

    /// 触发远程存储开始物化文件
    async fn start_downloading(&self, path: &str) -> Result<()>;

    /// 容器在本机上的目录（仅挂载型存储）
    fn local_root(&self) -> Option<PathBuf> {
        None
    }
}
