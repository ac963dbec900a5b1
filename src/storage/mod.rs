pub mod cloud;
pub mod local;
pub mod remote;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use cloud::CloudStorage;
pub use local::LocalStorage;
pub use remote::{ContainerAccess, DownloadingStatus, ItemStatus, RemoteStore};

use crate::config::{RemoteConfig, RemoteType};

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, delete 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 文件信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// 相对存储根目录的路径，统一使用 `/` 分隔
    pub path: String,
    pub size: u64,
    /// 修改时间（Unix 毫秒）
    pub modified_time: Option<i64>,
    pub is_dir: bool,
}

/// 文件元数据（用于快速检查）
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub size: u64,
    /// 修改时间（Unix 毫秒），存储无法提供时为 None
    pub modified_time: Option<i64>,
    pub is_dir: bool,
}

/// 存储抽象接口
#[async_trait]
pub trait Storage: Send + Sync {
    /// 递归列出所有文件
    async fn list_files(&self, prefix: Option<&str>) -> Result<Vec<FileInfo>>;

    /// 获取文件元数据
    async fn stat(&self, path: &str) -> Result<Option<FileMeta>>;

    /// 读取整个文件
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// 写入整个文件（覆盖已有内容）
    async fn write(&self, path: &str, data: Bytes) -> Result<()>;

    /// 删除文件或目录
    async fn delete(&self, path: &str) -> Result<()>;

    /// 检查文件是否存在
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.stat(path).await?.is_some())
    }

    /// 创建目录（包括中间目录）
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// 设置修改时间，不支持的存储直接忽略
    async fn set_modified(&self, _path: &str, _modified_ms: i64) -> Result<()> {
        Ok(())
    }

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 跨存储复制单个文件，尽量保留修改时间，返回复制的字节数
pub async fn copy_between<A, B>(from: &A, from_path: &str, to: &B, to_path: &str) -> Result<u64>
where
    A: Storage + ?Sized,
    B: Storage + ?Sized,
{
    let meta = from.stat(from_path).await?;
    let data = from.read(from_path).await?;
    let len = data.len() as u64;

    tracing::debug!(
        "复制: {}:{} -> {}:{} ({}字节)",
        from.name(),
        from_path,
        to.name(),
        to_path,
        len
    );
    to.write(to_path, data).await?;

    if let Some(modified) = meta.and_then(|m| m.modified_time) {
        if let Err(e) = to.set_modified(to_path, modified).await {
            tracing::warn!("保留修改时间失败 {}: {}", to_path, e);
        }
    }

    Ok(len)
}

/// 根据配置创建远程存储实例
pub async fn create_remote(config: &RemoteConfig) -> Result<Arc<dyn RemoteStore>> {
    match config.typ {
        RemoteType::Fs => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Fs remote requires path"))?;
            tracing::info!("初始化云盘目录: {}", path);
            Ok(Arc::new(CloudStorage::fs(path)?) as Arc<dyn RemoteStore>)
        }
        RemoteType::S3 => {
            let bucket = config
                .bucket
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("S3 remote requires bucket"))?;
            let region = config
                .region
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("S3 remote requires region"))?;
            let access_key = config
                .access_key
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("S3 remote requires accessKey"))?;
            let secret_key = config
                .secret_key
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("S3 remote requires secretKey"))?;
            tracing::info!("初始化S3存储: bucket={}, region={}", bucket, region);
            Ok(Arc::new(CloudStorage::s3(
                bucket,
                region,
                access_key,
                secret_key,
                config.endpoint.clone(),
                config.prefix.clone(),
            )?) as Arc<dyn RemoteStore>)
        }
        RemoteType::WebDav => {
            let endpoint = config
                .webdav_endpoint
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("WebDAV remote requires endpoint"))?;
            let username = config
                .username
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("WebDAV remote requires username"))?;
            let password = config
                .password
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("WebDAV remote requires password"))?;
            tracing::info!("创建WebDAV存储: endpoint={}, root={:?}", endpoint, config.root);
            Ok(Arc::new(CloudStorage::webdav(
                endpoint,
                username,
                password,
                config.root.clone(),
            )?) as Arc<dyn RemoteStore>)
        }
    }
}

/// 当前时间（Unix 毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
