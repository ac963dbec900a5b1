//! 文件名到本地/远程路径的解析

use crate::error::SyncError;
use crate::storage::RemoteStore;
use std::sync::Arc;

/// 一次同步操作的两个端点，每次调用重新计算
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub file_name: String,
    /// 相对本地文档目录
    pub local_path: String,
    /// 相对远程容器根目录
    pub remote_path: String,
}

/// 路径解析器
pub struct PathResolver {
    remote: Arc<dyn RemoteStore>,
    base_dir: String,
}

impl PathResolver {
    pub fn new(remote: Arc<dyn RemoteStore>, base_dir: impl Into<String>) -> Self {
        let base_dir = base_dir.into().trim_matches('/').to_string();
        Self { remote, base_dir }
    }

    /// 远程基础目录（相对容器根目录）
    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    /// 校验文件名：只允许单个路径段
    pub fn validate(file_name: &str) -> Result<(), SyncError> {
        let invalid = file_name.is_empty()
            || file_name == "."
            || file_name == ".."
            || file_name.contains(['/', '\\', '\0']);
        if invalid {
            return Err(SyncError::InvalidPath(file_name.to_string()));
        }
        Ok(())
    }

    /// 计算同步端点，不访问存储
    pub fn target(&self, file_name: &str) -> Result<SyncTarget, SyncError> {
        Self::validate(file_name)?;

        let remote_path = if self.base_dir.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", self.base_dir, file_name)
        };

        Ok(SyncTarget {
            file_name: file_name.to_string(),
            local_path: file_name.to_string(),
            remote_path,
        })
    }

    /// 确保远程基础目录存在（包括中间目录）
    pub async fn ensure_base_dir(&self) -> Result<(), SyncError> {
        if self.base_dir.is_empty() {
            return Ok(());
        }

        match self.remote.stat(&self.base_dir).await {
            Ok(Some(meta)) if meta.is_dir => return Ok(()),
            Ok(Some(_)) => {
                return Err(SyncError::DirectoryCreationFailed(format!(
                    "{} 已存在且不是目录",
                    self.base_dir
                )))
            }
            _ => {}
        }

        tracing::debug!("创建远程基础目录: {}", self.base_dir);
        self.remote
            .create_dir(&self.base_dir)
            .await
            .map_err(|e| SyncError::DirectoryCreationFailed(format!("{}: {}", self.base_dir, e)))
    }

    /// 校验文件名并确保远程目录存在
    pub async fn resolve(&self, file_name: &str) -> Result<SyncTarget, SyncError> {
        let target = self.target(file_name)?;
        self.ensure_base_dir().await?;
        Ok(target)
    }
}
