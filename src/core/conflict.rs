use crate::core::paths::SyncTarget;
use crate::error::SyncError;
use crate::storage::{copy_between, RemoteStore, Storage};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// 冲突解决选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictChoice {
    /// 以本地版本为准
    UseLocal,
    /// 以远程版本为准
    UseRemote,
}

impl std::fmt::Display for ConflictChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictChoice::UseLocal => write!(f, "useLocal"),
            ConflictChoice::UseRemote => write!(f, "useRemote"),
        }
    }
}

impl std::str::FromStr for ConflictChoice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "useLocal" => Ok(ConflictChoice::UseLocal),
            "useRemote" => Ok(ConflictChoice::UseRemote),
            _ => Err(format!("无效的冲突解决方式: {}", s)),
        }
    }
}

/// 两端修改时间比较结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    LocalNewer,
    RemoteNewer,
    Same,
}

/// 比较修改时间，缺失的时间视为最早
pub fn compare_modified(local: Option<i64>, remote: Option<i64>) -> Freshness {
    let local = local.unwrap_or(i64::MIN);
    let remote = remote.unwrap_or(i64::MIN);
    match local.cmp(&remote) {
        Ordering::Greater => Freshness::LocalNewer,
        Ordering::Less => Freshness::RemoteNewer,
        Ordering::Equal => Freshness::Same,
    }
}

/// 冲突解决器：最后写入者胜出，或由用户指定
pub struct ConflictResolver {
    local: Arc<dyn Storage>,
    remote: Arc<dyn RemoteStore>,
}

impl ConflictResolver {
    pub fn new(local: Arc<dyn Storage>, remote: Arc<dyn RemoteStore>) -> Self {
        Self { local, remote }
    }

    /// 读取两端的修改时间
    pub async fn modified_times(&self, target: &SyncTarget) -> Result<(Option<i64>, Option<i64>)> {
        let local = self.local.stat(&target.local_path).await?;
        let remote = self.remote.stat(&target.remote_path).await?;
        Ok((
            local.and_then(|m| m.modified_time),
            remote.and_then(|m| m.modified_time),
        ))
    }

    /// 本地比远程更新时返回 true
    pub async fn should_replace_remote(&self, target: &SyncTarget) -> Result<bool> {
        let (local, remote) = self.modified_times(target).await?;
        Ok(compare_modified(local, remote) == Freshness::LocalNewer)
    }

    /// 远程比本地更新时返回 true
    pub async fn should_replace_local(&self, target: &SyncTarget) -> Result<bool> {
        let (local, remote) = self.modified_times(target).await?;
        Ok(compare_modified(local, remote) == Freshness::RemoteNewer)
    }

    /// 用选中的版本覆盖另一端，返回复制的字节数
    ///
    /// 胜出方在失败方被改动之前完整读取，任何情况下都不会同时删除两端。
    pub async fn apply_resolution(
        &self,
        target: &SyncTarget,
        choice: ConflictChoice,
    ) -> Result<u64> {
        tracing::info!("解决冲突: {} -> {}", target.file_name, choice);

        let bytes = match choice {
            ConflictChoice::UseLocal => {
                if !self.local.exists(&target.local_path).await? {
                    return Err(SyncError::LocalFileMissing(target.file_name.clone()).into());
                }
                copy_between(
                    self.local.as_ref(),
                    &target.local_path,
                    self.remote.as_ref(),
                    &target.remote_path,
                )
                .await?
            }
            ConflictChoice::UseRemote => {
                if !self.remote.exists(&target.remote_path).await? {
                    return Err(SyncError::RemoteFileMissing(target.file_name.clone()).into());
                }
                copy_between(
                    self.remote.as_ref(),
                    &target.remote_path,
                    self.local.as_ref(),
                    &target.local_path,
                )
                .await?
            }
        };

        // 重新触发远程物化
        if let Err(e) = self.remote.start_downloading(&target.remote_path).await {
            tracing::warn!("重新触发远程下载失败 {}: {}", target.remote_path, e);
        }

        Ok(bytes)
    }
}
