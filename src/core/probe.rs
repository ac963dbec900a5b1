//! 远程存储可用性探测与诊断

use crate::core::usage::PROBE_DIR_PREFIX;
use crate::storage::{ContainerAccess, RemoteStore};
use chrono::{DateTime, Utc};
use scopeguard::ScopeGuard;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 账户状态（只看是否存在登录身份）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountStatus {
    Available,
    NotAvailable,
}

/// 诊断报告，所有内部失败都记录为字段
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub app_id: String,
    /// 期望使用的远程容器
    pub expected_container: String,
    pub identity_present: bool,
    pub identity: Option<String>,
    pub remote_name: String,
    pub container_reachable: bool,
    pub container_readable: bool,
    pub container_writable: bool,
    pub can_create_app_directory: bool,
    pub directory_creation_error: Option<String>,
    pub container_access_error: Option<String>,
    pub base_directory: String,
    pub local_directory: String,
    pub checked_at: DateTime<Utc>,
}

/// 可用性探测器
pub struct AvailabilityProbe {
    remote: Arc<dyn RemoteStore>,
    base_dir: String,
    app_id: String,
    local_dir: PathBuf,
}

impl AvailabilityProbe {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        base_dir: impl Into<String>,
        app_id: impl Into<String>,
        local_dir: PathBuf,
    ) -> Self {
        Self {
            remote,
            base_dir: base_dir.into(),
            app_id: app_id.into(),
            local_dir,
        }
    }

    pub fn account_status(&self) -> AccountStatus {
        if self.remote.identity().is_some() {
            AccountStatus::Available
        } else {
            AccountStatus::NotAvailable
        }
    }

    fn probe_dir(&self) -> String {
        let name = format!("{}{}", PROBE_DIR_PREFIX, uuid::Uuid::new_v4().simple());
        if self.base_dir.is_empty() {
            format!("{}/", name)
        } else {
            format!("{}/{}/", self.base_dir, name)
        }
    }

    /// 在基础目录下创建并删除一个临时目录
    async fn try_create_probe_dir(&self) -> Result<(), String> {
        let dir = self.probe_dir();
        self.remote
            .create_dir(&dir)
            .await
            .map_err(|e| format!("{}: {}", dir, e))?;

        // 提前返回或任务被取消时也要清理
        let remote = self.remote.clone();
        let cleanup = scopeguard::guard(dir, move |dir| {
            tokio::spawn(async move {
                if let Err(e) = remote.delete(&dir).await {
                    warn!("清理探测目录失败 {}: {}", dir, e);
                }
            });
        });

        let verified = self.remote.exists(cleanup.as_str()).await;

        let dir = ScopeGuard::into_inner(cleanup);
        if let Err(e) = self.remote.delete(&dir).await {
            warn!("清理探测目录失败 {}: {}", dir, e);
        }

        match verified {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!("{}: 创建后不存在", dir)),
            Err(e) => Err(format!("{}: {}", dir, e)),
        }
    }

    fn access_usable(access: &ContainerAccess) -> bool {
        access.reachable && access.readable && access.writable
    }

    /// 登录身份、容器读写权限和目录创建全部通过才算可用
    pub async fn is_available(&self) -> bool {
        if self.remote.identity().is_none() {
            info!("远程存储不可用: 未登录或未挂载");
            return false;
        }

        match self.remote.container_access().await {
            Ok(access) if Self::access_usable(&access) => {}
            Ok(access) => {
                info!("远程存储不可用: 容器权限不足 {:?}", access);
                return false;
            }
            Err(e) => {
                warn!("检查远程容器失败: {}", e);
                return false;
            }
        }

        match self.try_create_probe_dir().await {
            Ok(()) => {
                debug!("远程存储可用: {}", self.remote.name());
                true
            }
            Err(e) => {
                warn!("远程存储不可用: 无法创建目录 {}", e);
                false
            }
        }
    }

    /// 生成诊断报告，不会失败
    pub async fn diagnostics(&self) -> DiagnosticReport {
        let identity = self.remote.identity();

        let (access, container_access_error) = match self.remote.container_access().await {
            Ok(access) => (access, None),
            Err(e) => (ContainerAccess::default(), Some(e.to_string())),
        };

        let (can_create_app_directory, directory_creation_error) = if identity.is_none() {
            (false, Some("未登录或未挂载远程存储".to_string()))
        } else if !access.writable {
            (false, Some("远程容器不可写".to_string()))
        } else {
            match self.try_create_probe_dir().await {
                Ok(()) => (true, None),
                Err(e) => (false, Some(e)),
            }
        };

        DiagnosticReport {
            app_id: self.app_id.clone(),
            expected_container: self.remote.name().to_string(),
            identity_present: identity.is_some(),
            identity,
            remote_name: self.remote.name().to_string(),
            container_reachable: access.reachable,
            container_readable: access.readable,
            container_writable: access.writable,
            can_create_app_directory,
            directory_creation_error,
            container_access_error,
            base_directory: self.base_dir.clone(),
            local_directory: self.local_dir.display().to_string(),
            checked_at: Utc::now(),
        }
    }
}
