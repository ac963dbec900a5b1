use crate::config::SyncSettings;
use crate::core::conflict::ConflictChoice;
use crate::core::events::{EventBus, SyncEvent};
use crate::core::flight::SingleFlight;
use crate::core::paths::PathResolver;
use crate::core::probe::{AccountStatus, AvailabilityProbe, DiagnosticReport};
use crate::core::retry::RetryPolicy;
use crate::core::status::{FileStatusReport, FileSyncStatus, StatusInspector};
use crate::core::transfer::{DownloadPolicy, TransferEngine, TransferOutcome, UploadMode};
use crate::core::usage::{is_probe_entry, summarize, StorageUsageReport};
use crate::core::watcher::RemoteWatcher;
use crate::error::SyncError;
use crate::storage::{create_remote, FileInfo, LocalStorage, RemoteStore, Storage};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 同步引擎：组合路径解析、探测、传输和冲突解决
pub struct SyncEngine {
    remote: Arc<dyn RemoteStore>,
    paths: Arc<PathResolver>,
    probe: Arc<AvailabilityProbe>,
    status: StatusInspector,
    transfer: TransferEngine,
    events: EventBus,
    cancel: CancellationToken,
    flight: SingleFlight,
    app_id: String,
}

impl SyncEngine {
    /// 使用给定的存储创建引擎
    pub fn new(
        local: Arc<dyn Storage>,
        local_dir: PathBuf,
        remote: Arc<dyn RemoteStore>,
        settings: &SyncSettings,
    ) -> Self {
        let events = EventBus::new();
        let cancel = CancellationToken::new();
        let paths = Arc::new(PathResolver::new(
            remote.clone(),
            settings.remote_subdir.clone(),
        ));
        let probe = Arc::new(AvailabilityProbe::new(
            remote.clone(),
            paths.base_dir(),
            settings.app_id.clone(),
            local_dir,
        ));
        let transfer = TransferEngine::new(
            local,
            remote.clone(),
            paths.clone(),
            probe.clone(),
            events.clone(),
            cancel.clone(),
        )
        .with_retry_policy(RetryPolicy::from(&settings.retry))
        .with_download_policy(DownloadPolicy::from(&settings.download))
        .with_app_id(settings.app_id.clone());

        Self {
            status: StatusInspector::new(remote.clone()),
            remote,
            paths,
            probe,
            transfer,
            events,
            cancel,
            flight: SingleFlight::new(),
            app_id: settings.app_id.clone(),
        }
    }

    /// 根据配置创建本地目录和远程存储
    pub async fn from_settings(settings: &SyncSettings) -> Result<Self> {
        let local_dir = settings.local_root();
        let local = Arc::new(LocalStorage::new(&local_dir)?);
        let remote = create_remote(&settings.remote).await?;

        info!(
            "同步引擎初始化: 本地={}, 远程={}, 子目录={}",
            local_dir.display(),
            remote.name(),
            settings.remote_subdir
        );
        Ok(Self::new(local, local_dir, remote, settings))
    }

    pub async fn is_available(&self) -> bool {
        self.probe.is_available().await
    }

    pub fn account_status(&self) -> AccountStatus {
        self.probe.account_status()
    }

    /// 上传本地文件，远程版本更新时记录警告后覆盖
    pub async fn sync_file(&self, file_name: &str) -> TransferOutcome {
        let _permit = self.flight.acquire(file_name).await;
        self.transfer.upload(file_name, UploadMode::Checked).await
    }

    /// 上传本地文件，不做冲突判断
    pub async fn force_sync_file(&self, file_name: &str) -> TransferOutcome {
        let _permit = self.flight.acquire(file_name).await;
        self.transfer.upload(file_name, UploadMode::Forced).await
    }

    pub async fn download_file(&self, file_name: &str) -> TransferOutcome {
        let _permit = self.flight.acquire(file_name).await;
        self.transfer.download(file_name).await
    }

    /// 查询单个文件的同步状态（只读一次，不轮询）
    pub async fn file_status(&self, file_name: &str) -> FileStatusReport {
        match self.paths.target(file_name) {
            Ok(target) => self.status.status(&target).await,
            Err(e) => FileStatusReport {
                file_name: file_name.to_string(),
                status: FileSyncStatus::Error(e.to_string()),
                is_downloaded: false,
                is_uploaded: false,
                has_conflicts: false,
                last_modified: None,
                size: None,
                message: Some(e.to_string()),
            },
        }
    }

    async fn require_available(&self) -> Result<(), SyncError> {
        if self.probe.is_available().await {
            Ok(())
        } else {
            Err(SyncError::Unavailable)
        }
    }

    async fn remote_entries(&self) -> Result<Vec<FileInfo>, SyncError> {
        self.remote
            .list_files(Some(self.paths.base_dir()))
            .await
            .map_err(|e| SyncError::from_storage(&e, &self.app_id))
    }

    /// 列出远程基础目录下的文件，路径相对基础目录
    pub async fn list_files(&self) -> Result<Vec<FileInfo>, SyncError> {
        self.require_available().await?;

        let base = self.paths.base_dir();
        let prefix = if base.is_empty() {
            String::new()
        } else {
            format!("{}/", base)
        };

        let mut files: Vec<FileInfo> = self
            .remote_entries()
            .await?
            .into_iter()
            .filter(|f| !f.is_dir && !is_probe_entry(&f.path))
            .map(|mut f| {
                if let Some(rel) = f.path.strip_prefix(&prefix) {
                    f.path = rel.to_string();
                }
                f
            })
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// 删除远程文件，本地副本保持不变；文件已不存在时直接成功
    pub async fn delete_file(&self, file_name: &str) -> TransferOutcome {
        let _permit = self.flight.acquire(file_name).await;

        let result = async {
            let target = self.paths.target(file_name)?;
            self.require_available().await?;

            let exists = self
                .remote
                .exists(&target.remote_path)
                .await
                .map_err(|e| SyncError::from_storage(&e, &self.app_id))?;
            if !exists {
                debug!("远程文件不存在，无需删除: {}", target.remote_path);
                return Ok(None);
            }

            self.remote
                .delete(&target.remote_path)
                .await
                .map_err(|e| SyncError::from_storage(&e, &self.app_id))?;
            Ok::<_, SyncError>(Some(target.remote_path))
        }
        .await;

        match result {
            Ok(Some(path)) => {
                info!("已删除远程文件: {}", path);
                self.events.publish(SyncEvent::RemoteChanged { path });
                TransferOutcome::succeeded(1, None)
            }
            Ok(None) => TransferOutcome::succeeded(1, None),
            Err(e) => {
                warn!("删除远程文件失败 {}: {}", file_name, e);
                TransferOutcome::failed(&e, 1)
            }
        }
    }

    /// 按用户选择解决冲突
    pub async fn resolve_conflict(
        &self,
        file_name: &str,
        choice: ConflictChoice,
    ) -> TransferOutcome {
        let _permit = self.flight.acquire(file_name).await;

        let result = async {
            PathResolver::validate(file_name)?;
            self.require_available().await?;
            let target = self.paths.resolve(file_name).await?;
            self.transfer
                .conflicts()
                .apply_resolution(&target, choice)
                .await
                .map_err(|e| SyncError::from_storage(&e, &self.app_id))?;
            Ok::<_, SyncError>(target.remote_path)
        }
        .await;

        match result {
            Ok(path) => {
                if choice == ConflictChoice::UseLocal {
                    self.events.publish(SyncEvent::RemoteChanged { path });
                }
                TransferOutcome::succeeded(1, None)
            }
            Err(e) => {
                warn!("解决冲突失败 {}: {}", file_name, e);
                TransferOutcome::failed(&e, 1)
            }
        }
    }

    /// 统计远程基础目录的用量
    pub async fn storage_usage(&self) -> Result<StorageUsageReport, SyncError> {
        self.require_available().await?;
        Ok(summarize(&self.remote_entries().await?))
    }

    pub async fn diagnostics(&self) -> DiagnosticReport {
        self.probe.diagnostics().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> impl Stream<Item = SyncEvent> + Send + 'static {
        self.events.stream()
    }

    /// 挂载型远程存储开始监听外部修改，其它存储返回 None
    pub fn watch_remote(&self) -> Result<Option<RemoteWatcher>> {
        match self.remote.local_root() {
            Some(root) => Ok(Some(RemoteWatcher::start(
                &root,
                self.paths.base_dir(),
                self.events.clone(),
            )?)),
            None => Ok(None),
        }
    }

    /// 取消进行中的等待（下载轮询、重试退避）
    pub fn shutdown(&self) {
        info!("停止同步引擎");
        self.cancel.cancel();
    }
}
