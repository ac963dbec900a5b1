//! 单文件上传/下载
//!
//! 上传：可用性检查 → 本地文件检查 → 冲突判断（强制上传跳过）→ 删除远程旧文件 →
//! 复制 → 触发物化 → 校验。
//! 下载：可用性检查 → 远程文件检查 → 触发下载 → 有限轮询 → 与本地版本协调。

use crate::config::DownloadSettings;
use crate::core::conflict::{compare_modified, ConflictResolver, Freshness};
use crate::core::events::{EventBus, SyncEvent};
use crate::core::paths::{PathResolver, SyncTarget};
use crate::core::probe::AvailabilityProbe;
use crate::core::retry::{with_retry, RetryPolicy};
use crate::error::SyncError;
use crate::storage::{copy_between, DownloadingStatus, RemoteStore, Storage};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 传输阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferPhase {
    Pending,
    Probing,
    Transferring,
    Polling,
    Reconciling,
    Done,
    Failed,
}

/// 传输方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Upload,
    Download,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Upload => write!(f, "上传"),
            Direction::Download => write!(f, "下载"),
        }
    }
}

/// 上传模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// 先比较修改时间，远程更新时记录警告后仍然覆盖
    Checked,
    /// 跳过冲突判断直接覆盖
    Forced,
}

/// 下载等待策略
#[derive(Debug, Clone, Copy)]
pub struct DownloadPolicy {
    pub deadline: Duration,
    pub max_error_retries: u32,
    pub poll_interval: Duration,
    pub error_interval: Duration,
}

impl Default for DownloadPolicy {
    fn default() -> Self {
        Self::from(&DownloadSettings::default())
    }
}

impl From<&DownloadSettings> for DownloadPolicy {
    fn from(settings: &DownloadSettings) -> Self {
        Self {
            deadline: settings.deadline(),
            max_error_retries: settings.max_error_retries.max(1),
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            error_interval: Duration::from_secs(settings.error_interval_secs),
        }
    }
}

/// 等待远程物化的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Completed,
    DeadlineReached,
    RetriesExhausted,
    Cancelled,
}

/// 一次传输操作的结果
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub attempts: u32,
    /// 成功但需要提醒用户的情况（例如覆盖了更新的远程版本）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl TransferOutcome {
    pub fn succeeded(attempts: u32, warning: Option<String>) -> Self {
        Self {
            success: true,
            error: None,
            error_code: None,
            attempts,
            warning,
        }
    }

    pub fn failed(err: &SyncError, attempts: u32) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            error_code: Some(err.code().to_string()),
            attempts,
            warning: None,
        }
    }
}

/// 单次尝试成功的结果
struct AttemptReport {
    bytes: u64,
    warning: Option<String>,
}

/// 传输引擎
pub struct TransferEngine {
    local: Arc<dyn Storage>,
    remote: Arc<dyn RemoteStore>,
    paths: Arc<PathResolver>,
    probe: Arc<AvailabilityProbe>,
    conflicts: ConflictResolver,
    events: EventBus,
    cancel: CancellationToken,
    retry: RetryPolicy,
    download: DownloadPolicy,
    app_id: String,
}

impl TransferEngine {
    pub fn new(
        local: Arc<dyn Storage>,
        remote: Arc<dyn RemoteStore>,
        paths: Arc<PathResolver>,
        probe: Arc<AvailabilityProbe>,
        events: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            conflicts: ConflictResolver::new(local.clone(), remote.clone()),
            local,
            remote,
            paths,
            probe,
            events,
            cancel,
            retry: RetryPolicy::default(),
            download: DownloadPolicy::default(),
            app_id: String::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_download_policy(mut self, download: DownloadPolicy) -> Self {
        self.download = download;
        self
    }

    /// 应用标识，用于权限错误的原因说明
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    pub fn conflicts(&self) -> &ConflictResolver {
        &self.conflicts
    }

    fn translate(&self, err: anyhow::Error) -> SyncError {
        SyncError::from_storage(&err, &self.app_id)
    }

    fn phase(&self, target: &SyncTarget, direction: Direction, phase: TransferPhase) {
        debug!("{} {}: {:?}", direction, target.file_name, phase);
        self.events.publish(SyncEvent::Phase {
            file_name: target.file_name.clone(),
            direction,
            phase,
        });
    }

    /// 上传本地文件到远程，失败时按策略重试
    pub async fn upload(&self, file_name: &str, mode: UploadMode) -> TransferOutcome {
        self.run(file_name, Direction::Upload, move |target| async move {
            self.upload_once(&target, mode).await
        })
        .await
    }

    /// 从远程下载文件到本地，失败时按策略重试
    pub async fn download(&self, file_name: &str) -> TransferOutcome {
        self.run(file_name, Direction::Download, move |target| async move {
            self.download_once(&target).await
        })
        .await
    }

    async fn run<'a, F, Fut>(
        &'a self,
        file_name: &str,
        direction: Direction,
        attempt_fn: F,
    ) -> TransferOutcome
    where
        F: Fn(SyncTarget) -> Fut,
        Fut: std::future::Future<Output = Result<AttemptReport, SyncError>> + 'a,
    {
        let target = match self.paths.target(file_name) {
            Ok(target) => target,
            Err(e) => {
                warn!("{}失败: {}", direction, e);
                self.fail_event(file_name, direction, &e);
                return TransferOutcome::failed(&e, 0);
            }
        };

        info!("开始{}: {} ({})", direction, target.file_name, target.remote_path);
        self.phase(&target, direction, TransferPhase::Pending);

        let label = format!("{} {}", direction, target.file_name);
        let mut attempts = 0;
        let result = with_retry(self.retry, &label, &self.cancel, |attempt| {
            attempts = attempt;
            attempt_fn(target.clone())
        })
        .await;

        match result {
            Ok(retried) => {
                info!(
                    "{}完成: {} ({}字节, 第{}次尝试)",
                    direction, target.file_name, retried.value.bytes, retried.attempts
                );
                self.phase(&target, direction, TransferPhase::Done);
                self.events.publish(SyncEvent::Completed {
                    file_name: target.file_name.clone(),
                    direction,
                    attempts: retried.attempts,
                });
                TransferOutcome::succeeded(retried.attempts, retried.value.warning)
            }
            Err(e) => {
                error!("{}失败: {}: {}", direction, target.file_name, e);
                self.phase(&target, direction, TransferPhase::Failed);
                self.fail_event(&target.file_name, direction, &e);
                let attempts = match &e {
                    SyncError::RetriesExhausted { attempts, .. } => *attempts,
                    _ => attempts,
                };
                TransferOutcome::failed(&e, attempts)
            }
        }
    }

    fn fail_event(&self, file_name: &str, direction: Direction, err: &SyncError) {
        self.events.publish(SyncEvent::Failed {
            file_name: file_name.to_string(),
            direction,
            code: err.code().to_string(),
            message: err.to_string(),
        });
    }

    async fn require_available(
        &self,
        target: &SyncTarget,
        direction: Direction,
    ) -> Result<(), SyncError> {
        self.phase(target, direction, TransferPhase::Probing);
        if self.probe.is_available().await {
            Ok(())
        } else {
            Err(SyncError::Unavailable)
        }
    }

    async fn upload_once(
        &self,
        target: &SyncTarget,
        mode: UploadMode,
    ) -> Result<AttemptReport, SyncError> {
        self.require_available(target, Direction::Upload).await?;
        self.paths.ensure_base_dir().await?;

        let local_exists = self
            .local
            .exists(&target.local_path)
            .await
            .map_err(|e| self.translate(e))?;
        if !local_exists {
            return Err(SyncError::LocalFileMissing(target.file_name.clone()));
        }

        self.phase(target, Direction::Upload, TransferPhase::Transferring);

        let remote_exists = self
            .remote
            .exists(&target.remote_path)
            .await
            .map_err(|e| self.translate(e))?;

        let mut warning = None;
        if remote_exists {
            if mode == UploadMode::Checked {
                warning = self.check_overwrite(target).await?;
            }
            self.remote
                .delete(&target.remote_path)
                .await
                .map_err(|e| self.translate(e))?;
        }

        let bytes = copy_between(
            self.local.as_ref(),
            &target.local_path,
            self.remote.as_ref(),
            &target.remote_path,
        )
        .await
        .map_err(|e| self.translate(e))?;

        if let Err(e) = self.remote.start_downloading(&target.remote_path).await {
            warn!("触发远程物化失败 {}: {}", target.remote_path, e);
        }

        self.verify_remote(target, bytes).await?;

        self.events.publish(SyncEvent::RemoteChanged {
            path: target.remote_path.clone(),
        });

        Ok(AttemptReport { bytes, warning })
    }

    /// 远程版本不比本地旧时记录警告，仍然继续上传
    ///
    /// 只有远程版本严格更新（确实覆盖了别处的修改）时才返回警告并发布事件。
    async fn check_overwrite(&self, target: &SyncTarget) -> Result<Option<String>, SyncError> {
        let (local_modified, remote_modified) = self
            .conflicts
            .modified_times(target)
            .await
            .map_err(|e| self.translate(e))?;

        match compare_modified(local_modified, remote_modified) {
            Freshness::LocalNewer => Ok(None),
            Freshness::Same => {
                warn!("远程版本与本地相同，仍然上传: {}", target.file_name);
                Ok(None)
            }
            Freshness::RemoteNewer => {
                let message = format!(
                    "远程版本比本地新，已用本地版本覆盖: {} (本地 {:?}, 远程 {:?})",
                    target.file_name, local_modified, remote_modified
                );
                warn!("{}", message);
                self.events.publish(SyncEvent::ConflictOverridden {
                    file_name: target.file_name.clone(),
                    local_modified,
                    remote_modified,
                });
                Ok(Some(message))
            }
        }
    }

    async fn verify_remote(&self, target: &SyncTarget, expected: u64) -> Result<(), SyncError> {
        let meta = self
            .remote
            .stat(&target.remote_path)
            .await
            .map_err(|e| self.translate(e))?
            .ok_or_else(|| {
                SyncError::CopyVerificationFailed(format!("复制后远程文件不存在: {}", target.remote_path))
            })?;

        if meta.size != expected {
            return Err(SyncError::CopyVerificationFailed(format!(
                "{}: 期望 {} 字节，实际 {} 字节",
                target.remote_path, expected, meta.size
            )));
        }

        // 上传在后台进行，只记录错误不等待
        match self.remote.item_status(&target.remote_path).await {
            Ok(item) => {
                if let Some(e) = item.uploading_error {
                    warn!("远程上传报告错误 {}: {}", target.remote_path, e);
                } else if !item.is_uploaded {
                    debug!("远程文件尚未上传完成: {}", target.remote_path);
                }
            }
            Err(e) => debug!("读取上传状态失败 {}: {}", target.remote_path, e),
        }

        Ok(())
    }

    async fn download_once(&self, target: &SyncTarget) -> Result<AttemptReport, SyncError> {
        self.require_available(target, Direction::Download).await?;
        self.paths.ensure_base_dir().await?;

        let remote_exists = self
            .remote
            .exists(&target.remote_path)
            .await
            .map_err(|e| self.translate(e))?;
        if !remote_exists {
            return Err(SyncError::RemoteFileMissing(target.file_name.clone()));
        }

        if let Err(e) = self.remote.start_downloading(&target.remote_path).await {
            warn!("触发远程下载失败 {}: {}", target.remote_path, e);
        }

        self.phase(target, Direction::Download, TransferPhase::Polling);
        match self.wait_for_download(&target.remote_path).await {
            WaitResult::Completed => {}
            WaitResult::Cancelled => return Err(SyncError::Cancelled),
            other => warn!("远程文件未就绪 ({:?})，尝试直接读取: {}", other, target.remote_path),
        }

        self.phase(target, Direction::Download, TransferPhase::Reconciling);
        let bytes = self.reconcile_local(target).await?;

        let local_exists = self
            .local
            .exists(&target.local_path)
            .await
            .map_err(|e| self.translate(e))?;
        if !local_exists {
            return Err(SyncError::CopyVerificationFailed(format!(
                "下载后本地文件不存在: {}",
                target.local_path
            )));
        }

        Ok(AttemptReport { bytes, warning: None })
    }

    /// 本地缺失时复制；本地存在时只在远程更新时覆盖
    async fn reconcile_local(&self, target: &SyncTarget) -> Result<u64, SyncError> {
        let local_exists = self
            .local
            .exists(&target.local_path)
            .await
            .map_err(|e| self.translate(e))?;

        if local_exists {
            let replace = self
                .conflicts
                .should_replace_local(target)
                .await
                .map_err(|e| self.translate(e))?;
            if !replace {
                info!("本地版本较新或相同，保留本地文件: {}", target.file_name);
                return Ok(0);
            }
        }

        // 本地写入是原子替换，失败时旧文件保持不变
        copy_between(
            self.remote.as_ref(),
            &target.remote_path,
            self.local.as_ref(),
            &target.local_path,
        )
        .await
        .map_err(|e| self.translate(e))
    }

    /// 轮询远程物化状态，受绝对时限和错误次数双重约束
    pub async fn wait_for_download(&self, path: &str) -> WaitResult {
        let policy = self.download;
        let deadline = Instant::now() + policy.deadline;
        let mut errors = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return WaitResult::Cancelled;
            }
            if Instant::now() >= deadline {
                warn!("等待下载超时 ({}秒): {}", policy.deadline.as_secs(), path);
                return WaitResult::DeadlineReached;
            }

            let delay = match self.remote.item_status(path).await {
                Err(e) => {
                    debug!("读取下载状态失败 {}: {}", path, e);
                    policy.error_interval
                }
                Ok(item) => {
                    if let Some(e) = item.downloading_error {
                        errors += 1;
                        warn!(
                            "下载错误 ({}/{}) {}: {}",
                            errors, policy.max_error_retries, path, e
                        );
                        if errors >= policy.max_error_retries {
                            return WaitResult::RetriesExhausted;
                        }
                        if let Err(e) = self.remote.start_downloading(path).await {
                            debug!("重新触发下载失败 {}: {}", path, e);
                        }
                        policy.poll_interval
                    } else {
                        match item.downloading {
                            Some(DownloadingStatus::Current)
                            | Some(DownloadingStatus::Downloaded) => {
                                debug!("远程文件已就绪: {}", path);
                                return WaitResult::Completed;
                            }
                            Some(DownloadingStatus::NotDownloaded) => policy.poll_interval,
                            _ => policy.error_interval,
                        }
                    }
                }
            };

            let wake = (Instant::now() + delay).min(deadline);
            tokio::select! {
                _ = self.cancel.cancelled() => return WaitResult::Cancelled,
                _ = sleep_until(wake) => {}
            }
        }
    }
}
