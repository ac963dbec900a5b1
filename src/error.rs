//! 同步错误分类
//!
//! 存储层统一使用 `anyhow::Result`，在传输引擎边界通过 [`SyncError::from_storage`]
//! 翻译为带有具体原因说明的错误类型。

use serde::Serialize;
use std::io;
use thiserror::Error;

/// 示例应用标识前缀，这类标识不会配置云存储权限
pub const PLACEHOLDER_APP_PREFIX: &str = "com.example.";

#[cfg(unix)]
const ENOSPC: i32 = 28;
#[cfg(target_os = "linux")]
const EDQUOT: i32 = 122;
#[cfg(all(unix, not(target_os = "linux")))]
const EDQUOT: i32 = 69;

/// 权限被拒绝的根本原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionCause {
    /// 使用示例/占位应用标识，没有云存储权限
    PlaceholderIdentity,
    /// 应用标识有效，但未被授权访问云存储
    NotAuthorized,
    /// 未配置应用标识
    MissingAppId,
}

impl PermissionCause {
    /// 根据应用标识判断权限问题的原因
    pub fn for_app_id(app_id: &str) -> Self {
        let app_id = app_id.trim();
        if app_id.is_empty() {
            PermissionCause::MissingAppId
        } else if app_id.starts_with(PLACEHOLDER_APP_PREFIX) {
            PermissionCause::PlaceholderIdentity
        } else {
            PermissionCause::NotAuthorized
        }
    }
}

fn permission_message(cause: &PermissionCause, app_id: &str) -> String {
    match cause {
        PermissionCause::PlaceholderIdentity => format!(
            "权限被拒绝：应用使用的是示例标识 ({})，该标识没有配置云存储权限。请改用已开通云存储能力的正式应用标识",
            app_id
        ),
        PermissionCause::NotAuthorized => format!(
            "权限被拒绝：应用标识 ({}) 有效，但应用未被授权访问云存储。请检查：1) 账户设置中已为该应用开启云存储；2) 开发者后台中该标识已启用云存储能力；3) 描述文件包含云存储权限",
            app_id
        ),
        PermissionCause::MissingAppId => {
            "权限被拒绝：未配置应用标识，应用配置存在严重问题".to_string()
        }
    }
}

/// 同步错误
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("远程存储不可用")]
    Unavailable,

    #[error("{}", permission_message(.cause, .app_id))]
    PermissionDenied {
        cause: PermissionCause,
        app_id: String,
    },

    #[error("远程存储中找不到文件，可能尚未上传或已被删除")]
    FileNotFound,

    #[error("远程存储空间已满，请清理空间后重试")]
    QuotaExceeded,

    #[error("文件暂时无法从远程存储获取，请检查网络后重试")]
    FileUnavailable,

    #[error("网络不可用，同步需要网络连接")]
    NetworkUnavailable,

    #[error("连接超时，请检查网络后重试")]
    Timeout,

    #[error("无效的文件名: '{0}'")]
    InvalidPath(String),

    #[error("创建远程目录失败: {0}")]
    DirectoryCreationFailed(String),

    #[error("复制后校验失败: {0}")]
    CopyVerificationFailed(String),

    #[error("本地文件不存在: {0}")]
    LocalFileMissing(String),

    #[error("远程存储中不存在文件: {0}")]
    RemoteFileMissing(String),

    #[error("{attempts} 次尝试后仍然失败: {last}")]
    RetriesExhausted { attempts: u32, last: Box<SyncError> },

    #[error("操作已取消")]
    Cancelled,

    #[error("同步错误: {0}")]
    Unknown(String),
}

impl SyncError {
    /// 权限错误（原因由应用标识推断）
    pub fn permission_denied(app_id: &str) -> Self {
        SyncError::PermissionDenied {
            cause: PermissionCause::for_app_id(app_id),
            app_id: app_id.to_string(),
        }
    }

    /// 错误代码，重试包装会透传最后一次失败的代码
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Unavailable => "UNAVAILABLE",
            SyncError::PermissionDenied { .. } => "PERMISSION_DENIED",
            SyncError::FileNotFound => "FILE_NOT_FOUND",
            SyncError::QuotaExceeded => "QUOTA_EXCEEDED",
            SyncError::FileUnavailable => "FILE_UNAVAILABLE",
            SyncError::NetworkUnavailable => "NETWORK_UNAVAILABLE",
            SyncError::Timeout => "TIMEOUT",
            SyncError::InvalidPath(_) => "INVALID_PATH",
            SyncError::DirectoryCreationFailed(_) => "DIRECTORY_CREATION_FAILED",
            SyncError::CopyVerificationFailed(_) => "COPY_VERIFICATION_FAILED",
            SyncError::LocalFileMissing(_) => "LOCAL_FILE_MISSING",
            SyncError::RemoteFileMissing(_) => "REMOTE_FILE_MISSING",
            SyncError::RetriesExhausted { last, .. } => last.code(),
            SyncError::Cancelled => "CANCELLED",
            SyncError::Unknown(_) => "UNKNOWN",
        }
    }

    /// 是否值得重试（无效文件名和取消不会因为重试而改变）
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::InvalidPath(_) | SyncError::Cancelled)
    }

    /// 存储层错误是否表示文件不存在
    pub fn is_not_found(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            cause
                .downcast_ref::<opendal::Error>()
                .is_some_and(|e| e.kind() == opendal::ErrorKind::NotFound)
                || cause
                    .downcast_ref::<io::Error>()
                    .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
                || matches!(cause.downcast_ref::<SyncError>(), Some(SyncError::FileNotFound))
        })
    }

    /// 将存储层错误翻译为同步错误
    ///
    /// 依次检查错误链：已分类的 `SyncError` 原样返回，OpenDAL 和 IO 错误按类型映射，
    /// 其余归为 `Unknown`。
    pub fn from_storage(err: &anyhow::Error, app_id: &str) -> Self {
        for cause in err.chain() {
            if let Some(e) = cause.downcast_ref::<SyncError>() {
                return e.clone();
            }
            if let Some(e) = cause.downcast_ref::<opendal::Error>() {
                if let Some(mapped) = Self::from_opendal(e, app_id) {
                    return mapped;
                }
            }
            if let Some(e) = cause.downcast_ref::<io::Error>() {
                if let Some(mapped) = Self::from_io(e, app_id) {
                    return mapped;
                }
            }
        }
        tracing::debug!("未分类的存储错误: {:?}", err);
        SyncError::Unknown(err.to_string())
    }

    fn from_opendal(err: &opendal::Error, app_id: &str) -> Option<Self> {
        use opendal::ErrorKind;

        match err.kind() {
            ErrorKind::PermissionDenied => Some(Self::permission_denied(app_id)),
            ErrorKind::NotFound => Some(SyncError::FileNotFound),
            ErrorKind::RateLimited => Some(SyncError::NetworkUnavailable),
            ErrorKind::ConfigInvalid => Some(SyncError::Unavailable),
            _ if err.is_temporary() => Some(SyncError::NetworkUnavailable),
            _ => None,
        }
    }

    fn from_io(err: &io::Error, app_id: &str) -> Option<Self> {
        use io::ErrorKind;

        #[cfg(unix)]
        if matches!(err.raw_os_error(), Some(code) if code == ENOSPC || code == EDQUOT) {
            return Some(SyncError::QuotaExceeded);
        }

        match err.kind() {
            ErrorKind::PermissionDenied => Some(Self::permission_denied(app_id)),
            ErrorKind::NotFound => Some(SyncError::FileNotFound),
            ErrorKind::TimedOut => Some(SyncError::Timeout),
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::AddrNotAvailable
            | ErrorKind::BrokenPipe => Some(SyncError::NetworkUnavailable),
            ErrorKind::WouldBlock => Some(SyncError::FileUnavailable),
            _ => None,
        }
    }
}
