//! 命令层：按方法名分发调用，参数与返回值均为 JSON

pub mod diagnostics;
pub mod log;
pub mod sync;

use crate::core::{AccountStatus, StorageUsageReport, TransferOutcome};
use crate::storage::FileInfo;
use crate::AppState;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// 写操作结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub attempts: u32,
}

impl From<TransferOutcome> for OperationResult {
    fn from(outcome: TransferOutcome) -> Self {
        Self {
            success: outcome.success,
            error: outcome.error,
            error_code: outcome.error_code,
            warning: outcome.warning,
            attempts: outcome.attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesResult {
    pub success: bool,
    /// 相对基础目录的文件名
    pub files: Vec<String>,
    /// 每个文件的大小与修改时间，顺序与 `files` 一致
    pub entries: Vec<FileInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<StorageUsageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountStatusResult {
    pub status: AccountStatus,
}

/// 命令调用错误（参数错误、未知方法、任务异常）
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

impl CommandError {
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self {
            code: "INVALID_ARGUMENTS".to_string(),
            message: message.into(),
        }
    }

    pub fn not_implemented(method: &str) -> Self {
        Self {
            code: "NOT_IMPLEMENTED".to_string(),
            message: format!("未知方法: {}", method),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: "INTERNAL".to_string(),
            message: message.into(),
        }
    }
}

fn required_str(args: &Value, key: &str) -> Result<String, CommandError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CommandError::invalid_arguments(format!("缺少参数: {}", key)))
}

fn optional<T: DeserializeOwned>(args: &Value, key: &str) -> Result<Option<T>, CommandError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| CommandError::invalid_arguments(format!("参数 {} 无效: {}", key, e))),
    }
}

/// 命令结果转为 JSON，任务异常归为内部错误
fn to_json<T: Serialize>(result: Result<T, String>) -> Result<Value, CommandError> {
    let value = result.map_err(CommandError::internal)?;
    serde_json::to_value(value).map_err(|e| CommandError::internal(e.to_string()))
}

/// 按方法名分发调用
pub async fn dispatch(state: &AppState, method: &str, args: Value) -> Result<Value, CommandError> {
    tracing::debug!("调用方法: {} {}", method, args);

    let result = match method {
        "isAvailable" => to_json(sync::is_available(state).await),
        "accountStatus" => to_json(sync::account_status(state).await),
        "syncFile" => to_json(sync::sync_file(state, required_str(&args, "fileName")?).await),
        "downloadFile" => {
            to_json(sync::download_file(state, required_str(&args, "fileName")?).await)
        }
        "forceSyncFile" => {
            to_json(sync::force_sync_file(state, required_str(&args, "fileName")?).await)
        }
        "getFileStatus" => {
            to_json(sync::get_file_status(state, required_str(&args, "fileName")?).await)
        }
        "listFiles" => to_json(sync::list_files(state).await),
        "deleteFile" => to_json(sync::delete_file(state, required_str(&args, "fileName")?).await),
        "resolveConflict" => {
            let file_name = required_str(&args, "fileName")?;
            let resolution = required_str(&args, "resolution")?
                .parse()
                .map_err(CommandError::invalid_arguments)?;
            to_json(sync::resolve_conflict(state, file_name, resolution).await)
        }
        "getStorageUsage" => to_json(sync::get_storage_usage(state).await),
        "getDiagnostics" => to_json(diagnostics::get_diagnostics(state).await),
        "getLogConfig" => to_json(log::get_log_config(state).await),
        "setLogConfig" => {
            let result = log::set_log_config(
                state,
                optional(&args, "enabled")?,
                optional(&args, "maxSizeMb")?,
                optional(&args, "level")?,
            )
            .await;
            match result {
                Ok(config) => to_json(Ok(config)),
                Err(e) => return Err(CommandError::invalid_arguments(e)),
            }
        }
        _ => return Err(CommandError::not_implemented(method)),
    }?;

    Ok(result)
}
