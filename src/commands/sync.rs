use super::{AccountStatusResult, ListFilesResult, OperationResult, UsageResult};
use crate::core::{ConflictChoice, FileStatusReport, SyncEngine};
use crate::AppState;
use std::future::Future;
use std::sync::Arc;

/// 在运行时上执行引擎操作，调用方等待其完成
async fn run_on_engine<T, F, Fut>(state: &AppState, op: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce(Arc<SyncEngine>) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let engine = state.engine.clone();
    tokio::spawn(op(engine))
        .await
        .map_err(|e| format!("任务执行失败: {}", e))
}

pub async fn is_available(state: &AppState) -> Result<bool, String> {
    run_on_engine(state, |engine| async move { engine.is_available().await }).await
}

pub async fn account_status(state: &AppState) -> Result<AccountStatusResult, String> {
    run_on_engine(state, |engine| async move {
        AccountStatusResult {
            status: engine.account_status(),
        }
    })
    .await
}

/// 上传本地文件
pub async fn sync_file(state: &AppState, file_name: String) -> Result<OperationResult, String> {
    run_on_engine(state, |engine| async move {
        OperationResult::from(engine.sync_file(&file_name).await)
    })
    .await
}

/// 下载远程文件
pub async fn download_file(state: &AppState, file_name: String) -> Result<OperationResult, String> {
    run_on_engine(state, |engine| async move {
        OperationResult::from(engine.download_file(&file_name).await)
    })
    .await
}

/// 强制上传（不做冲突判断）
pub async fn force_sync_file(
    state: &AppState,
    file_name: String,
) -> Result<OperationResult, String> {
    run_on_engine(state, |engine| async move {
        OperationResult::from(engine.force_sync_file(&file_name).await)
    })
    .await
}

pub async fn get_file_status(
    state: &AppState,
    file_name: String,
) -> Result<FileStatusReport, String> {
    run_on_engine(state, |engine| async move {
        engine.file_status(&file_name).await
    })
    .await
}

pub async fn list_files(state: &AppState) -> Result<ListFilesResult, String> {
    run_on_engine(state, |engine| async move {
        match engine.list_files().await {
            Ok(entries) => ListFilesResult {
                success: true,
                files: entries.iter().map(|f| f.path.clone()).collect(),
                entries,
                error: None,
            },
            Err(e) => ListFilesResult {
                success: false,
                files: Vec::new(),
                entries: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    })
    .await
}

pub async fn delete_file(state: &AppState, file_name: String) -> Result<OperationResult, String> {
    run_on_engine(state, |engine| async move {
        OperationResult::from(engine.delete_file(&file_name).await)
    })
    .await
}

pub async fn resolve_conflict(
    state: &AppState,
    file_name: String,
    resolution: ConflictChoice,
) -> Result<OperationResult, String> {
    run_on_engine(state, |engine| async move {
        OperationResult::from(engine.resolve_conflict(&file_name, resolution).await)
    })
    .await
}

pub async fn get_storage_usage(state: &AppState) -> Result<UsageResult, String> {
    run_on_engine(state, |engine| async move {
        match engine.storage_usage().await {
            Ok(usage) => UsageResult {
                success: true,
                usage: Some(usage),
                error: None,
            },
            Err(e) => UsageResult {
                success: false,
                usage: None,
                error: Some(e.to_string()),
            },
        }
    })
    .await
}
