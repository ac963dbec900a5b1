//! 诊断命令

use crate::core::DiagnosticReport;
use crate::AppState;
use serde::Serialize;

/// 诊断信息：引擎探测结果加上本地配置
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsResult {
    #[serde(flatten)]
    pub report: DiagnosticReport,
    pub config_dir: String,
    pub version: &'static str,
}

/// 获取诊断信息，内部错误记录在报告字段中
pub async fn get_diagnostics(state: &AppState) -> Result<DiagnosticsResult, String> {
    let engine = state.engine.clone();
    let report = tokio::spawn(async move { engine.diagnostics().await })
        .await
        .map_err(|e| format!("任务执行失败: {}", e))?;

    Ok(DiagnosticsResult {
        report,
        config_dir: state.config_dir.display().to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}
