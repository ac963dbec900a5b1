use std::path::PathBuf;
use std::sync::Arc;

pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::SyncSettings;
pub use core::{SyncEngine, SyncEvent, TransferOutcome};
pub use error::SyncError;

/// 应用状态，在命令之间共享
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    pub config_dir: PathBuf,
    pub settings: Arc<SyncSettings>,
}

impl AppState {
    /// 读取配置目录中的设置并创建同步引擎
    pub async fn new(config_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let config_dir = config::resolve_config_dir(config_dir);
        std::fs::create_dir_all(&config_dir)?;

        let settings = SyncSettings::load(&config_dir);
        let engine = SyncEngine::from_settings(&settings).await?;

        Ok(Self::with_engine(engine, config_dir, settings))
    }

    /// 使用已创建的引擎（测试或嵌入时使用）
    pub fn with_engine(engine: SyncEngine, config_dir: PathBuf, settings: SyncSettings) -> Self {
        Self {
            engine: Arc::new(engine),
            config_dir,
            settings: Arc::new(settings),
        }
    }

    /// 清理资源（应用关闭时调用）
    pub async fn cleanup(&self) {
        tracing::info!("正在清理应用资源...");
        self.engine.shutdown();
        tracing::info!("资源清理完成");
    }
}

/// 平台目录
pub mod dirs {
    use std::path::PathBuf;

    fn home() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("USERPROFILE").ok().map(PathBuf::from)
        } else {
            std::env::var("HOME").ok().map(PathBuf::from)
        }
    }

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            home().map(|h| h.join("Library").join("Application Support"))
        } else {
            // Linux
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| home().map(|h| h.join(".config")))
        }
    }

    pub fn home_dir() -> Option<PathBuf> {
        home()
    }

    pub fn document_dir() -> Option<PathBuf> {
        if cfg!(target_os = "linux") {
            std::env::var("XDG_DOCUMENTS_DIR")
                .ok()
                .map(PathBuf::from)
                .or_else(|| home().map(|h| h.join("Documents")))
        } else {
            home().map(|h| h.join("Documents"))
        }
    }
}
