//! 应用配置模块
//!
//! 所有配置保存在配置目录下的 `config.json` 中，按段（`sync`、`log`）存放。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 配置文件名
pub const CONFIG_FILE: &str = "config.json";
/// 应用目录名
pub const APP_DIR_NAME: &str = "cloudsync";

/// 读取配置文件中的某一段，文件缺失或损坏时返回 None
pub fn load_section<T: DeserializeOwned>(config_dir: &Path, key: &str) -> Option<T> {
    let content = fs::read_to_string(config_dir.join(CONFIG_FILE)).ok()?;
    let config: serde_json::Value = serde_json::from_str(&content).ok()?;
    let section = config.get(key)?.clone();
    match serde_json::from_value(section) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("配置段 '{}' 解析失败，使用默认值: {}", key, e);
            None
        }
    }
}

/// 写入配置文件中的某一段，保留其它段不变
pub fn save_section<T: Serialize>(config_dir: &Path, key: &str, value: &T) -> io::Result<()> {
    let config_file = config_dir.join(CONFIG_FILE);

    let mut config: serde_json::Value = match fs::read_to_string(&config_file) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({})),
        Err(e) if e.kind() == io::ErrorKind::NotFound => serde_json::json!({}),
        Err(e) => return Err(e),
    };
    if !config.is_object() {
        config = serde_json::json!({});
    }

    config[key] =
        serde_json::to_value(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let content = serde_json::to_string_pretty(&config)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::create_dir_all(config_dir)?;
    fs::write(&config_file, content)
}

/// 确定配置目录：显式指定 > 默认目录中 `data_path` 指向的自定义目录 > 默认目录
pub fn resolve_config_dir(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir;
    }

    let default_dir = crate::dirs::config_dir()
        .map(|p| p.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".cloudsync"));

    fs::read_to_string(default_dir.join(CONFIG_FILE))
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .and_then(|config| config.get("data_path")?.as_str().map(PathBuf::from))
        .filter(|p| p.is_dir())
        .inspect(|p| tracing::debug!("使用自定义数据路径: {:?}", p))
        .unwrap_or(default_dir)
}

/// 远程存储类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemoteType {
    /// 挂载到本地的云盘目录
    #[default]
    Fs,
    S3,
    WebDav,
}

/// 远程存储配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(rename = "type", default)]
    pub typ: RemoteType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webdav_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

/// 重试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    /// 最大尝试次数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 退避步长（秒），第 n 次失败后等待 n * 步长
    #[serde(default = "default_backoff_step_secs")]
    pub backoff_step_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_step_secs() -> u64 {
    2
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_step_secs: default_backoff_step_secs(),
        }
    }
}

/// 下载等待配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSettings {
    /// 等待远程文件就绪的绝对时限（秒）
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// 下载错误最多重新触发次数
    #[serde(default = "default_max_error_retries")]
    pub max_error_retries: u32,
    /// 未下载状态的轮询间隔（秒）
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// 状态读取失败后的等待间隔（秒）
    #[serde(default = "default_error_interval_secs")]
    pub error_interval_secs: u64,
}

fn default_deadline_secs() -> u64 {
    120 // 2 分钟
}

fn default_max_error_retries() -> u32 {
    3
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_error_interval_secs() -> u64 {
    1
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            max_error_retries: default_max_error_retries(),
            poll_interval_secs: default_poll_interval_secs(),
            error_interval_secs: default_error_interval_secs(),
        }
    }
}

impl DownloadSettings {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// 同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// 应用标识，用于权限问题诊断
    #[serde(default = "default_app_id")]
    pub app_id: String,
    /// 本地文档目录，未设置时使用系统文档目录下的应用目录
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_dir: Option<String>,
    #[serde(default = "default_remote")]
    pub remote: RemoteConfig,
    /// 远程容器中存放同步文件的子目录
    #[serde(default = "default_remote_subdir")]
    pub remote_subdir: String,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub download: DownloadSettings,
}

fn default_app_id() -> String {
    "com.example.cloudsync".to_string()
}

fn default_remote() -> RemoteConfig {
    RemoteConfig {
        typ: RemoteType::Fs,
        path: crate::dirs::home_dir()
            .map(|h| h.join("CloudDocuments").to_string_lossy().into_owned()),
        ..RemoteConfig::default()
    }
}

fn default_remote_subdir() -> String {
    "SyncData".to_string()
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            local_dir: None,
            remote: default_remote(),
            remote_subdir: default_remote_subdir(),
            retry: RetrySettings::default(),
            download: DownloadSettings::default(),
        }
    }
}

impl SyncSettings {
    /// 从配置文件加载同步配置
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "sync").unwrap_or_default()
    }

    /// 本地文档目录
    pub fn local_root(&self) -> PathBuf {
        self.local_dir
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| crate::dirs::document_dir().map(|d| d.join(APP_DIR_NAME)))
            .unwrap_or_else(|| PathBuf::from("Documents"))
    }
}
