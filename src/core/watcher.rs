//! 监听挂载型远程存储的外部修改

use crate::core::events::{EventBus, SyncEvent};
use crate::core::usage::is_probe_entry;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

/// 文件系统监听器，丢弃即停止监听
pub struct RemoteWatcher {
    _watcher: RecommendedWatcher,
    dir: PathBuf,
}

impl RemoteWatcher {
    /// 监听 `root/base_dir`，变化以相对 root 的路径发布到事件总线
    pub fn start(root: &Path, base_dir: &str, events: EventBus) -> Result<Self> {
        let dir = root.join(base_dir);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("创建监听目录失败: {}", dir.display()))?;

        let root = root.to_path_buf();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    for path in changed_paths(&root, &event) {
                        events.publish(SyncEvent::RemoteChanged { path });
                    }
                }
                Err(e) => tracing::warn!("远程目录监听错误: {}", e),
            }
        })?;
        watcher.watch(&dir, RecursiveMode::Recursive)?;

        tracing::info!("开始监听远程目录: {}", dir.display());
        Ok(Self {
            _watcher: watcher,
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for RemoteWatcher {
    fn drop(&mut self) {
        tracing::debug!("停止监听远程目录: {}", self.dir.display());
    }
}

/// 过滤出有意义的变化：跳过访问事件、临时文件和探测目录
fn changed_paths(root: &Path, event: &Event) -> Vec<String> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter_map(|p| p.strip_prefix(root).ok())
        .filter_map(|p| p.to_str())
        .map(|p| p.replace('\\', "/"))
        .filter(|p| {
            let name = p.rsplit('/').next().unwrap_or(p);
            !p.is_empty()
                && !is_probe_entry(p)
                && !(name.starts_with('.') && name.ends_with(".tmp"))
        })
        .collect()
}
