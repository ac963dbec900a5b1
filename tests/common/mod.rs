#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use cloudsync_lib::config::SyncSettings;
use cloudsync_lib::storage::{
    ContainerAccess, DownloadingStatus, FileInfo, FileMeta, ItemStatus, LocalStorage, RemoteStore,
    Storage,
};
use cloudsync_lib::SyncEngine;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
struct Entry {
    data: Bytes,
    modified: Option<i64>,
}

#[derive(Default)]
struct State {
    files: BTreeMap<String, Entry>,
    dirs: BTreeSet<String>,
    statuses: VecDeque<ItemStatus>,
    failing_writes: u32,
    write_error: Option<io::ErrorKind>,
    status_error: bool,
}

/// 内存中的远程存储，下载状态可按调用顺序编排
pub struct FakeRemote {
    state: Mutex<State>,
    identity: Mutex<Option<String>>,
    access: Mutex<ContainerAccess>,
    default_status: Mutex<ItemStatus>,
    pub writes: AtomicU32,
    pub stats: AtomicU32,
    pub start_downloads: AtomicU32,
    pub status_reads: AtomicU32,
}

fn norm(path: &str) -> String {
    path.trim_matches('/').to_string()
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            identity: Mutex::new(Some("fake:user".to_string())),
            access: Mutex::new(ContainerAccess {
                reachable: true,
                readable: true,
                writable: true,
            }),
            default_status: Mutex::new(ItemStatus::current()),
            writes: AtomicU32::new(0),
            stats: AtomicU32::new(0),
            start_downloads: AtomicU32::new(0),
            status_reads: AtomicU32::new(0),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// 直接放入一个文件
    pub fn put(&self, path: &str, data: &'static [u8], modified: i64) {
        self.state().files.insert(
            norm(path),
            Entry {
                data: Bytes::from_static(data),
                modified: Some(modified),
            },
        );
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.state().files.get(&norm(path)).map(|e| e.data.to_vec())
    }

    pub fn modified(&self, path: &str) -> Option<i64> {
        self.state().files.get(&norm(path)).and_then(|e| e.modified)
    }

    pub fn file_count(&self) -> usize {
        self.state().files.len()
    }

    pub fn dir_paths(&self) -> Vec<String> {
        self.state().dirs.iter().cloned().collect()
    }

    pub fn set_identity(&self, identity: Option<&str>) {
        *self.identity.lock().unwrap() = identity.map(str::to_string);
    }

    pub fn set_access(&self, access: ContainerAccess) {
        *self.access.lock().unwrap() = access;
    }

    /// 编排之后未指定时返回的状态
    pub fn set_default_status(&self, status: ItemStatus) {
        *self.default_status.lock().unwrap() = status;
    }

    /// 依次返回的状态，用完后回到默认状态
    pub fn script_statuses(&self, statuses: Vec<ItemStatus>) {
        self.state().statuses = statuses.into();
    }

    pub fn fail_writes(&self, count: u32, kind: io::ErrorKind) {
        let mut state = self.state();
        state.failing_writes = count;
        state.write_error = Some(kind);
    }

    pub fn fail_status_reads(&self, fail: bool) {
        self.state().status_error = fail;
    }
}

pub fn status(downloading: DownloadingStatus) -> ItemStatus {
    ItemStatus {
        downloading: Some(downloading),
        ..ItemStatus::current()
    }
}

pub fn download_error(message: &str) -> ItemStatus {
    ItemStatus {
        downloading: Some(DownloadingStatus::NotDownloaded),
        downloading_error: Some(message.to_string()),
        ..ItemStatus::current()
    }
}

#[async_trait]
impl Storage for FakeRemote {
    async fn list_files(&self, prefix: Option<&str>) -> Result<Vec<FileInfo>> {
        let prefix = prefix.map(norm).unwrap_or_default();
        let under = |p: &str| prefix.is_empty() || p.starts_with(&format!("{}/", prefix));

        let state = self.state();
        let mut out: Vec<FileInfo> = state
            .dirs
            .iter()
            .filter(|d| under(d))
            .map(|d| FileInfo {
                path: format!("{}/", d),
                size: 0,
                modified_time: None,
                is_dir: true,
            })
            .collect();
        out.extend(state.files.iter().filter(|(p, _)| under(p)).map(|(p, e)| FileInfo {
            path: p.clone(),
            size: e.data.len() as u64,
            modified_time: e.modified,
            is_dir: false,
        }));
        Ok(out)
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        self.stats.fetch_add(1, Ordering::SeqCst);
        let path = norm(path);
        let state = self.state();
        if let Some(entry) = state.files.get(&path) {
            return Ok(Some(FileMeta {
                size: entry.data.len() as u64,
                modified_time: entry.modified,
                is_dir: false,
            }));
        }
        if state.dirs.contains(&path) {
            return Ok(Some(FileMeta {
                size: 0,
                modified_time: None,
                is_dir: true,
            }));
        }
        Ok(None)
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        self.state()
            .files
            .get(&norm(path))
            .map(|e| e.data.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()).into())
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            let kind = state.write_error.unwrap_or(io::ErrorKind::Other);
            return Err(io::Error::new(kind, "injected write failure").into());
        }
        state.files.insert(
            norm(path),
            Entry {
                data,
                modified: Some(cloudsync_lib::storage::now_millis()),
            },
        );
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let path = norm(path);
        let nested = format!("{}/", path);
        let mut state = self.state();
        state.files.remove(&path);
        state.files.retain(|p, _| !p.starts_with(&nested));
        state.dirs.remove(&path);
        state.dirs.retain(|d| !d.starts_with(&nested));
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let path = norm(path);
        let mut state = self.state();
        let mut current = String::new();
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(seg);
            state.dirs.insert(current.clone());
        }
        Ok(())
    }

    async fn set_modified(&self, path: &str, modified_ms: i64) -> Result<()> {
        if let Some(entry) = self.state().files.get_mut(&norm(path)) {
            entry.modified = Some(modified_ms);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    fn identity(&self) -> Option<String> {
        self.identity.lock().unwrap().clone()
    }

    async fn container_access(&self) -> Result<ContainerAccess> {
        Ok(*self.access.lock().unwrap())
    }

    async fn item_status(&self, path: &str) -> Result<ItemStatus> {
        self.status_reads.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        if state.status_error {
            anyhow::bail!("metadata query failed");
        }
        let (size, modified_time) = match state.files.get(&norm(path)) {
            Some(entry) => (entry.data.len() as u64, entry.modified),
            None => return Err(io::Error::new(io::ErrorKind::NotFound, path.to_string()).into()),
        };
        let scripted = state.statuses.pop_front();
        drop(state);

        let item = scripted.unwrap_or_else(|| self.default_status.lock().unwrap().clone());
        Ok(ItemStatus {
            size: Some(size),
            modified_time,
            ..item
        })
    }

    async fn start_downloading(&self, _path: &str) -> Result<()> {
        self.start_downloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 测试环境：临时本地目录 + 内存远程存储
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub local: Arc<LocalStorage>,
    pub remote: Arc<FakeRemote>,
    pub engine: Arc<SyncEngine>,
}

pub fn settings(app_id: &str) -> SyncSettings {
    SyncSettings {
        app_id: app_id.to_string(),
        ..SyncSettings::default()
    }
}

pub fn harness() -> Harness {
    harness_with(settings("io.acme.notes"))
}

pub fn harness_with(settings: SyncSettings) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let local = Arc::new(LocalStorage::new(dir.path()).unwrap());
    let remote = FakeRemote::new();
    let engine = SyncEngine::new(
        local.clone(),
        dir.path().to_path_buf(),
        remote.clone(),
        &settings,
    );
    Harness {
        dir,
        local,
        remote,
        engine: Arc::new(engine),
    }
}

impl Harness {
    pub async fn write_local(&self, name: &str, data: &'static [u8], modified: i64) {
        self.local.write(name, Bytes::from_static(data)).await.unwrap();
        self.local.set_modified(name, modified).await.unwrap();
    }

    pub async fn read_local(&self, name: &str) -> Vec<u8> {
        self.local.read(name).await.unwrap().to_vec()
    }
}
