//! 基于 OpenDAL 的远程文档存储（云盘目录、S3、WebDAV）

use super::local::set_file_modified;
use super::{
    ContainerAccess, FileInfo, FileMeta, ItemStatus, RemoteStore, Storage, IO_TIMEOUT_SECS,
    OP_TIMEOUT_SECS,
};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use opendal::{layers::TimeoutLayer, Builder, Metakey, Operator};
use std::path::PathBuf;
use std::time::Duration;

enum Backend {
    /// 挂载到本机的云盘目录，mounted 记录创建时目录是否已存在
    Fs { root: PathBuf, mounted: bool },
    S3 { access_key: String },
    WebDav { username: String, endpoint: String },
}

pub struct CloudStorage {
    operator: Operator,
    backend: Backend,
    name: String,
}

impl CloudStorage {
    fn build<B: Builder>(builder: B) -> Result<Operator> {
        // 添加超时层
        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();
        Ok(operator)
    }

    /// 本机上的云盘目录（例如同步客户端挂载的文件夹）
    pub fn fs(root: &str) -> Result<Self> {
        use opendal::services::Fs;

        // OpenDAL 会自动创建不存在的根目录，需要在此之前判断
        let mounted = std::path::Path::new(root).is_dir();
        let operator = Self::build(Fs::default().root(root))?;
        Ok(Self {
            operator,
            backend: Backend::Fs {
                root: PathBuf::from(root),
                mounted,
            },
            name: format!("fs:{}", root),
        })
    }

    pub fn s3(
        bucket: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        endpoint: Option<String>,
        prefix: Option<String>,
    ) -> Result<Self> {
        use opendal::services::S3;

        let mut builder = S3::default()
            .bucket(bucket)
            .region(region)
            .access_key_id(access_key)
            .secret_access_key(secret_key);

        if let Some(ep) = endpoint.as_deref().filter(|ep| !ep.is_empty()) {
            builder = builder.endpoint(ep);
        }
        if let Some(ref p) = prefix {
            builder = builder.root(p);
        }

        let name = format!(
            "s3://{}{}",
            bucket,
            prefix
                .as_deref()
                .map(|p| format!("/{}", p))
                .unwrap_or_default()
        );

        Ok(Self {
            operator: Self::build(builder)?,
            backend: Backend::S3 {
                access_key: access_key.to_string(),
            },
            name,
        })
    }

    pub fn webdav(
        endpoint: &str,
        username: &str,
        password: &str,
        root: Option<String>,
    ) -> Result<Self> {
        use opendal::services::Webdav;

        // root 直接拼接到 endpoint 中（避免 OpenDAL 的 URL 编码问题）
        let final_endpoint = match root.as_deref().filter(|r| !r.is_empty()) {
            Some(r) => format!(
                "{}/{}",
                endpoint.trim_end_matches('/'),
                r.trim_matches('/')
            ),
            None => endpoint.to_string(),
        };

        let builder = Webdav::default()
            .endpoint(&final_endpoint)
            .username(username)
            .password(password);

        Ok(Self {
            operator: Self::build(builder)?,
            backend: Backend::WebDav {
                username: username.to_string(),
                endpoint: final_endpoint.clone(),
            },
            name: format!("webdav:{}", final_endpoint),
        })
    }

    /// 目录路径需要以 `/` 结尾
    fn dir_path(path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() || path.ends_with('/') {
            path.to_string()
        } else {
            format!("{}/", path)
        }
    }

    fn file_path(path: &str) -> &str {
        path.trim_start_matches('/')
    }

    fn is_not_found(err: &opendal::Error) -> bool {
        err.kind() == opendal::ErrorKind::NotFound
    }
}

#[async_trait]
impl Storage for CloudStorage {
    async fn list_files(&self, prefix: Option<&str>) -> Result<Vec<FileInfo>> {
        let dir = Self::dir_path(prefix.unwrap_or(""));

        let lister = self
            .operator
            .lister_with(&dir)
            .recursive(true)
            .metakey(Metakey::ContentLength | Metakey::LastModified | Metakey::Mode)
            .await;

        let mut lister = match lister {
            Ok(l) => l,
            Err(e) if Self::is_not_found(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = lister.try_next().await? {
            let path_str = entry.path().trim_start_matches('/').to_string();

            // 跳过根目录和前缀目录本身
            if path_str.is_empty() || path_str == dir {
                continue;
            }

            let meta = entry.metadata();
            files.push(FileInfo {
                path: path_str,
                size: meta.content_length(),
                modified_time: meta.last_modified().map(|t| t.timestamp_millis()),
                is_dir: meta.is_dir(),
            });
        }

        Ok(files)
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        match self.operator.stat(Self::file_path(path)).await {
            Ok(meta) => Ok(Some(FileMeta {
                size: meta.content_length(),
                modified_time: meta.last_modified().map(|t| t.timestamp_millis()),
                is_dir: meta.is_dir(),
            })),
            Err(e) if Self::is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let data = self.operator.read(Self::file_path(path)).await?;
        Ok(data.to_bytes())
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        self.operator.write(Self::file_path(path), data).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        if path.ends_with('/') {
            self.operator.remove_all(&Self::dir_path(path)).await?;
        } else {
            // 删除不存在的文件不会报错
            self.operator.delete(Self::file_path(path)).await?;
        }
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let dir = Self::dir_path(path);
        if dir.is_empty() {
            return Ok(());
        }
        self.operator.create_dir(&dir).await?;
        Ok(())
    }

    async fn set_modified(&self, path: &str, modified_ms: i64) -> Result<()> {
        // 只有挂载目录能直接修改时间，对象存储由服务端决定
        match &self.backend {
            Backend::Fs { root, .. } => {
                set_file_modified(root.join(Self::file_path(path)), modified_ms).await
            }
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl RemoteStore for CloudStorage {
    fn identity(&self) -> Option<String> {
        match &self.backend {
            // 云盘目录未挂载视为未登录
            Backend::Fs { root, mounted } => {
                (*mounted && root.is_dir()).then(|| format!("fs:{}", root.display()))
            }
            Backend::S3 { access_key } => {
                let visible: String = access_key.chars().take(4).collect();
                (!access_key.is_empty()).then(|| format!("s3:{}****", visible))
            }
            Backend::WebDav { username, endpoint } => {
                (!username.is_empty()).then(|| format!("webdav:{}@{}", username, endpoint))
            }
        }
    }

    async fn container_access(&self) -> Result<ContainerAccess> {
        let reachable = match self.operator.check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("远程容器不可达 {}: {}", self.name, e);
                false
            }
        };

        let capability = self.operator.info().full_capability();
        let mut writable = capability.write && capability.create_dir;
        if let Backend::Fs { root, .. } = &self.backend {
            writable = writable
                && tokio::fs::metadata(root)
                    .await
                    .map(|m| !m.permissions().readonly())
                    .unwrap_or(false);
        }

        Ok(ContainerAccess {
            reachable,
            readable: reachable && capability.read && capability.list,
            writable: reachable && writable,
        })
    }

    async fn item_status(&self, path: &str) -> Result<ItemStatus> {
        // 对象存储写入即物化，存在即与云端一致
        let meta = self.operator.stat(Self::file_path(path)).await?;
        Ok(ItemStatus {
            size: Some(meta.content_length()),
            modified_time: meta.last_modified().map(|t| t.timestamp_millis()),
            ..ItemStatus::current()
        })
    }

    async fn start_downloading(&self, path: &str) -> Result<()> {
        self.operator.stat(Self::file_path(path)).await?;
        Ok(())
    }

    fn local_root(&self) -> Option<PathBuf> {
        match &self.backend {
            Backend::Fs { root, .. } => Some(root.clone()),
            _ => None,
        }
    }
}
