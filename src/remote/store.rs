use super::client::{ByteStream, ObjectClient, ObjectInfo};
use crate::config::{Backend, RemoteConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, WriteMultipart};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Size of the pieces a local file is read in during upload.
const UPLOAD_CHUNK: usize = 1024 * 1024;
/// Upload parts allowed in flight at once.
const UPLOAD_CONCURRENCY: usize = 8;

/// [`ObjectClient`] on top of an `object_store` backend.
#[derive(Debug, Clone)]
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    public_url: Option<String>,
}

impl ObjectStoreClient {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            public_url: None,
        }
    }

    /// A client over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// Objects are reported as reachable under `base/<key>` after upload.
    pub fn with_public_url(mut self, base: impl Into<String>) -> Self {
        self.public_url = Some(base.into());
        self
    }

    /// Builds the backend described by `config`.
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = match config.backend {
            Backend::S3 => {
                let mut builder = AmazonS3Builder::from_env()
                    .with_bucket_name(&config.bucket)
                    .with_allow_http(config.allow_http);
                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                if let Some(credentials) = &config.credentials {
                    builder = builder
                        .with_access_key_id(&credentials.access_key_id)
                        .with_secret_access_key(&credentials.secret_access_key);
                    if let Some(token) = &credentials.session_token {
                        builder = builder.with_token(token);
                    }
                }
                Arc::new(builder.build().map_err(|e| Error::Config(e.to_string()))?)
            }
            Backend::Local => {
                let root = config.root.as_ref().ok_or_else(|| {
                    Error::Config("the local backend needs a `root` directory".to_string())
                })?;
                let bucket_dir = root.join(&config.bucket);
                fs::create_dir_all(&bucket_dir)?;
                let store = LocalFileSystem::new_with_prefix(&bucket_dir)
                    .map_err(|e| Error::Config(e.to_string()))?;
                Arc::new(store)
            }
            Backend::Memory => Arc::new(InMemory::new()),
        };

        let client = Self::new(store);
        Ok(match &config.public_url {
            Some(base) => client.with_public_url(base.clone()),
            None => client,
        })
    }

    fn url_of(&self, key: &str) -> Option<String> {
        self.public_url
            .as_ref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), key))
    }
}

#[async_trait]
impl ObjectClient for ObjectStoreClient {
    async fn upload(&self, local: &Path, key: &str) -> Result<Option<String>> {
        let mut file = File::open(local).await?;
        let location = ObjectPath::from(key);
        let upload = self.store.put_multipart(&location).await?;
        let mut writer = WriteMultipart::new(upload);

        loop {
            let mut buf = BytesMut::with_capacity(UPLOAD_CHUNK);
            let read = match file.read_buf(&mut buf).await {
                Ok(read) => read,
                Err(err) => {
                    let _ = writer.abort().await;
                    return Err(err.into());
                }
            };
            if read == 0 {
                break;
            }
            if let Err(err) = writer.wait_for_capacity(UPLOAD_CONCURRENCY).await {
                let _ = writer.abort().await;
                return Err(err.into());
            }
            writer.write(&buf);
        }

        writer.finish().await?;
        Ok(self.url_of(key))
    }

    async fn download(&self, key: &str) -> Result<ByteStream> {
        let result = self.store.get(&ObjectPath::from(key)).await?;
        Ok(result
            .into_stream()
            .map(|chunk| chunk.map_err(Error::from))
            .boxed())
    }

    async fn stat(&self, key: &str) -> Result<ObjectInfo> {
        let meta = self.store.head(&ObjectPath::from(key)).await?;
        Ok(ObjectInfo {
            key: meta.location.to_string(),
            size: meta.size as u64,
            e_tag: meta.e_tag,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(&ObjectPath::from(key)).await?;
        Ok(())
    }
}
