use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::path::Path;

/// Stream of object bytes as produced by [`ObjectClient::download`].
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub e_tag: Option<String>,
}

/// Object storage backend used by [`super::RemoteStore`].
///
/// Implementations classify their faults: a missing object is
/// `Error::NotFound`, rejected credentials are `Error::Auth`, anything else
/// is `Error::Transport`.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Uploads the file at `local` as `key`, returning the object's public
    /// URL when the backend knows one.
    async fn upload(&self, local: &Path, key: &str) -> Result<Option<String>>;

    /// Opens the object `key` for reading.
    async fn download(&self, key: &str) -> Result<ByteStream>;

    async fn stat(&self, key: &str) -> Result<ObjectInfo>;

    async fn delete(&self, key: &str) -> Result<()>;
}
