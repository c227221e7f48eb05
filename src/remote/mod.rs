//! Stream-oriented facade over the remote object store.
//!
//! [`RemoteStore`] owns the bucket identity and an [`ObjectClient`]. It
//! exposes uploads and metadata calls as plain async functions and downloads
//! as a pipeline [`Source`], so a download can be chained with local stages.

mod client;
mod store;

pub use client::{ByteStream, ObjectClient, ObjectInfo};
pub use store::ObjectStoreClient;

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::pipeline::Source;
use futures::StreamExt;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub const UPLOAD_OP: &str = "remote.upload";
pub const DOWNLOAD_STAGE: &str = "remote.download";
pub const STAT_OP: &str = "remote.stat";
pub const DELETE_OP: &str = "remote.delete";

/// Names one blob in the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHandle {
    pub bucket: String,
    pub key: String,
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

#[derive(Clone)]
pub struct RemoteStore {
    bucket: String,
    client: Arc<dyn ObjectClient>,
}

impl fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStore")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl RemoteStore {
    pub fn new(bucket: impl Into<String>, client: Arc<dyn ObjectClient>) -> Self {
        Self {
            bucket: bucket.into(),
            client,
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let client = ObjectStoreClient::from_config(config)?;
        Ok(Self::new(config.bucket.clone(), Arc::new(client)))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn handle(&self, name: &str) -> ObjectHandle {
        ObjectHandle {
            bucket: self.bucket.clone(),
            key: name.to_string(),
        }
    }

    /// Uploads the file at `local` as `name`. Returns the public URL of the
    /// object when the backend provides one.
    pub async fn upload(&self, local: &Path, name: &str) -> Result<Option<String>> {
        self.client.upload(local, name).await
    }

    /// Source stage streaming the object `name`.
    ///
    /// Fails with `Error::NotFound` when the object does not exist.
    pub fn download(&self, name: &str) -> Source {
        let client = Arc::clone(&self.client);
        let key = name.to_string();
        Source::new(DOWNLOAD_STAGE, move |outlet| async move {
            let mut stream = client.download(&key).await?;
            while let Some(chunk) = stream.next().await {
                outlet.send(chunk?).await?;
            }
            Ok(())
        })
    }

    /// Whether the object `name` exists.
    ///
    /// A missing object is `Ok(false)`; every other fault is reported as
    /// `Error::Transport`.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        match self.client.stat(name).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(err) => Err(err.into_transport()),
        }
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        self.client.delete(name).await
    }
}
