//! The public operations: pack, unpack, upload, download, exists, remove.

use crate::archive;
use crate::compress::{self, CompressionLevel};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::local;
use crate::log::{OperationContext, OperationLog};
use crate::pipeline::{Pipeline, StageId};
use crate::remote::{DELETE_OP, DOWNLOAD_STAGE, RemoteStore, STAT_OP, UPLOAD_OP};
use std::path::{Path, PathBuf};

/// Result of a successful [`Tarcel::download`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    /// Name of the object in the remote store.
    pub name: String,
    /// Where the object was written.
    pub path: PathBuf,
}

/// Packs, unpacks and transports tarballs.
///
/// Every call builds its own stages and context, so one `Tarcel` can serve
/// any number of concurrent operations.
#[derive(Debug, Clone, Default)]
pub struct Tarcel {
    remote: Option<RemoteStore>,
    log: OperationLog,
    level: CompressionLevel,
}

impl Tarcel {
    /// A `Tarcel` with no remote store, logging through `tracing`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the remote store described by `config`, if any.
    pub fn from_config(config: &Config) -> Result<Self> {
        let remote = config
            .remote
            .as_ref()
            .map(RemoteStore::from_config)
            .transpose()?;
        Ok(Self {
            remote,
            log: OperationLog::default(),
            level: config.level,
        })
    }

    pub fn with_remote(mut self, remote: RemoteStore) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_log(mut self, log: OperationLog) -> Self {
        self.log = log;
        self
    }

    pub fn with_level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    /// The configured remote store. Its absence is logged as a failure of
    /// `stage`.
    fn remote(&self, stage: StageId, name: &str) -> Result<&RemoteStore> {
        self.remote.as_ref().ok_or_else(|| {
            let err = Error::Config("no remote store configured".to_string());
            let ctx = OperationContext::new().with("filename", name);
            self.log.failure(stage, "Remote storage is not configured", &ctx, &err);
            err
        })
    }

    /// Packs the directory `source` into the gzip-compressed tarball
    /// `target`.
    pub async fn pack(&self, source: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<()> {
        let (source, target) = (source.as_ref(), target.as_ref());
        let ctx = OperationContext::new()
            .with("source", source.display())
            .with("target", target.display());

        self.log
            .info(format!("Start to pack tarball for {}", source.display()), &ctx);
        Pipeline::from_source(archive::archive(source))
            .through(compress::compress(self.level))
            .run(local::write_file(target), &ctx, &self.log)
            .await
            .map_err(|failure| failure.into_error())?;

        self.log
            .info(format!("Finished pack tarball for {}", source.display()), &ctx);
        Ok(())
    }

    /// Unpacks the gzip-compressed tarball `tarball` into `dir`.
    pub async fn unpack(&self, tarball: impl AsRef<Path>, dir: impl AsRef<Path>) -> Result<()> {
        let (tarball, dir) = (tarball.as_ref(), dir.as_ref());
        let ctx = OperationContext::new()
            .with("tarball", tarball.display())
            .with("dir", dir.display());

        self.log
            .info(format!("Start to unpack tarball for {}", tarball.display()), &ctx);
        Pipeline::from_source(local::read_file(tarball))
            .through(compress::decompress())
            .run(archive::extract(dir), &ctx, &self.log)
            .await
            .map_err(|failure| failure.into_error())?;

        self.log.info(
            format!("Finished unpack tarball for {}", tarball.display()),
            &ctx,
        );
        Ok(())
    }

    /// Uploads the tarball at `tarball` under `name`.
    ///
    /// Returns the object's public URL when the remote store provides one.
    pub async fn upload(&self, name: &str, tarball: impl AsRef<Path>) -> Result<Option<String>> {
        let tarball = tarball.as_ref();
        let remote = self.remote(UPLOAD_OP, name)?;
        let ctx = OperationContext::new()
            .with("tarball", tarball.display())
            .with("filename", name)
            .with("object", remote.handle(name));

        self.log.info("Start to upload tarball for package", &ctx);
        match remote.upload(tarball, name).await {
            Ok(url) => {
                let extra = url
                    .iter()
                    .map(|url| ("url", url.clone()))
                    .collect::<Vec<_>>();
                self.log
                    .info_with("Finished uploading tarball for package", &ctx, extra);
                Ok(url)
            }
            Err(err) => {
                self.log
                    .failure(UPLOAD_OP, "Failed to upload tarball for package", &ctx, &err);
                Err(err)
            }
        }
    }

    /// Downloads the object `name` into the file `tarball`.
    pub async fn download(&self, name: &str, tarball: impl AsRef<Path>) -> Result<Downloaded> {
        let tarball = tarball.as_ref();
        let remote = self.remote(DOWNLOAD_STAGE, name)?;
        let ctx = OperationContext::new()
            .with("filename", name)
            .with("tarball", tarball.display())
            .with("object", remote.handle(name));

        self.log.info("Start to download tarball for package", &ctx);
        Pipeline::from_source(remote.download(name))
            .run(local::write_file(tarball), &ctx, &self.log)
            .await
            .map_err(|failure| failure.into_error())?;

        self.log.info(
            format!(
                "Finished downloading tarball and written to {}",
                tarball.display()
            ),
            &ctx,
        );
        Ok(Downloaded {
            name: name.to_string(),
            path: tarball.to_path_buf(),
        })
    }

    /// Whether an object called `name` exists in the remote store.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let remote = self.remote(STAT_OP, name)?;
        let ctx = OperationContext::new()
            .with("filename", name)
            .with("object", remote.handle(name));

        self.log.info(
            format!("Start to check the existence of tarball {name}"),
            &ctx,
        );
        match remote.exists(name).await {
            Ok(true) => {
                self.log
                    .info(format!("tarball {name} exists in remote storage."), &ctx);
                Ok(true)
            }
            Ok(false) => {
                self.log.info(
                    format!("tarball {name} is not found in remote storage."),
                    &ctx,
                );
                Ok(false)
            }
            Err(err) => {
                self.log.failure(
                    STAT_OP,
                    "Failed to check the existence of the file",
                    &ctx,
                    &err,
                );
                Err(err)
            }
        }
    }

    /// Deletes the object `name` from the remote store.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let remote = self.remote(DELETE_OP, name)?;
        let ctx = OperationContext::new()
            .with("filename", name)
            .with("object", remote.handle(name));

        self.log
            .info(format!("Start to remove tarball {name}"), &ctx);
        match remote.remove(name).await {
            Ok(()) => {
                self.log.info(format!("Tarball {name} is removed"), &ctx);
                Ok(())
            }
            Err(err) => {
                self.log.failure(
                    DELETE_OP,
                    "Failed to remove the file from remote storage",
                    &ctx,
                    &err,
                );
                Err(err)
            }
        }
    }
}
