//! Local file endpoints of a pipeline.

use crate::pipeline::{CHUNK_SIZE, Sink, Source};
use bytes::BytesMut;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const READ_STAGE: &str = "file.read";
pub const WRITE_STAGE: &str = "file.write";

/// Source stage streaming the contents of the file at `path`.
pub fn read_file(path: impl Into<PathBuf>) -> Source {
    let path = path.into();
    Source::new(READ_STAGE, move |outlet| async move {
        let mut file = File::open(&path).await?;
        loop {
            let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
            if file.read_buf(&mut buf).await? == 0 {
                break;
            }
            outlet.send(buf.freeze()).await?;
        }
        Ok(())
    })
}

/// Sink stage writing its input to the file at `path`, truncating it.
///
/// Completes only after the final flush, so a partially written file is
/// never reported as done. Nothing is removed on failure.
pub fn write_file(path: impl Into<PathBuf>) -> Sink {
    let path = path.into();
    Sink::new(WRITE_STAGE, move |mut inlet| async move {
        let mut file = File::create(&path).await?;
        let mut written = 0u64;
        while let Some(chunk) = inlet.recv().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        tracing::debug!(path = %path.display(), written, "file written");
        Ok(())
    })
}
