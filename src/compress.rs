use crate::error::Error;
use crate::pipeline::Transform;
use clap::ValueEnum;
use flate2::{Compression, read::MultiGzDecoder, write::GzEncoder};
use serde::{Deserialize, Serialize};
use std::io;

pub const COMPRESS_STAGE: &str = "compress";
pub const DECOMPRESS_STAGE: &str = "decompress";

/// Supported gzip compression levels.
#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Fastest,
    Faster,
    #[default]
    Default,
    Better,
    Best,
}

impl From<CompressionLevel> for Compression {
    fn from(level: CompressionLevel) -> Self {
        match level {
            CompressionLevel::Fastest => Compression::new(1),
            CompressionLevel::Faster => Compression::new(3),
            CompressionLevel::Default => Compression::new(6),
            CompressionLevel::Better => Compression::new(7),
            CompressionLevel::Best => Compression::new(9),
        }
    }
}

/// Gzip-compresses everything flowing through it.
pub fn compress(level: CompressionLevel) -> Transform {
    Transform::blocking(COMPRESS_STAGE, move |reader, writer| {
        let mut encoder = GzEncoder::new(writer, level.into());
        io::copy(reader, &mut encoder)?;
        encoder.finish()?;
        Ok(())
    })
}

/// Decompresses a (possibly multi-member) gzip stream.
pub fn decompress() -> Transform {
    Transform::blocking(DECOMPRESS_STAGE, |reader, writer| {
        let mut decoder = MultiGzDecoder::new(reader);
        io::copy(&mut decoder, writer).map_err(Error::from_codec)?;
        Ok(())
    })
}
