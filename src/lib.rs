//! tarcel: streaming tarball packaging and transport.
//!
//! Directory trees are packed into gzip-compressed tar archives, moved to
//! and from an object store, and unpacked again. Every operation is a
//! pipeline of concurrently running stages that resolves to exactly one
//! outcome, with failures attributed to the stage that caused them.

pub mod archive;
pub mod compress;
pub mod config;
pub mod error;
pub mod local;
pub mod log;
pub mod operations;
pub mod pipeline;
pub mod remote;

pub use compress::CompressionLevel;
pub use config::{Backend, Config, Credentials, RemoteConfig};
pub use error::{Error, ErrorKind, Result};
pub use log::{LogLevel, LogRecord, LogSink, MemorySink, OperationContext, OperationLog};
pub use operations::{Downloaded, Tarcel};
pub use pipeline::{Pipeline, Sink, Source, StageFailure, StageId, Transform};
pub use remote::{ObjectClient, ObjectHandle, ObjectStoreClient, RemoteStore};
