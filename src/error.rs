//! Error types shared by every stage and operation.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Unified result type for all fallible operations in tarcel.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced by stages, the remote store adapter and the operations.
///
/// The `Display` of every variant is the underlying message and nothing
/// else, so an error keeps its message when it crosses a stage boundary.
#[derive(Error, Debug)]
pub enum Error {
    /// Local filesystem fault.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Malformed archive or compressed data.
    #[error("{0}")]
    Format(String),

    /// Remote backend or network fault.
    #[error("{message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Credential or permission fault reported by the remote backend.
    #[error("{0}")]
    Auth(String),

    /// The requested remote object does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Configuration is missing or invalid.
    #[error("{0}")]
    Config(String),

    /// A stage panicked or its task could not be joined.
    #[error("{0}")]
    Internal(String),
}

/// Coarse classification of an [`Error`], stable across variants' payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Format,
    Transport,
    Auth,
    NotFound,
    Config,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Io => "IOError",
            ErrorKind::Format => "FormatError",
            ErrorKind::Transport => "TransportError",
            ErrorKind::Auth => "AuthError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Internal => "InternalError",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Builds a transport error that carries no source error.
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::Format(_) => ErrorKind::Format,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Auth(_) => ErrorKind::Auth,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Config(_) => ErrorKind::Config,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Diagnostic code of the error.
    ///
    /// For filesystem faults this is the raw OS error number when the OS
    /// provided one, otherwise the `io::ErrorKind` name.
    /// OS error numbers wrapped by a codec (the `tar` crate wraps them in its
    /// own error type) are found by walking the source chain.
    pub fn code(&self) -> Option<String> {
        match self {
            Error::Io(err) => Some(match os_code(err) {
                Some(code) => code.to_string(),
                None => format!("{:?}", err.kind()),
            }),
            _ => None,
        }
    }

    /// The chain of underlying causes, outermost first, or `None` when the
    /// error has no source.
    pub fn trace(&self) -> Option<String> {
        let mut causes = Vec::new();
        let mut next = self.source();
        while let Some(cause) = next {
            causes.push(cause.to_string());
            next = cause.source();
        }
        if causes.is_empty() {
            None
        } else {
            Some(causes.join("\ncaused by: "))
        }
    }

    /// Classifies an I/O error raised inside a codec (tar, gzip).
    ///
    /// OS faults and channel hang-ups stay [`Error::Io`]; everything the
    /// codec raised about the bytes themselves becomes [`Error::Format`].
    pub fn from_codec(err: io::Error) -> Self {
        if os_code(&err).is_some() {
            return Error::Io(err);
        }
        match err.kind() {
            io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::Other => Error::Format(err.to_string()),
            _ => Error::Io(err),
        }
    }

    /// Rewrites the error as a transport fault, keeping its message.
    ///
    /// Used where the remote adapter promises a transport error for
    /// anything that is not a missing object.
    pub fn into_transport(self) -> Self {
        match self {
            Error::Transport { .. } => self,
            other => Error::Transport {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// True when the stage failed only because the next stage stopped
    /// reading from it.
    pub(crate) fn is_downstream_closed(&self) -> bool {
        matches!(self, Error::Io(err) if err.kind() == io::ErrorKind::BrokenPipe)
    }

    /// True when the stage failed only because the previous stage stopped
    /// without completing its output.
    pub(crate) fn is_upstream_aborted(&self) -> bool {
        matches!(self, Error::Io(err) if err.kind() == io::ErrorKind::ConnectionAborted)
    }

    /// Failures caused by a neighbouring stage rather than by this one.
    pub(crate) fn is_consequential(&self) -> bool {
        self.is_downstream_closed() || self.is_upstream_aborted()
    }
}

/// Raw OS error number of `err` or of the first I/O error it wraps.
fn os_code(err: &io::Error) -> Option<i32> {
    if let Some(code) = err.raw_os_error() {
        return Some(code);
    }
    let mut next = err
        .get_ref()
        .map(|inner| inner as &(dyn StdError + 'static));
    while let Some(cause) = next {
        if let Some(code) = cause
            .downcast_ref::<io::Error>()
            .and_then(io::Error::raw_os_error)
        {
            return Some(code);
        }
        next = cause.source();
    }
    None
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Self {
        match &err {
            object_store::Error::NotFound { .. } => Error::NotFound(err.to_string()),
            object_store::Error::PermissionDenied { .. }
            | object_store::Error::Unauthenticated { .. } => Error::Auth(err.to_string()),
            _ => Error::Transport {
                message: err.to_string(),
                source: Some(Box::new(err)),
            },
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::Io(io::Error::from(err))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}
