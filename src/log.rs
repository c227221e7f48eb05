//! Per-operation structured logging.
//!
//! Every operation builds an [`OperationContext`] once and hands it to the
//! [`OperationLog`] together with each message, so all records of one call
//! carry the same fields. Where the records end up is decided by the
//! [`LogSink`]; the default sink forwards them to `tracing`.

use crate::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Immutable key/value description of one logical operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationContext {
    fields: Vec<(&'static str, String)>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the context extended with one more field.
    pub fn with(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

impl fmt::Display for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value:?}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

/// One log entry as handed to a [`LogSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl LogRecord {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Destination of operation log records.
pub trait LogSink: Send + Sync {
    fn record(&self, record: LogRecord);
}

/// Forwards records to `tracing` under the `tarcel` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, record: LogRecord) {
        let fields = record
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v:?}"))
            .collect::<Vec<_>>()
            .join(" ");
        match record.level {
            LogLevel::Info => tracing::info!(target: "tarcel", fields = %fields, "{}", record.message),
            LogLevel::Error => {
                tracing::error!(target: "tarcel", fields = %fields, "{}", record.message)
            }
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the first record with the given level and message.
    pub fn find(&self, level: LogLevel, message: &str) -> Option<LogRecord> {
        self.records()
            .into_iter()
            .find(|r| r.level == level && r.message == message)
    }
}

impl LogSink for MemorySink {
    fn record(&self, record: LogRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn record(&self, record: LogRecord) {
        (**self).record(record);
    }
}

/// Logger handed to every operation and pipeline.
#[derive(Clone)]
pub struct OperationLog {
    sink: Arc<dyn LogSink>,
}

impl Default for OperationLog {
    fn default() -> Self {
        Self::new(TracingSink)
    }
}

impl fmt::Debug for OperationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationLog").finish_non_exhaustive()
    }
}

impl OperationLog {
    pub fn new(sink: impl LogSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn info(&self, message: impl Into<String>, context: &OperationContext) {
        self.info_with(message, context, Vec::new());
    }

    /// Logs at info level with fields beyond the operation context.
    pub fn info_with(
        &self,
        message: impl Into<String>,
        context: &OperationContext,
        extra: Vec<(&'static str, String)>,
    ) {
        let mut fields = context_fields(context);
        fields.extend(extra.into_iter().map(|(k, v)| (k.to_string(), v)));
        self.sink.record(LogRecord {
            level: LogLevel::Info,
            message: message.into(),
            fields,
        });
    }

    /// Logs a failure of the stage or sub-operation `stage`.
    pub fn failure(
        &self,
        stage: &str,
        message: impl Into<String>,
        context: &OperationContext,
        err: &Error,
    ) {
        let mut fields = context_fields(context);
        fields.push(("stage".to_string(), stage.to_string()));
        fields.push(("message".to_string(), err.to_string()));
        fields.push(("kind".to_string(), err.kind().to_string()));
        if let Some(code) = err.code() {
            fields.push(("code".to_string(), code));
        }
        if let Some(trace) = err.trace() {
            fields.push(("trace".to_string(), trace));
        }
        self.sink.record(LogRecord {
            level: LogLevel::Error,
            message: message.into(),
            fields,
        });
    }
}

fn context_fields(context: &OperationContext) -> Vec<(String, String)> {
    context
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
