use std::fmt;

use crate::value::ColumnType;

/// Error kind for plugin errors.
///
/// The scheduler branches on the kind: a task that fails with `Shutdown`
/// was woken by its peer and is not the root cause of a pair failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing key, wrong value type, unparsable structure.
    Config,
    /// Store-connection factory failure.
    Connection,
    /// A column value cannot be represented in the requested type.
    Conversion,
    /// Failure reported by the underlying store during read or write.
    Io,
    /// Send/receive on a closed channel.
    Channel,
    /// The channel was shut down by the peer or by cancellation.
    Shutdown,
    /// Lifecycle operation invoked in the wrong state.
    State,
}

/// Error returned by every plugin trait method.
#[derive(Debug, Clone)]
pub struct PluginError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PluginError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Connection, message: msg.into() }
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Conversion, message: msg.into() }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Io, message: msg.into() }
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Channel, message: msg.into() }
    }

    pub fn shutdown(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Shutdown, message: msg.into() }
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::State, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Add context to the error, preserving the original ErrorKind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for PluginError {}

// ---------------------------------------------------------------------------
// Leaf error types
// ---------------------------------------------------------------------------

/// Failure of a column value conversion.
///
/// `Nil` means the value is absent, `Transform` means the conversion is
/// impossible for the pair of types, `Parse` means the input was malformed
/// and `OutOfRange` means the target cannot hold the value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColumnError {
    #[error("nil {column_type} value")]
    Nil { column_type: ColumnType },

    #[error("cannot transform {from} to {to} (val: {value})")]
    Transform { from: ColumnType, to: &'static str, value: String },

    #[error("cannot parse {value:?} of {from} as {to}: {reason}")]
    Parse { from: ColumnType, to: &'static str, value: String, reason: String },

    #[error("{value} of {from} is out of range for {to}")]
    OutOfRange { from: ColumnType, to: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("column '{0}' already exists in record")]
    ColumnExists(String),
}

/// Failure raised by the field bridge (scanners and valuers).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("field type is not ValuerGoType")]
    NotValuerGoType,

    #[error("{go_type} type({database_type})")]
    UnknownGoType { go_type: String, database_type: String },

    #[error("nothing scanned for field '{0}'")]
    NotScanned(String),

    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// Failure of a configuration lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("config key '{0}' is missing")]
    Missing(String),

    #[error("config key '{path}' is not {expected}")]
    WrongType { path: String, expected: &'static str },

    #[error("config key '{path}': {reason}")]
    Decode { path: String, reason: String },

    #[error("config parse: {0}")]
    Parse(String),
}

/// Failure of a record channel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The stream was already terminated or the peer hung up.
    #[error("record channel is closed")]
    Closed,

    /// The channel was aborted by `shutdown` or cancellation.
    #[error("record channel is shut down")]
    Shutdown,
}

// ---------------------------------------------------------------------------
// From impls: leaf error types → PluginError with correct ErrorKind
// ---------------------------------------------------------------------------

impl From<ColumnError> for PluginError {
    fn from(e: ColumnError) -> Self {
        Self::conversion(e.to_string())
    }
}

impl From<RecordError> for PluginError {
    fn from(e: RecordError) -> Self {
        Self::conversion(e.to_string())
    }
}

impl From<FieldError> for PluginError {
    fn from(e: FieldError) -> Self {
        Self::conversion(e.to_string())
    }
}

impl From<ConfigError> for PluginError {
    fn from(e: ConfigError) -> Self {
        Self::config(e.to_string())
    }
}

impl From<ChannelError> for PluginError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Closed => Self::channel(e.to_string()),
            ChannelError::Shutdown => Self::shutdown(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(e: serde_json::Error) -> Self {
        Self::config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_kind() {
        let err = PluginError::io("connection reset").with_context("task 3");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.message, "task 3: connection reset");
    }

    #[test]
    fn channel_errors_map_to_distinct_kinds() {
        assert_eq!(PluginError::from(ChannelError::Closed).kind(), ErrorKind::Channel);
        assert_eq!(PluginError::from(ChannelError::Shutdown).kind(), ErrorKind::Shutdown);
    }

    #[test]
    fn column_error_names_types_and_value() {
        let err = ColumnError::Transform {
            from: ColumnType::Decimal,
            to: "time",
            value: "10.5".into(),
        };
        assert_eq!(err.to_string(), "cannot transform decimal to time (val: 10.5)");
        assert_eq!(PluginError::from(err).kind(), ErrorKind::Conversion);
    }
}
