use ferry_api::error::{ConfigError, PluginError};
use ferry_api::plugin::PluginRole;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("{role} plugin not found: {name}")]
    PluginNotFound { role: PluginRole, name: String },

    #[error("writer split into {writer} task configs, reader into {reader}")]
    SplitMismatch { reader: usize, writer: usize },

    #[error("{failed} of {total} task pairs failed, first: {first}")]
    TasksFailed {
        failed: usize,
        total: usize,
        first: String,
    },

    #[error("job cancelled")]
    Cancelled,

    #[error("{count} destroy calls failed, first: {first}")]
    DestroyFailed { count: usize, first: String },
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        EngineError::Config(e.to_string())
    }
}

impl EngineError {
    /// Add context to the error.
    ///
    /// For `Plugin` variant, context is added to the inner `PluginError`.
    /// For `Config`, context is prepended to the message.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Plugin(e) => EngineError::Plugin(e.with_context(ctx)),
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}
