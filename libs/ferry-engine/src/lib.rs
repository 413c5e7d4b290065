pub mod channel;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod scheduler;
pub mod settings;

pub use error::EngineError;
pub use registry::PluginRegistry;
pub use scheduler::{JobContainer, JobReport, PairOutcome, PairReport};
pub use settings::EngineSettings;
