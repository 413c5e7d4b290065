use std::time::Duration;

use serde::Deserialize;

use ferry_api::Configuration;

use crate::error::EngineError;

/// Engine settings, read from `job.setting`.
///
/// ```json
/// "setting": {
///     "speed": { "channel": 4 },
///     "channel": { "capacity": 1024, "batchSize": 32 },
///     "destroyTimeoutMs": 30000
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    #[serde(default)]
    pub speed: SpeedSettings,

    #[serde(default)]
    pub channel: ChannelSettings,

    /// Upper bound for each job/task `destroy`.
    #[serde(default = "default_destroy_timeout_ms")]
    pub destroy_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpeedSettings {
    /// Desired number of task pairs per content entry.
    #[serde(default = "default_concurrency")]
    pub channel: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSettings {
    /// Records buffered between a reader and its writer.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Records the sender accumulates before pushing them.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_concurrency() -> usize {
    1
}

fn default_capacity() -> usize {
    1024
}

fn default_batch_size() -> usize {
    32
}

fn default_destroy_timeout_ms() -> u64 {
    30_000
}

impl Default for SpeedSettings {
    fn default() -> Self {
        Self {
            channel: default_concurrency(),
        }
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            speed: SpeedSettings::default(),
            channel: ChannelSettings::default(),
            destroy_timeout_ms: default_destroy_timeout_ms(),
        }
    }
}

impl EngineSettings {
    /// Settings of a job configuration; absent `job.setting` means defaults.
    pub fn from_job(job_conf: &Configuration) -> Result<Self, EngineError> {
        let settings: Self = if job_conf.contains("job.setting") {
            job_conf.decode("job.setting")?
        } else {
            Self::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn destroy_timeout(&self) -> Duration {
        Duration::from_millis(self.destroy_timeout_ms)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.speed.channel == 0 {
            return Err(EngineError::Config("job.setting.speed.channel must be positive".into()));
        }
        if self.channel.capacity == 0 || self.channel.batch_size == 0 {
            return Err(EngineError::Config(
                "job.setting.channel capacity and batchSize must be positive".into(),
            ));
        }
        Ok(())
    }
}
