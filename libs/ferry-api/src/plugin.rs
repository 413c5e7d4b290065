use std::fmt;

use async_trait::async_trait;

use crate::config::Configuration;
use crate::error::{ChannelError, PluginError};
use crate::record::Record;

// ═══════════════════════════════════════════════════════════════
//  Roles and configuration slices
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginRole {
    Reader,
    Writer,
}

impl PluginRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginRole::Reader => "reader",
            PluginRole::Writer => "writer",
        }
    }
}

impl fmt::Display for PluginRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Find the `reader`/`writer` slice named `name` in `job.content`.
pub fn locate_plugin(
    job_conf: &Configuration,
    role: PluginRole,
    name: &str,
) -> Result<Configuration, PluginError> {
    let content = job_conf.get_array("job.content")?;
    let name_path = format!("{role}.name");
    for entry in &content {
        if entry.get_string(&name_path).is_ok_and(|n| n == name) {
            return Ok(entry.get_config(role.as_str())?);
        }
    }
    Err(PluginError::config(format!("no {role} named '{name}' in job.content")))
}

/// `parameter` of a content slice, after checking the slice belongs to the
/// plugin described by `plugin_conf`.
fn slice_parameter(
    plugin_conf: &Configuration,
    plugin_job_conf: &Configuration,
) -> Result<Configuration, PluginError> {
    let name = plugin_conf.get_string("name")?;
    let slice_name = plugin_job_conf.get_string("name")?;
    if slice_name != name {
        return Err(PluginError::config(format!(
            "configuration slice is for '{slice_name}', not '{name}'"
        )));
    }
    Ok(plugin_job_conf.get_config("parameter")?)
}

/// Configuration shared by every job implementation.
///
/// `plugin_conf` describes the plugin itself (`name`, `dialect`, ...).
/// `plugin_job_conf` is this plugin's slice of the job content
/// (`{"name": ..., "parameter": {...}}`).
#[derive(Debug, Clone, Default)]
pub struct BaseJob {
    plugin_conf: Configuration,
    plugin_job_conf: Configuration,
}

impl BaseJob {
    pub fn plugin_conf(&self) -> &Configuration {
        &self.plugin_conf
    }

    pub fn set_plugin_conf(&mut self, conf: Configuration) {
        self.plugin_conf = conf;
    }

    pub fn plugin_job_conf(&self) -> &Configuration {
        &self.plugin_job_conf
    }

    pub fn set_plugin_job_conf(&mut self, conf: Configuration) {
        self.plugin_job_conf = conf;
    }

    pub fn parameter(&self) -> Result<Configuration, PluginError> {
        slice_parameter(&self.plugin_conf, &self.plugin_job_conf)
    }
}

/// Configuration and identity shared by every task implementation.
#[derive(Debug, Clone, Default)]
pub struct BaseTask {
    plugin_conf: Configuration,
    plugin_job_conf: Configuration,
    task_id: usize,
}

impl BaseTask {
    pub fn plugin_conf(&self) -> &Configuration {
        &self.plugin_conf
    }

    pub fn set_plugin_conf(&mut self, conf: Configuration) {
        self.plugin_conf = conf;
    }

    pub fn plugin_job_conf(&self) -> &Configuration {
        &self.plugin_job_conf
    }

    pub fn set_plugin_job_conf(&mut self, conf: Configuration) {
        self.plugin_job_conf = conf;
    }

    pub fn task_id(&self) -> usize {
        self.task_id
    }

    pub fn set_task_id(&mut self, task_id: usize) {
        self.task_id = task_id;
    }

    pub fn parameter(&self) -> Result<Configuration, PluginError> {
        slice_parameter(&self.plugin_conf, &self.plugin_job_conf)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Record channel endpoints
// ═══════════════════════════════════════════════════════════════

/// Producer side of a record channel, held by a reader task.
#[async_trait]
pub trait RecordSender: Send {
    /// Blank record. Fails once the channel is terminated or shut down.
    fn create_record(&mut self) -> Result<Record, ChannelError>;

    /// Enqueue a record. Suspends while the channel is full.
    async fn send_writer(&mut self, record: Record) -> Result<(), ChannelError>;

    /// Make every record sent so far visible to the receiver.
    async fn flush(&mut self) -> Result<(), ChannelError>;

    /// Flush and mark the clean end of stream.
    async fn terminate(&mut self) -> Result<(), ChannelError>;

    /// Abort the stream; the receiver wakes with `ChannelError::Shutdown`.
    fn shutdown(&mut self);
}

/// Consumer side of a record channel, held by a writer task.
#[async_trait]
pub trait RecordReceiver: Send {
    /// Next record, `Ok(None)` after a clean terminate.
    async fn get_from_reader(&mut self) -> Result<Option<Record>, ChannelError>;

    /// Abort the stream; the sender's next operation fails.
    fn shutdown(&mut self);
}

// ═══════════════════════════════════════════════════════════════
//  Lifecycle traits
// ═══════════════════════════════════════════════════════════════

/// Job-level plugin instance: validates configuration and splits it into
/// task configurations.
#[async_trait]
pub trait Job: Send {
    fn base(&self) -> &BaseJob;
    fn base_mut(&mut self) -> &mut BaseJob;

    async fn init(&mut self) -> Result<(), PluginError>;

    async fn prepare(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Partition the job into at most `number` task configurations, each
    /// shaped like the job's own content slice.
    async fn split(&mut self, number: usize) -> Result<Vec<Configuration>, PluginError>;

    async fn post(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Release resources. Must be safe without a prior `init`.
    async fn destroy(&mut self) -> Result<(), PluginError>;
}

#[async_trait]
pub trait Task: Send {
    fn base(&self) -> &BaseTask;
    fn base_mut(&mut self) -> &mut BaseTask;

    async fn init(&mut self) -> Result<(), PluginError>;

    async fn prepare(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn post(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn destroy(&mut self) -> Result<(), PluginError>;
}

#[async_trait]
pub trait ReaderTask: Task {
    async fn start_read(&mut self, sender: &mut dyn RecordSender) -> Result<(), PluginError>;
}

#[async_trait]
pub trait WriterTask: Task {
    async fn start_write(&mut self, receiver: &mut dyn RecordReceiver) -> Result<(), PluginError>;
}

/// Registered reader: describes itself and builds fresh job/task instances.
pub trait ReaderPlugin: Send + Sync {
    /// Must carry at least `name`.
    fn plugin_conf(&self) -> Configuration;
    fn job(&self) -> Box<dyn Job>;
    fn task(&self) -> Box<dyn ReaderTask>;
}

pub trait WriterPlugin: Send + Sync {
    fn plugin_conf(&self) -> Configuration;
    fn job(&self) -> Box<dyn Job>;
    fn task(&self) -> Box<dyn WriterTask>;
}
