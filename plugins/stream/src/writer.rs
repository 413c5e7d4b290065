use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use ferry_api::plugin::{BaseJob, BaseTask, Job, RecordReceiver, Task, WriterPlugin, WriterTask};
use ferry_api::split::{ReplicaSplit, SplitStrategy};
use ferry_api::{Configuration, PluginError};

/// `parameter` of a `streamwriter` slice.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamWriterParam {
    /// Log every record at info level.
    #[serde(default = "default_print")]
    pub print: bool,

    #[serde(default = "default_field_delimiter")]
    pub field_delimiter: String,
}

fn default_print() -> bool {
    true
}

fn default_field_delimiter() -> String {
    ",".to_string()
}

impl Default for StreamWriterParam {
    fn default() -> Self {
        Self {
            print: default_print(),
            field_delimiter: default_field_delimiter(),
        }
    }
}

impl StreamWriterParam {
    fn from_parameter(parameter: &Configuration) -> Result<Self, PluginError> {
        Ok(parameter.decode("")?)
    }
}

/// Writer plugin that logs and counts records.
pub struct StreamWriter;

impl StreamWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StreamWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterPlugin for StreamWriter {
    fn plugin_conf(&self) -> Configuration {
        Configuration::from_value(json!({
            "name": "streamwriter",
            "description": "logs received records"
        }))
    }

    fn job(&self) -> Box<dyn Job> {
        Box::new(StreamWriterJob::default())
    }

    fn task(&self) -> Box<dyn WriterTask> {
        Box::new(StreamWriterTask::default())
    }
}

#[derive(Default)]
struct StreamWriterJob {
    base: BaseJob,
}

#[async_trait]
impl Job for StreamWriterJob {
    fn base(&self) -> &BaseJob {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseJob {
        &mut self.base
    }

    async fn init(&mut self) -> Result<(), PluginError> {
        StreamWriterParam::from_parameter(&self.base.parameter()?)?;
        Ok(())
    }

    async fn split(&mut self, number: usize) -> Result<Vec<Configuration>, PluginError> {
        ReplicaSplit.split(self.base.plugin_job_conf(), number)
    }

    async fn destroy(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

#[derive(Default)]
struct StreamWriterTask {
    base: BaseTask,
    param: StreamWriterParam,
    written: u64,
}

#[async_trait]
impl Task for StreamWriterTask {
    fn base(&self) -> &BaseTask {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseTask {
        &mut self.base
    }

    async fn init(&mut self) -> Result<(), PluginError> {
        self.param = StreamWriterParam::from_parameter(&self.base.parameter()?)?;
        Ok(())
    }

    async fn destroy(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

#[async_trait]
impl WriterTask for StreamWriterTask {
    async fn start_write(&mut self, receiver: &mut dyn RecordReceiver) -> Result<(), PluginError> {
        let task = self.base.task_id();
        while let Some(record) = receiver.get_from_reader().await? {
            self.written += 1;
            if self.param.print {
                tracing::info!(task, record = %record.display_with(&self.param.field_delimiter), "record");
            }
        }
        tracing::debug!(task, records = self.written, "stream writer done");
        Ok(())
    }
}
