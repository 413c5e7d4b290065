use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use ferry_api::plugin::{BaseJob, BaseTask, Job, ReaderPlugin, ReaderTask, RecordSender, Task};
use ferry_api::split::{ReplicaSplit, SplitStrategy};
use ferry_api::{Column, ColumnType, ColumnValue, Configuration, PluginError};

/// `parameter` of a `streamreader` slice.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamReaderParam {
    pub column: Vec<ColumnSpec>,
    /// Records produced by each task.
    pub slice_record_count: u64,
}

/// One generated column: `{"type": "bigInt", "value": "7"}`. A missing or
/// `null` value produces the typed nil.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnSpec {
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub value: Value,
}

impl ColumnSpec {
    fn build(&self) -> Result<ColumnValue, PluginError> {
        let t: ColumnType = self.column_type.parse().map_err(PluginError::config)?;
        let text = match &self.value {
            Value::Null => return Ok(ColumnValue::nil(t)),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let raw = ColumnValue::from_string(text);
        let value = match t {
            ColumnType::Bool => ColumnValue::from_bool(raw.as_bool()?),
            ColumnType::BigInt => ColumnValue::from_big_int(raw.as_big_int()?),
            ColumnType::Decimal => ColumnValue::from_decimal(raw.as_decimal()?),
            ColumnType::String => raw,
            ColumnType::Bytes => ColumnValue::from_bytes(raw.as_bytes()?),
            ColumnType::Time => ColumnValue::from_time(raw.as_time()?),
        };
        Ok(value)
    }
}

impl StreamReaderParam {
    fn from_parameter(parameter: &Configuration) -> Result<Self, PluginError> {
        Ok(parameter.decode("")?)
    }

    /// Column values of one generated record.
    fn columns(&self) -> Result<Vec<ColumnValue>, PluginError> {
        if self.column.is_empty() {
            return Err(PluginError::config("streamreader needs at least one column"));
        }
        self.column
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                spec.build()
                    .map_err(|e| PluginError::config(e.message).with_context(format!("column {i}")))
            })
            .collect()
    }
}

/// Reader plugin that generates records from its configuration.
pub struct StreamReader;

impl StreamReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StreamReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderPlugin for StreamReader {
    fn plugin_conf(&self) -> Configuration {
        Configuration::from_value(json!({
            "name": "streamreader",
            "description": "generates records from configured columns"
        }))
    }

    fn job(&self) -> Box<dyn Job> {
        Box::new(StreamReaderJob::default())
    }

    fn task(&self) -> Box<dyn ReaderTask> {
        Box::new(StreamReaderTask::default())
    }
}

#[derive(Default)]
struct StreamReaderJob {
    base: BaseJob,
}

#[async_trait]
impl Job for StreamReaderJob {
    fn base(&self) -> &BaseJob {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseJob {
        &mut self.base
    }

    async fn init(&mut self) -> Result<(), PluginError> {
        let param = StreamReaderParam::from_parameter(&self.base.parameter()?)?;
        param.columns()?;
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
struct StreamReaderTask {
    base: BaseTask,
    columns: Vec<ColumnValue>,
    records: u64,
}

#[async_trait]
impl Task for StreamReaderTask {
    fn base(&self) -> &BaseTask {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseTask {
        &mut self.base
    }

    async fn init(&mut self) -> Result<(), PluginError> {
        let param = StreamReaderParam::from_parameter(&self.base.parameter()?)?;
        self.columns = param.columns()?;
        self.records = param.slice_record_count;
        Ok(())
    }

    async fn destroy(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

#[async_trait]
impl ReaderTask for StreamReaderTask {
    async fn start_read(&mut self, sender: &mut dyn RecordSender) -> Result<(), PluginError> {
        for _ in 0..self.records {
            let mut record = sender.create_record()?;
            for (i, value) in self.columns.iter().enumerate() {
                record.add_column(Column::new(format!("col{i}"), value.clone()))?;
            }
            sender.send_writer(record).await?;
        }
        sender.flush().await?;
        sender.terminate().await?;
        tracing::debug!(task = self.base.task_id(), records = self.records, "stream reader done");
        Ok(())
    }
}
