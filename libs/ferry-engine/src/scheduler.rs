//! Job container: turns each `job.content` entry into task pairs and runs them.
//!
//! Per entry: reader and writer jobs are initialized and prepared, the
//! reader job is split into N task configurations and the writer job into
//! the same number. Each pair gets one record channel and one child
//! cancellation token; both sides run as separate tokio tasks. Every pair
//! outcome is collected. `post` runs only when all pairs succeeded, and
//! `destroy` always runs. Destroy failures are kept in the report and fail
//! an otherwise successful job.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ferry_api::Configuration;
use ferry_api::error::{ErrorKind, PluginError};
use ferry_api::plugin::{ReaderPlugin, ReaderTask, RecordReceiver, RecordSender, WriterPlugin, WriterTask};

use crate::channel::{ChannelReceiver, ChannelSender, record_channel};
use crate::error::EngineError;
use crate::lifecycle::{ManagedJob, ManagedTask};
use crate::registry::PluginRegistry;
use crate::settings::EngineSettings;

// ═══════════════════════════════════════════════════════════════
//  Reports
// ═══════════════════════════════════════════════════════════════

/// Terminal outcome of one task pair.
///
/// When both sides fail, the side whose error is not a channel shutdown is
/// the root cause; the other side was only woken by it.
#[derive(Debug, Clone)]
pub enum PairOutcome {
    Success,
    ReaderFailed(PluginError),
    WriterFailed(PluginError),
    /// The job was cancelled while the pair was running.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PairReport {
    pub content: usize,
    pub pair_id: usize,
    pub outcome: PairOutcome,
    /// Records the reader handed to the channel.
    pub records_read: u64,
    /// Records the writer took from the channel.
    pub records_written: u64,
    /// Task `destroy` failures of either side.
    pub destroy_errors: Vec<PluginError>,
}

impl PairReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PairOutcome::Success)
    }

    pub fn error(&self) -> Option<&PluginError> {
        match &self.outcome {
            PairOutcome::ReaderFailed(e) | PairOutcome::WriterFailed(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobReport {
    pub pairs: Vec<PairReport>,
    /// Job-level `destroy` failures, reader before writer per content entry.
    pub destroy_errors: Vec<PluginError>,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.pairs.iter().all(PairReport::is_success) && self.destroy_errors().next().is_none()
    }

    /// Every destroy failure: task pairs first, then jobs.
    pub fn destroy_errors(&self) -> impl Iterator<Item = &PluginError> {
        self.pairs
            .iter()
            .flat_map(|p| p.destroy_errors.iter())
            .chain(self.destroy_errors.iter())
    }

    pub fn failed(&self) -> impl Iterator<Item = &PairReport> {
        self.pairs.iter().filter(|p| !p.is_success())
    }

    pub fn records_read(&self) -> u64 {
        self.pairs.iter().map(|p| p.records_read).sum()
    }

    pub fn records_written(&self) -> u64 {
        self.pairs.iter().map(|p| p.records_written).sum()
    }

    /// `Err` when any pair did not succeed or any destroy call failed.
    /// Failures are reported before cancellation, and both before destroy
    /// failures.
    pub fn check(self) -> Result<Self, EngineError> {
        let failed = self.failed().count();
        if failed > 0 {
            return match self.failed().find_map(|p| p.error().map(|e| (p, e))) {
                Some((p, e)) => Err(EngineError::TasksFailed {
                    failed,
                    total: self.pairs.len(),
                    first: format!("content {} pair {}: {e}", p.content, p.pair_id),
                }),
                None => Err(EngineError::Cancelled),
            };
        }
        let count = self.destroy_errors().count();
        if let Some(first) = self.destroy_errors().next().map(ToString::to_string) {
            return Err(EngineError::DestroyFailed { count, first });
        }
        Ok(self)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Job container
// ═══════════════════════════════════════════════════════════════

pub struct JobContainer {
    registry: Arc<PluginRegistry>,
    job_conf: Configuration,
    settings: EngineSettings,
    token: CancellationToken,
}

impl JobContainer {
    pub fn new(registry: Arc<PluginRegistry>, job_conf: Configuration) -> Result<Self, EngineError> {
        let settings = EngineSettings::from_job(&job_conf)?;
        Ok(Self {
            registry,
            job_conf,
            settings,
            token: CancellationToken::new(),
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Cancelling this token aborts every running task pair.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run the job. Fails if any task pair failed or the job was cancelled.
    pub async fn start(&self) -> Result<JobReport, EngineError> {
        let report = self.run().await?;
        tracing::info!(
            pairs = report.pairs.len(),
            read = report.records_read(),
            written = report.records_written(),
            failed = report.failed().count(),
            destroy_failed = report.destroy_errors().count(),
            "job finished"
        );
        report.check()
    }

    /// Run every content entry in order, stopping after the first entry
    /// with a failed pair. Errors outside task pairs (configuration, job
    /// init, split) are returned directly.
    pub async fn run(&self) -> Result<JobReport, EngineError> {
        let content = self.job_conf.get_array("job.content")?;
        if content.is_empty() {
            return Err(EngineError::Config("job.content is empty".into()));
        }

        let mut report = JobReport::default();
        for (index, entry) in content.iter().enumerate() {
            let (pairs, destroy_errors) = self
                .run_content(index, entry)
                .await
                .map_err(|e| e.with_context(format!("job.content.{index}")))?;
            report.pairs.extend(pairs);
            report.destroy_errors.extend(destroy_errors);
            if report.failed().next().is_some() {
                break;
            }
        }
        Ok(report)
    }

    /// Returns the pair reports together with the job destroy failures. When
    /// the entry itself fails, that error wins and destroy failures are only
    /// logged.
    async fn run_content(
        &self,
        index: usize,
        entry: &Configuration,
    ) -> Result<(Vec<PairReport>, Vec<PluginError>), EngineError> {
        let reader_name = entry.get_string("reader.name")?;
        let writer_name = entry.get_string("writer.name")?;
        let reader_plugin = self.registry.reader(&reader_name)?;
        let writer_plugin = self.registry.writer(&writer_name)?;
        let timeout = self.settings.destroy_timeout();

        let mut reader_job = ManagedJob::new(
            &reader_name,
            reader_plugin.job(),
            reader_plugin.plugin_conf(),
            entry.get_config("reader")?,
            timeout,
        );
        let mut writer_job = ManagedJob::new(
            &writer_name,
            writer_plugin.job(),
            writer_plugin.plugin_conf(),
            entry.get_config("writer")?,
            timeout,
        );

        tracing::info!(content = index, reader = %reader_name, writer = %writer_name, "job started");
        let result = self
            .run_jobs(index, &mut reader_job, &mut writer_job, &reader_plugin, &writer_plugin)
            .await;

        let destroy_errors: Vec<PluginError> = [reader_job.destroy().await, writer_job.destroy().await]
            .into_iter()
            .filter_map(Result::err)
            .collect();
        result.map(|pairs| (pairs, destroy_errors))
    }

    async fn run_jobs(
        &self,
        content: usize,
        reader_job: &mut ManagedJob,
        writer_job: &mut ManagedJob,
        reader_plugin: &Arc<dyn ReaderPlugin>,
        writer_plugin: &Arc<dyn WriterPlugin>,
    ) -> Result<Vec<PairReport>, EngineError> {
        reader_job.init().await?;
        writer_job.init().await?;
        reader_job.prepare().await?;
        writer_job.prepare().await?;

        let reader_confs = reader_job.split(self.settings.speed.channel).await?;
        if reader_confs.is_empty() {
            return Err(EngineError::Config(format!(
                "reader '{}' split into no task configuration",
                reader_job.name()
            )));
        }
        let writer_confs = writer_job.split(reader_confs.len()).await?;
        if writer_confs.len() != reader_confs.len() {
            return Err(EngineError::SplitMismatch {
                reader: reader_confs.len(),
                writer: writer_confs.len(),
            });
        }
        tracing::info!(content, pairs = reader_confs.len(), "job split");

        let pairs = self
            .run_pairs(
                content,
                (reader_job.name(), reader_plugin),
                (writer_job.name(), writer_plugin),
                reader_confs,
                writer_confs,
            )
            .await;

        if pairs.iter().all(|p| p.is_success() && p.destroy_errors.is_empty()) {
            writer_job.post().await?;
            reader_job.post().await?;
        }
        Ok(pairs)
    }

    async fn run_pairs(
        &self,
        content: usize,
        (reader_name, reader_plugin): (&str, &Arc<dyn ReaderPlugin>),
        (writer_name, writer_plugin): (&str, &Arc<dyn WriterPlugin>),
        reader_confs: Vec<Configuration>,
        writer_confs: Vec<Configuration>,
    ) -> Vec<PairReport> {
        let timeout = self.settings.destroy_timeout();
        let mut handles = Vec::with_capacity(reader_confs.len());

        for (pair_id, (reader_conf, writer_conf)) in reader_confs.into_iter().zip(writer_confs).enumerate() {
            let pair_token = self.token.child_token();
            let (sender, receiver) = record_channel(
                self.settings.channel.capacity,
                self.settings.channel.batch_size,
                pair_token.clone(),
            );
            let reader = ManagedTask::new(
                format!("{reader_name}[{pair_id}]"),
                reader_plugin.task(),
                reader_plugin.plugin_conf(),
                reader_conf,
                pair_id,
                timeout,
            );
            let writer = ManagedTask::new(
                format!("{writer_name}[{pair_id}]"),
                writer_plugin.task(),
                writer_plugin.plugin_conf(),
                writer_conf,
                pair_id,
                timeout,
            );

            let reader = tokio::spawn(run_reader(reader, sender, pair_token.clone()));
            let writer = tokio::spawn(run_writer(writer, receiver, pair_token));
            handles.push((pair_id, reader, writer));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (pair_id, reader, writer) in handles {
            let reader = join_side(reader).await;
            let writer = join_side(writer).await;
            let outcome = classify(reader.result, writer.result, self.token.is_cancelled());
            match &outcome {
                PairOutcome::Success => tracing::info!(
                    content,
                    pair = pair_id,
                    read = reader.records,
                    written = writer.records,
                    "task pair finished"
                ),
                PairOutcome::Cancelled => tracing::warn!(content, pair = pair_id, "task pair cancelled"),
                PairOutcome::ReaderFailed(e) | PairOutcome::WriterFailed(e) => {
                    tracing::error!(content, pair = pair_id, error = %e, "task pair failed")
                }
            }
            reports.push(PairReport {
                content,
                pair_id,
                outcome,
                records_read: reader.records,
                records_written: writer.records,
                destroy_errors: reader.destroy.into_iter().chain(writer.destroy).collect(),
            });
        }
        reports
    }
}

// ═══════════════════════════════════════════════════════════════
//  Task sides
// ═══════════════════════════════════════════════════════════════

struct SideResult {
    result: Result<(), PluginError>,
    records: u64,
    destroy: Option<PluginError>,
}

async fn join_side(handle: JoinHandle<SideResult>) -> SideResult {
    handle.await.unwrap_or_else(|e| SideResult {
        result: Err(PluginError::io(format!("task aborted: {e}"))),
        records: 0,
        destroy: None,
    })
}

async fn run_reader(
    mut task: ManagedTask<dyn ReaderTask>,
    mut sender: ChannelSender,
    token: CancellationToken,
) -> SideResult {
    let result: Result<(), PluginError> = async {
        task.init().await?;
        task.prepare().await?;
        tokio::select! {
            r = task.start_read(&mut sender) => r?,
            _ = token.cancelled() => return Err(PluginError::shutdown("task pair cancelled")),
        }
        task.post().await
    }
    .await;

    if let Err(e) = &result {
        sender.shutdown();
        tracing::debug!(task = %task.name(), error = %e, "reader task stopped");
    }
    SideResult {
        result,
        records: sender.records_sent(),
        destroy: task.destroy().await.err(),
    }
}

async fn run_writer(
    mut task: ManagedTask<dyn WriterTask>,
    mut receiver: ChannelReceiver,
    token: CancellationToken,
) -> SideResult {
    let result: Result<(), PluginError> = async {
        task.init().await?;
        task.prepare().await?;
        tokio::select! {
            r = task.start_write(&mut receiver) => r?,
            _ = token.cancelled() => return Err(PluginError::shutdown("task pair cancelled")),
        }
        task.post().await
    }
    .await;

    if let Err(e) = &result {
        receiver.shutdown();
        tracing::debug!(task = %task.name(), error = %e, "writer task stopped");
    }
    SideResult {
        result,
        records: receiver.records_received(),
        destroy: task.destroy().await.err(),
    }
}

fn is_shutdown(result: &Result<(), PluginError>) -> bool {
    matches!(result, Err(e) if e.kind() == ErrorKind::Shutdown)
}

fn classify(
    reader: Result<(), PluginError>,
    writer: Result<(), PluginError>,
    job_cancelled: bool,
) -> PairOutcome {
    let reader_secondary = reader.is_ok() || is_shutdown(&reader);
    let writer_secondary = writer.is_ok() || is_shutdown(&writer);
    match (reader, writer) {
        (Ok(()), Ok(())) => PairOutcome::Success,
        _ if job_cancelled && reader_secondary && writer_secondary => PairOutcome::Cancelled,
        (Err(e), _) if !reader_secondary => PairOutcome::ReaderFailed(e),
        (_, Err(e)) if !writer_secondary => PairOutcome::WriterFailed(e),
        (Err(e), _) => PairOutcome::ReaderFailed(e),
        (_, Err(e)) => PairOutcome::WriterFailed(e),
    }
}
