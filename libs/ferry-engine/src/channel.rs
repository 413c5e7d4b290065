//! Bounded record channel between one reader task and one writer task.
//!
//! Records travel in batches over a bounded `mpsc` queue. The sender
//! accumulates up to `batch_size` records and pushes them when the buffer
//! is full, on `flush` or on `terminate`. `terminate` enqueues an explicit
//! end-of-stream marker behind the last batch, so the receiver sees
//! `Ok(None)` only after every record. `shutdown` on either side cancels
//! the pair token: every suspended or later operation on both sides fails
//! with [`ChannelError::Shutdown`].

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ferry_api::Record;
use ferry_api::error::ChannelError;
use ferry_api::plugin::{RecordReceiver, RecordSender};

enum Message {
    Batch(Vec<Record>),
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Terminated,
    Shutdown,
}

/// Create a connected sender/receiver pair.
///
/// `capacity` bounds the records in flight; it is rounded up to a whole
/// number of batches. Cancelling `token` shuts the channel down.
pub fn record_channel(
    capacity: usize,
    batch_size: usize,
    token: CancellationToken,
) -> (ChannelSender, ChannelReceiver) {
    let batch_size = batch_size.max(1);
    let slots = capacity.max(1).div_ceil(batch_size);
    let (tx, rx) = mpsc::channel(slots);
    let sender = ChannelSender {
        tx,
        buffer: Vec::with_capacity(batch_size),
        batch_size,
        state: State::Open,
        token: token.clone(),
        sent: 0,
    };
    let receiver = ChannelReceiver {
        rx,
        pending: VecDeque::new(),
        state: State::Open,
        token,
        received: 0,
    };
    (sender, receiver)
}

pub struct ChannelSender {
    tx: mpsc::Sender<Message>,
    buffer: Vec<Record>,
    batch_size: usize,
    state: State,
    token: CancellationToken,
    sent: u64,
}

impl ChannelSender {
    /// Records delivered into the channel. Buffered records count once
    /// their batch is pushed.
    pub fn records_sent(&self) -> u64 {
        self.sent
    }

    fn check_open(&self) -> Result<(), ChannelError> {
        if self.state == State::Shutdown || self.token.is_cancelled() {
            return Err(ChannelError::Shutdown);
        }
        if self.state == State::Terminated {
            return Err(ChannelError::Closed);
        }
        Ok(())
    }

    async fn push(&mut self, message: Message) -> Result<(), ChannelError> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                self.state = State::Shutdown;
                Err(ChannelError::Shutdown)
            }
            r = self.tx.send(message) => r.map_err(|_| ChannelError::Closed),
        }
    }

    async fn push_buffer(&mut self) -> Result<(), ChannelError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        let n = batch.len() as u64;
        self.push(Message::Batch(batch)).await?;
        self.sent += n;
        Ok(())
    }
}

#[async_trait]
impl RecordSender for ChannelSender {
    fn create_record(&mut self) -> Result<Record, ChannelError> {
        self.check_open()?;
        Ok(Record::new())
    }

    async fn send_writer(&mut self, record: Record) -> Result<(), ChannelError> {
        self.check_open()?;
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.push_buffer().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ChannelError> {
        self.check_open()?;
        self.push_buffer().await
    }

    async fn terminate(&mut self) -> Result<(), ChannelError> {
        self.check_open()?;
        self.push_buffer().await?;
        self.push(Message::Terminate).await?;
        self.state = State::Terminated;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.state = State::Shutdown;
        self.buffer.clear();
        self.token.cancel();
    }
}

pub struct ChannelReceiver {
    rx: mpsc::Receiver<Message>,
    pending: VecDeque<Record>,
    state: State,
    token: CancellationToken,
    received: u64,
}

impl ChannelReceiver {
    /// Records handed out by `get_from_reader`.
    pub fn records_received(&self) -> u64 {
        self.received
    }
}

#[async_trait]
impl RecordReceiver for ChannelReceiver {
    async fn get_from_reader(&mut self) -> Result<Option<Record>, ChannelError> {
        loop {
            if self.state == State::Shutdown || self.token.is_cancelled() {
                self.state = State::Shutdown;
                return Err(ChannelError::Shutdown);
            }
            if let Some(record) = self.pending.pop_front() {
                self.received += 1;
                return Ok(Some(record));
            }
            if self.state == State::Terminated {
                return Ok(None);
            }

            let message = tokio::select! {
                biased;
                _ = self.token.cancelled() => None,
                m = self.rx.recv() => Some(m),
            };
            match message {
                None => {
                    self.state = State::Shutdown;
                    return Err(ChannelError::Shutdown);
                }
                Some(Some(Message::Batch(batch))) => self.pending.extend(batch),
                Some(Some(Message::Terminate)) => self.state = State::Terminated,
                // Sender dropped without terminating.
                Some(None) => return Err(ChannelError::Closed),
            }
        }
    }

    fn shutdown(&mut self) {
        self.state = State::Shutdown;
        self.pending.clear();
        self.token.cancel();
        self.rx.close();
    }
}
