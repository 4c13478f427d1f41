//! Reader task, bounded queue and single consumer for one device feed.

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::analysis::stream::{StreamIngest, StreamOutcome, StreamStatus};
use crate::config::{AnalyzerConfig, LiveConfig};
use crate::error::SessionError;

/// Work items for the consumer, applied in queue order
#[derive(Debug, Clone)]
pub enum SessionInput {
    /// Raw bytes from the device
    Chunk(Bytes),
    /// Drop records of the dump in progress
    DiscardPending,
}

/// A running live session over a device reader and command writer.
pub struct LiveSession<W> {
    writer: W,
    config: LiveConfig,
    input: mpsc::Sender<SessionInput>,
    status: watch::Receiver<StreamStatus>,
    stop: watch::Sender<bool>,
    reader_task: Option<JoinHandle<Result<(), SessionError>>>,
    consumer_task: JoinHandle<StreamOutcome>,
}

impl<W: AsyncWrite + Unpin> LiveSession<W> {
    /// Spawn the reader and consumer tasks. Must be called inside a tokio runtime.
    pub fn start<R>(reader: R, writer: W, config: &AnalyzerConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let live = config.live.clone();
        let ingest = StreamIngest::new(config.parser.clone(), &config.signal, live.receiver.clone());

        let (input_tx, input_rx) = mpsc::channel(live.channel_capacity);
        let (status_tx, status_rx) = watch::channel(ingest.status().clone());
        let (stop_tx, stop_rx) = watch::channel(false);

        let reader_task = tokio::spawn(read_loop(reader, input_tx.clone(), stop_rx, live.clone()));
        let consumer_task = tokio::spawn(consume(ingest, input_rx, status_tx));

        log::info!(
            "live session started (poll {:?}, queue {}, chunk {} bytes)",
            live.poll_interval,
            live.channel_capacity,
            live.read_chunk
        );

        Self {
            writer,
            config: live,
            input: input_tx,
            status: status_rx,
            stop: stop_tx,
            reader_task: Some(reader_task),
            consumer_task,
        }
    }

    /// Write one command line to the device
    pub async fn send_command(&mut self, command: &str) -> Result<(), SessionError> {
        log::debug!("-> {}", command);
        let line = format!("{}{}", command, self.config.line_ending);
        self.writer.write_all(line.as_bytes()).await.map_err(SessionError::Write)?;
        self.writer.flush().await.map_err(SessionError::Write)
    }

    /// Ask the device for a fresh dump, dropping any half-received one first
    pub async fn request_dump(&mut self) -> Result<(), SessionError> {
        self.input
            .send(SessionInput::DiscardPending)
            .await
            .map_err(|_| SessionError::Closed)?;
        let command = self.config.dump_command.clone();
        self.send_command(&command).await
    }

    /// Latest consumer progress
    pub fn status(&self) -> StreamStatus {
        self.status.borrow().clone()
    }

    /// Wait until the consumer reports a status matching `predicate`
    pub async fn wait_for<F>(&mut self, predicate: F) -> Result<StreamStatus, SessionError>
    where
        F: FnMut(&StreamStatus) -> bool,
    {
        let status = self.status.wait_for(predicate).await.map_err(|_| SessionError::Closed)?;
        Ok(status.clone())
    }

    /// Resolves when the device feed ends on its own. Cancel-safe.
    pub async fn feed_closed(&mut self) -> Result<(), SessionError> {
        let Some(task) = self.reader_task.as_mut() else {
            return Ok(());
        };
        let result = task.await;
        self.reader_task = None;
        result?
    }

    /// Stop reading, apply everything already received and return the final state
    pub async fn shutdown(mut self) -> Result<StreamOutcome, SessionError> {
        let _ = self.stop.send(true);

        if let Some(task) = self.reader_task.take() {
            if let Err(e) = task.await? {
                log::warn!("live feed ended with error: {}", e);
            }
        }

        let LiveSession { input, consumer_task, .. } = self;
        drop(input);

        let outcome = consumer_task.await?;
        log::info!(
            "live session closed: {} lines, {} records, {} dumps completed",
            outcome.status.lines,
            outcome.status.records,
            outcome.status.dumps_completed
        );
        Ok(outcome)
    }
}

/// Move raw chunks into the queue. Each read is bounded by the poll
/// interval so a stop request is seen even on a silent device; once
/// stopping, reading continues only while data is still arriving.
async fn read_loop<R>(
    mut reader: R,
    input: mpsc::Sender<SessionInput>,
    stop: watch::Receiver<bool>,
    config: LiveConfig,
) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; config.read_chunk];
    let mut drained = 0usize;

    loop {
        let stopping = *stop.borrow();
        if stopping && drained >= config.channel_capacity {
            return Ok(());
        }

        match timeout(config.poll_interval, reader.read(&mut buf)).await {
            Err(_) if stopping => return Ok(()),
            Err(_) => continue,
            Ok(Ok(0)) => {
                log::info!("live feed closed by device");
                return Ok(());
            }
            Ok(Ok(n)) => {
                log::trace!("received {} bytes", n);
                if stopping {
                    drained += 1;
                }
                if input.send(SessionInput::Chunk(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                    return Err(SessionError::Closed);
                }
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
            Ok(Err(e)) => return Err(SessionError::Read(e)),
        }
    }
}

async fn consume(
    mut ingest: StreamIngest,
    mut input: mpsc::Receiver<SessionInput>,
    status: watch::Sender<StreamStatus>,
) -> StreamOutcome {
    while let Some(item) = input.recv().await {
        match item {
            SessionInput::Chunk(chunk) => ingest.feed(&chunk),
            SessionInput::DiscardPending => {
                let dropped = ingest.discard_pending();
                if dropped > 0 {
                    log::info!("discarded {} records of an unfinished dump", dropped);
                }
            }
        }
        status.send_replace(ingest.status().clone());
    }
    ingest.finish()
}
