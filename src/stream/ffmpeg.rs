use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config;
use crate::stream::types::StreamError;

/// Batches queued towards the encoder stdin before the pipe counts as
/// saturated.
pub const DATA_CHANNEL_CAPACITY: usize = 8;

/// How long a stopped encoder gets to exit after SIGINT before it is killed.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Events emitted by the supervisor tasks towards the owning session.
#[derive(Debug)]
pub enum FfmpegEvent {
    /// One diagnostic line from the encoder, forwarded verbatim.
    Stderr(String),
    /// The process exited on its own with the given code.
    Exit(Option<i32>),
    /// Process-level failure (wait error, broken pipe handling).
    Error(String),
    /// The input channel regained capacity after saturation.
    Drain,
    /// Acknowledgement of a requested stop; the process is gone.
    Stopped,
}

/// Outcome of a non-blocking write towards the encoder stdin.
#[derive(Debug)]
pub enum WriteOutcome {
    /// Payload queued. `saturated` is true when this write used the last
    /// slot; the caller must pause flushing until `Drain` arrives.
    Accepted { saturated: bool },
    /// Channel full, payload handed back untouched.
    Rejected(Bytes),
    /// Input channel already closed; the payload was dropped.
    Closed,
}

/// Handle to a running encoder subprocess. Owns the sending side of the
/// bounded data channel; the process itself lives in detached tasks that
/// report back through the event channel.
pub struct FfmpegHandle {
    data_tx: mpsc::Sender<Bytes>,
    events: mpsc::Sender<FfmpegEvent>,
    stop: CancellationToken,
    drain_armed: Arc<AtomicBool>,
}

/// Startup dependency probe: the relay refuses to serve without a working
/// encoder binary.
pub async fn probe_encoder(bin: &str) -> anyhow::Result<()> {
    let status = Command::new(bin)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    if !status.success() {
        anyhow::bail!("`{} -version` exited with {}", bin, status);
    }
    Ok(())
}

/// Spawns the encoder with the given argument vector (no shell involved) and
/// wires its stdin, stderr and exit signal. Events flow to `events`; data
/// flows through the returned handle.
pub fn spawn(
    options: &[String],
    events: mpsc::Sender<FfmpegEvent>,
) -> Result<FfmpegHandle, StreamError> {
    let mut child = Command::new(config::config().ffmpeg_bin())
        .args(options)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(StreamError::Spawn)?;

    let mut stdin = child.stdin.take().expect("stdin piped");
    let stderr = child.stderr.take().expect("stderr piped");

    let (data_tx, mut data_rx) = mpsc::channel::<Bytes>(DATA_CHANNEL_CAPACITY);

    // Writer: drains the data channel into the encoder stdin. When the
    // channel closes, dropping stdin signals end-of-input.
    tokio::spawn(async move {
        while let Some(payload) = data_rx.recv().await {
            if let Err(e) = stdin.write_all(&payload).await {
                log::debug!(
                    "Ffmpeg: dropped {} bytes written after input closed: {}",
                    payload.len(),
                    e
                );
                break;
            }
        }
    });

    // Stderr reader: forwards diagnostic lines. Read errors end forwarding
    // but are not fatal to the stream.
    let stderr_events = events.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if stderr_events.send(FfmpegEvent::Stderr(line)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::debug!("Ffmpeg: stderr read error: {}", e);
                    break;
                }
            }
        }
    });

    // Exit watcher: owns the child. Either the process exits on its own, or
    // a stop request triggers SIGINT with a bounded wait and a kill fallback.
    let stop = CancellationToken::new();
    let watcher_stop = stop.clone();
    let exit_events = events.clone();
    tokio::spawn(async move {
        tokio::select! {
            status = child.wait() => match status {
                Ok(status) => {
                    log::info!("Ffmpeg: process exited with {:?}", status.code());
                    let _ = exit_events.send(FfmpegEvent::Exit(status.code())).await;
                }
                Err(e) => {
                    let _ = exit_events.send(FfmpegEvent::Error(e.to_string())).await;
                }
            },
            _ = watcher_stop.cancelled() => {
                if let Some(pid) = child.id() {
                    unsafe {
                        libc::kill(pid as libc::pid_t, libc::SIGINT);
                    }
                }
                match tokio::time::timeout(STOP_GRACE, child.wait()).await {
                    Ok(Ok(status)) => {
                        log::info!("Ffmpeg: stopped with {:?}", status.code());
                    }
                    Ok(Err(e)) => {
                        log::warn!("Ffmpeg: wait failed during stop: {}", e);
                    }
                    Err(_) => {
                        log::warn!(
                            "Ffmpeg: no exit within {:?} after SIGINT, killing",
                            STOP_GRACE
                        );
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                    }
                }
                let _ = exit_events.send(FfmpegEvent::Stopped).await;
            }
        }
    });

    Ok(FfmpegHandle {
        data_tx,
        events,
        stop,
        drain_armed: Arc::new(AtomicBool::new(false)),
    })
}

impl FfmpegHandle {
    /// Handle backed by bare channels, no process. Lets tests drive the
    /// write/backpressure path and session teardown without an encoder.
    #[cfg(test)]
    pub(crate) fn for_channel(
        data_tx: mpsc::Sender<Bytes>,
        events: mpsc::Sender<FfmpegEvent>,
    ) -> Self {
        Self {
            data_tx,
            events,
            stop: CancellationToken::new(),
            drain_armed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queues a payload for the encoder stdin without blocking. Saturation is
    /// reported through the outcome and a single drain subscription is armed;
    /// it fires `FfmpegEvent::Drain` exactly once when capacity returns.
    pub fn write(&self, payload: Bytes) -> WriteOutcome {
        match self.data_tx.try_reserve() {
            Ok(permit) => {
                permit.send(payload);
                let saturated = self.data_tx.capacity() == 0;
                if saturated {
                    self.subscribe_drain();
                }
                WriteOutcome::Accepted { saturated }
            }
            Err(mpsc::error::TrySendError::Full(())) => {
                self.subscribe_drain();
                WriteOutcome::Rejected(payload)
            }
            Err(mpsc::error::TrySendError::Closed(())) => WriteOutcome::Closed,
        }
    }

    fn subscribe_drain(&self) {
        if self.drain_armed.swap(true, Ordering::AcqRel) {
            return;
        }
        let data_tx = self.data_tx.clone();
        let events = self.events.clone();
        let drain_armed = Arc::clone(&self.drain_armed);
        tokio::spawn(async move {
            // Resolves once the writer has freed a slot; the permit itself is
            // released again so the next flush can claim it.
            if let Ok(permit) = data_tx.reserve().await {
                drop(permit);
                drain_armed.store(false, Ordering::Release);
                let _ = events.send(FfmpegEvent::Drain).await;
            }
        });
    }

    /// Closes the input channel and requests graceful termination. The exit
    /// watcher acknowledges with `FfmpegEvent::Stopped` once the process is
    /// gone, killing it if SIGINT goes unanswered.
    pub fn stop(self) {
        self.stop.cancel();
    }
}

#[cfg(test)]
#[path = "ffmpeg_test.rs"]
mod ffmpeg_test;
