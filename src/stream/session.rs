use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::stream::batch::{BackpressureController, Batcher};
use crate::stream::ffmpeg::{self, FfmpegEvent, FfmpegHandle, WriteOutcome};
use crate::stream::options::build_options;
use crate::stream::types::{
    ControlMessage, EncodingProfile, ServerMessage, SessionState, StreamError, ValidUrl,
};
use crate::stream::validate::{validate_codec_token, validate_destination};

/// State and resources owned by one client connection's stream attempt.
///
/// The connection task is the only writer: control frames, binary fragments,
/// encoder events and the flush deadline all funnel through the methods
/// below, so no locking is needed. Outbound frames accumulate in the outbox
/// and are drained by the connection loop after every step.
pub struct Session {
    id: String,
    profile: EncodingProfile,
    destination: Option<ValidUrl>,
    vcodec: Option<String>,
    state: SessionState,
    batcher: Batcher,
    gate: BackpressureController,
    supervisor: Option<FfmpegHandle>,
    events: mpsc::Sender<FfmpegEvent>,
    outbox: Vec<ServerMessage>,
}

impl Session {
    pub fn new(id: String, profile: EncodingProfile, events: mpsc::Sender<FfmpegEvent>) -> Self {
        Self {
            id,
            profile,
            destination: None,
            vcodec: None,
            state: SessionState::Idle,
            batcher: Batcher::new(),
            gate: BackpressureController::new(),
            supervisor: None,
            events,
            outbox: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.state == SessionState::Stopped
    }

    /// Deadline for the connection loop's flush timer, if one is armed.
    pub fn flush_deadline(&self) -> Option<Instant> {
        self.batcher.deadline()
    }

    pub fn drain_outbox(&mut self) -> Vec<ServerMessage> {
        std::mem::take(&mut self.outbox)
    }

    pub fn on_control(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::ConfigRtmpDestination(url) => self.set_destination(&url),
            ControlMessage::ConfigVcodec(token) => self.set_vcodec(&token),
            ControlMessage::Start => self.start(),
            ControlMessage::Stop => self.request_stop(),
        }
    }

    fn set_destination(&mut self, url: &str) {
        match self.state {
            SessionState::Idle | SessionState::Configured => {}
            // Immutable once the stream is live.
            _ => {
                self.fatal(&StreamError::AlreadyStarted);
                return;
            }
        }
        match validate_destination(url) {
            Ok(valid) => {
                self.outbox.push(ServerMessage::Message(format!(
                    "RTMP destination set to: {}",
                    valid
                )));
                self.destination = Some(valid);
                self.state = SessionState::Configured;
            }
            Err(e) => self.fatal(&e),
        }
    }

    fn set_vcodec(&mut self, token: &str) {
        match validate_codec_token(token) {
            Ok(()) => {
                self.outbox
                    .push(ServerMessage::Message(format!("Codec set to: {}", token)));
                self.vcodec = Some(token.to_string());
            }
            Err(e) => self.fatal(&e),
        }
    }

    fn start(&mut self) {
        match self.state {
            SessionState::Idle | SessionState::Configured => {}
            _ => {
                self.fatal(&StreamError::AlreadyStarted);
                return;
            }
        }
        let Some(destination) = &self.destination else {
            self.fatal(&StreamError::NoDestination);
            return;
        };

        if let Some(vcodec) = &self.vcodec {
            // Legacy token; the option builder pins libx264.
            log::debug!("Session {}: configured vcodec {} not applied", self.id, vcodec);
        }
        let options = build_options(&self.profile, destination);
        match ffmpeg::spawn(&options, self.events.clone()) {
            Ok(handle) => {
                log::info!("Session {}: streaming to {}", self.id, destination);
                self.supervisor = Some(handle);
                self.state = SessionState::Streaming;
            }
            Err(e) => {
                log::error!("Session {}: spawn failed: {}", self.id, e);
                self.fatal(&e);
            }
        }
    }

    /// Binary fragment from the client. Only legal while streaming; anything
    /// else is fatal and tears the session down.
    pub fn on_fragment(&mut self, data: Bytes) {
        if self.state != SessionState::Streaming {
            self.fatal(&StreamError::NotStarted);
            self.request_stop();
            return;
        }
        let threshold_reached = self.batcher.ingest(data);
        if threshold_reached && self.gate.is_writable() {
            self.flush();
        }
    }

    /// The batch deadline fired. Flush if the pipe accepts writes, otherwise
    /// leave the buffer pending for the next drain signal.
    pub fn on_flush_deadline(&mut self) {
        if self.gate.is_writable() {
            self.flush();
        } else {
            self.batcher.disarm();
        }
    }

    pub fn on_ffmpeg_event(&mut self, event: FfmpegEvent) {
        match event {
            FfmpegEvent::Stderr(line) => {
                self.outbox.push(ServerMessage::FfmpegStderr(line));
            }
            FfmpegEvent::Drain => {
                self.gate.on_drain();
                if self.state == SessionState::Streaming && !self.batcher.is_empty() {
                    self.flush();
                }
            }
            FfmpegEvent::Exit(code) => {
                let reason = match code {
                    Some(code) => format!("FFmpeg process exited with code {}", code),
                    None => "FFmpeg process terminated by signal".to_string(),
                };
                self.on_runtime_failure(reason);
            }
            FfmpegEvent::Error(message) => {
                self.on_runtime_failure(StreamError::Runtime(message).to_string());
            }
            FfmpegEvent::Stopped => {
                if self.state == SessionState::Stopping {
                    log::info!("Session {}: stopped", self.id);
                    self.state = SessionState::Stopped;
                }
            }
        }
    }

    /// Connection closed. Unflushed buffered bytes are lost by design; the
    /// encoder is torn down deterministically.
    pub fn on_disconnect(&mut self) {
        self.request_stop();
    }

    /// Explicit stop, disconnect, or forced teardown. Idempotent: repeated
    /// requests while already stopping or stopped do nothing.
    fn request_stop(&mut self) {
        match self.state {
            SessionState::Streaming => {
                self.state = SessionState::Stopping;
                self.batcher.clear();
                if let Some(handle) = self.supervisor.take() {
                    log::info!("Session {}: stopping encoder", self.id);
                    handle.stop();
                }
            }
            SessionState::Idle | SessionState::Configured => {
                self.state = SessionState::Stopped;
            }
            SessionState::Stopping | SessionState::Stopped => {}
        }
    }

    /// The encoder died on its own. The exit doubles as the stop
    /// acknowledgement, so the session passes straight through `Stopping`.
    fn on_runtime_failure(&mut self, reason: String) {
        match self.state {
            SessionState::Streaming => {
                log::warn!("Session {}: {}", self.id, reason);
                self.outbox.push(ServerMessage::Fatal(reason));
                self.supervisor = None;
                self.batcher.clear();
                self.state = SessionState::Stopped;
            }
            SessionState::Stopping => {
                // Raced a requested stop; the process is gone either way.
                log::debug!("Session {}: exit during stop: {}", self.id, reason);
                self.state = SessionState::Stopped;
            }
            _ => {
                log::debug!("Session {}: stale encoder event: {}", self.id, reason);
            }
        }
    }

    /// Sends the whole buffer as one payload, preserving fragment order.
    /// While saturated nothing is sent and at most one flush stays pending.
    fn flush(&mut self) {
        if !self.gate.is_writable() || self.batcher.is_empty() {
            return;
        }
        let Some(handle) = self.supervisor.as_ref() else {
            self.batcher.disarm();
            return;
        };
        let payload = self.batcher.take();
        match handle.write(payload) {
            WriteOutcome::Accepted { saturated } => {
                if saturated {
                    self.gate.on_write_result(false);
                }
            }
            WriteOutcome::Rejected(payload) => {
                self.gate.on_write_result(false);
                self.batcher.requeue(payload);
            }
            WriteOutcome::Closed => {
                log::debug!("Session {}: write after input closed dropped", self.id);
            }
        }
    }

    fn fatal(&mut self, err: &StreamError) {
        self.outbox.push(ServerMessage::fatal(err));
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
