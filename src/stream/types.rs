use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Framerate class selected at connection time. Only 1 and 15 fps carry a
/// dedicated GOP layout; everything else streams with the base skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerateClass {
    Fps1,
    Fps15,
    Other,
}

/// Encoding profile fixed for the lifetime of a connection, parsed from the
/// upgrade request's query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingProfile {
    pub framerate: FramerateClass,
    pub audio_sample_rate: u32,
}

impl EncodingProfile {
    /// `framespersecond` and `audioBitrate` arrive as raw query values.
    /// Unrecognized framerates fall back to the base skeleton, unparseable
    /// sample rates to 44100 Hz.
    pub fn from_query(framerate: Option<&str>, audio_bitrate: Option<&str>) -> Self {
        let framerate = match framerate.map(str::trim) {
            Some("1") => FramerateClass::Fps1,
            Some("15") => FramerateClass::Fps15,
            _ => FramerateClass::Other,
        };
        let audio_sample_rate = audio_bitrate
            .and_then(|r| r.trim().parse::<u32>().ok())
            .unwrap_or(44_100);
        Self {
            framerate,
            audio_sample_rate,
        }
    }
}

/// Destination URL that already passed validation. The only way to obtain
/// one is through `validate::validate_destination`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidUrl(pub(crate) String);

impl ValidUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ValidUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session lifecycle. `Stopped` is terminal; the registry entry is removed
/// once it is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configured,
    Streaming,
    Stopping,
    Stopped,
}

/// Everything that can go wrong for a single stream. The `Display` strings
/// are sent to the client verbatim in `fatal` events, so they are part of
/// the wire contract.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Invalid RTMP destination.")]
    InvalidDestination,
    #[error("Invalid codec.")]
    InvalidCodec,
    #[error("No destination given.")]
    NoDestination,
    #[error("Stream already started.")]
    AlreadyStarted,
    #[error("Stream not started.")]
    NotStarted,
    #[error("Could not start FFmpeg process")]
    Spawn(#[source] std::io::Error),
    #[error("FFmpeg error: {0}")]
    Runtime(String),
}

/// Inbound control frames, sent as JSON text over the WebSocket. Binary
/// frames carry the `binarystream` fragments and bypass this enum.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ControlMessage {
    #[serde(rename = "config_rtmpDestination")]
    ConfigRtmpDestination(String),
    #[serde(rename = "config_vcodec")]
    ConfigVcodec(String),
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "stop")]
    Stop,
}

/// Outbound frames, serialized as JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "message")]
    Message(String),
    #[serde(rename = "fatal")]
    Fatal(String),
    #[serde(rename = "ffmpeg_stderr")]
    FfmpegStderr(String),
}

impl ServerMessage {
    pub fn fatal(err: &StreamError) -> Self {
        Self::Fatal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_from_query() {
        let profile = EncodingProfile::from_query(Some("1"), Some("11025"));
        assert_eq!(profile.framerate, FramerateClass::Fps1);
        assert_eq!(profile.audio_sample_rate, 11_025);

        let profile = EncodingProfile::from_query(Some("15"), Some("22050"));
        assert_eq!(profile.framerate, FramerateClass::Fps15);

        // Unrecognized framerate, unparseable sample rate.
        let profile = EncodingProfile::from_query(Some("30"), Some("high"));
        assert_eq!(profile.framerate, FramerateClass::Other);
        assert_eq!(profile.audio_sample_rate, 44_100);

        let profile = EncodingProfile::from_query(None, None);
        assert_eq!(profile.framerate, FramerateClass::Other);
        assert_eq!(profile.audio_sample_rate, 44_100);
    }

    #[test]
    fn control_frames_parse() {
        let msg: ControlMessage = serde_json::from_str(
            r#"{"event":"config_rtmpDestination","data":"rtmps://host/app/key"}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ControlMessage::ConfigRtmpDestination(url) if url == "rtmps://host/app/key"
        ));

        let msg: ControlMessage = serde_json::from_str(r#"{"event":"start"}"#).unwrap();
        assert!(matches!(msg, ControlMessage::Start));

        let msg: ControlMessage =
            serde_json::from_str(r#"{"event":"config_vcodec","data":"libx264"}"#).unwrap();
        assert!(matches!(msg, ControlMessage::ConfigVcodec(token) if token == "libx264"));

        assert!(serde_json::from_str::<ControlMessage>(r#"{"event":"bogus"}"#).is_err());
    }

    #[test]
    fn server_frames_serialize() {
        let json = serde_json::to_string(&ServerMessage::Fatal("No destination given.".into()))
            .unwrap();
        assert_eq!(json, r#"{"event":"fatal","data":"No destination given."}"#);

        let json = serde_json::to_string(&ServerMessage::FfmpegStderr("frame=1".into())).unwrap();
        assert_eq!(json, r#"{"event":"ffmpeg_stderr","data":"frame=1"}"#);
    }

    #[test]
    fn error_strings_match_wire_contract() {
        assert_eq!(
            StreamError::InvalidDestination.to_string(),
            "Invalid RTMP destination."
        );
        assert_eq!(StreamError::NoDestination.to_string(), "No destination given.");
        assert_eq!(
            StreamError::AlreadyStarted.to_string(),
            "Stream already started."
        );
        assert_eq!(StreamError::NotStarted.to_string(), "Stream not started.");
        assert_eq!(
            StreamError::Spawn(std::io::Error::other("boom")).to_string(),
            "Could not start FFmpeg process"
        );
    }
}
