use bytes::Bytes;
use tokio::sync::mpsc;

use super::Session;
use crate::stream::ffmpeg::{FfmpegEvent, FfmpegHandle};
use crate::stream::types::{
    ControlMessage, EncodingProfile, ServerMessage, SessionState,
};

fn make_session() -> (Session, mpsc::Receiver<FfmpegEvent>) {
    let (event_tx, event_rx) = mpsc::channel(16);
    let profile = EncodingProfile::from_query(Some("15"), Some("44100"));
    (Session::new("s-1".to_string(), profile, event_tx), event_rx)
}

/// Puts the session into `Streaming` with a channel-backed encoder handle,
/// bypassing the real spawn.
fn attach_encoder(session: &mut Session, capacity: usize) -> mpsc::Receiver<Bytes> {
    let (data_tx, data_rx) = mpsc::channel(capacity);
    session.supervisor = Some(FfmpegHandle::for_channel(data_tx, session.events.clone()));
    session.state = SessionState::Streaming;
    data_rx
}

fn fatal(text: &str) -> ServerMessage {
    ServerMessage::Fatal(text.to_string())
}

#[tokio::test]
async fn destination_must_validate() {
    let (mut session, _events) = make_session();

    session.on_control(ControlMessage::ConfigRtmpDestination(
        "http://host".to_string(),
    ));
    assert_eq!(session.drain_outbox(), vec![fatal("Invalid RTMP destination.")]);
    assert_eq!(session.state(), SessionState::Idle);

    session.on_control(ControlMessage::ConfigRtmpDestination(
        "rtmps://host/app/key".to_string(),
    ));
    assert_eq!(
        session.drain_outbox(),
        vec![ServerMessage::Message(
            "RTMP destination set to: rtmps://host/app/key".to_string()
        )]
    );
    assert_eq!(session.state(), SessionState::Configured);
}

#[tokio::test]
async fn destination_is_immutable_while_streaming() {
    let (mut session, _events) = make_session();
    let _data_rx = attach_encoder(&mut session, 4);

    session.on_control(ControlMessage::ConfigRtmpDestination(
        "rtmps://host/other".to_string(),
    ));
    assert_eq!(session.drain_outbox(), vec![fatal("Stream already started.")]);
    assert_eq!(session.state(), SessionState::Streaming);
}

#[tokio::test]
async fn start_without_destination_is_fatal() {
    let (mut session, _events) = make_session();

    session.on_control(ControlMessage::Start);
    assert_eq!(session.drain_outbox(), vec![fatal("No destination given.")]);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.supervisor.is_none());
}

#[tokio::test]
async fn second_start_is_fatal_and_spawns_nothing() {
    let (mut session, _events) = make_session();
    let _data_rx = attach_encoder(&mut session, 4);

    session.on_control(ControlMessage::Start);
    assert_eq!(session.drain_outbox(), vec![fatal("Stream already started.")]);
    assert_eq!(session.state(), SessionState::Streaming);
    assert!(session.supervisor.is_some());
}

#[tokio::test]
async fn fragment_outside_streaming_tears_down() {
    let (mut session, _events) = make_session();

    session.on_fragment(Bytes::from_static(b"early"));
    assert_eq!(session.drain_outbox(), vec![fatal("Stream not started.")]);
    assert!(session.is_stopped());
}

#[tokio::test]
async fn codec_token_is_validated() {
    let (mut session, _events) = make_session();

    session.on_control(ControlMessage::ConfigVcodec("x".to_string()));
    assert_eq!(session.drain_outbox(), vec![fatal("Invalid codec.")]);

    session.on_control(ControlMessage::ConfigVcodec("libx264".to_string()));
    assert_eq!(
        session.drain_outbox(),
        vec![ServerMessage::Message("Codec set to: libx264".to_string())]
    );
}

#[tokio::test]
async fn fragments_flush_in_arrival_order() {
    let (mut session, _events) = make_session();
    let mut data_rx = attach_encoder(&mut session, 4);

    session.on_fragment(Bytes::from_static(b"one"));
    session.on_fragment(Bytes::from_static(b"two"));
    session.on_flush_deadline();

    session.on_fragment(Bytes::from_static(b"three"));
    session.on_flush_deadline();

    assert_eq!(data_rx.recv().await, Some(Bytes::from_static(b"onetwo")));
    assert_eq!(data_rx.recv().await, Some(Bytes::from_static(b"three")));
}

#[tokio::test]
async fn deadline_is_armed_by_first_fragment_only() {
    let (mut session, _events) = make_session();
    let _data_rx = attach_encoder(&mut session, 4);

    assert!(session.flush_deadline().is_none());
    session.on_fragment(Bytes::from_static(b"a"));
    let deadline = session.flush_deadline().expect("armed");
    session.on_fragment(Bytes::from_static(b"b"));
    assert_eq!(session.flush_deadline(), Some(deadline));
}

#[tokio::test]
async fn saturation_defers_to_a_single_drain_flush() {
    let (mut session, mut events) = make_session();
    let mut data_rx = attach_encoder(&mut session, 1);

    // First flush takes the only slot; the gate closes.
    session.on_fragment(Bytes::from_static(b"head"));
    session.on_flush_deadline();
    assert!(!session.gate.is_writable());

    // Everything ingested while saturated piles up in one pending batch.
    session.on_fragment(Bytes::from_static(b"mid"));
    session.on_fragment(Bytes::from_static(b"tail"));
    session.on_flush_deadline();
    assert!(session.flush_deadline().is_none());

    // Consuming the queued payload triggers the drain subscription.
    assert_eq!(data_rx.recv().await, Some(Bytes::from_static(b"head")));
    let drain = events.recv().await.expect("drain event");
    assert!(matches!(drain, FfmpegEvent::Drain));
    session.on_ffmpeg_event(drain);

    // Exactly one flush covering the whole accumulated buffer.
    assert_eq!(data_rx.recv().await, Some(Bytes::from_static(b"midtail")));
    assert!(session.batcher.is_empty());
}

#[tokio::test]
async fn disconnect_stops_encoder_exactly_once() {
    let (mut session, _events) = make_session();
    let mut data_rx = attach_encoder(&mut session, 4);

    session.on_disconnect();
    assert_eq!(session.state(), SessionState::Stopping);
    // The handle is gone and the input channel closed with it.
    assert!(session.supervisor.is_none());
    assert_eq!(data_rx.recv().await, None);

    // Idempotent while the acknowledgement is pending.
    session.on_disconnect();
    assert_eq!(session.state(), SessionState::Stopping);

    session.on_ffmpeg_event(FfmpegEvent::Stopped);
    assert!(session.is_stopped());

    session.on_ffmpeg_event(FfmpegEvent::Stopped);
    assert!(session.is_stopped());
    assert!(session.drain_outbox().is_empty());
}

#[tokio::test]
async fn disconnect_before_start_goes_straight_to_stopped() {
    let (mut session, _events) = make_session();
    session.on_disconnect();
    assert!(session.is_stopped());
}

#[tokio::test]
async fn encoder_exit_is_fatal_and_terminal() {
    let (mut session, _events) = make_session();
    let _data_rx = attach_encoder(&mut session, 4);

    session.on_ffmpeg_event(FfmpegEvent::Exit(Some(1)));
    assert_eq!(
        session.drain_outbox(),
        vec![fatal("FFmpeg process exited with code 1")]
    );
    assert!(session.is_stopped());
    assert!(session.supervisor.is_none());
}

#[tokio::test]
async fn encoder_error_is_fatal() {
    let (mut session, _events) = make_session();
    let _data_rx = attach_encoder(&mut session, 4);

    session.on_ffmpeg_event(FfmpegEvent::Error("broken pipe".to_string()));
    assert_eq!(
        session.drain_outbox(),
        vec![fatal("FFmpeg error: broken pipe")]
    );
    assert!(session.is_stopped());
}

#[tokio::test]
async fn exit_racing_a_requested_stop_is_the_acknowledgement() {
    let (mut session, _events) = make_session();
    let _data_rx = attach_encoder(&mut session, 4);

    session.on_disconnect();
    session.on_ffmpeg_event(FfmpegEvent::Exit(Some(255)));

    // No second fatal: the client asked for the stop.
    assert!(session.drain_outbox().is_empty());
    assert!(session.is_stopped());
}

#[tokio::test]
async fn stderr_is_forwarded_verbatim() {
    let (mut session, _events) = make_session();
    let _data_rx = attach_encoder(&mut session, 4);

    session.on_ffmpeg_event(FfmpegEvent::Stderr("frame=  10 fps=1.0".to_string()));
    assert_eq!(
        session.drain_outbox(),
        vec![ServerMessage::FfmpegStderr("frame=  10 fps=1.0".to_string())]
    );
}

#[tokio::test]
async fn explicit_stop_control_message() {
    let (mut session, _events) = make_session();
    let _data_rx = attach_encoder(&mut session, 4);

    session.on_control(ControlMessage::Stop);
    assert_eq!(session.state(), SessionState::Stopping);
    session.on_ffmpeg_event(FfmpegEvent::Stopped);
    assert!(session.is_stopped());
}
