use axum::{
    Json, Router,
    extract::{
        Path, Query,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::manager;
use crate::stream::ffmpeg::FfmpegEvent;
use crate::stream::session::Session;
use crate::stream::types::{ControlMessage, EncodingProfile, ServerMessage};

pub fn live_router() -> Router {
    Router::new()
        .route("/", get(ws_upgrade))
        .route("/list", get(list_sessions))
        .route("/status/{id}", get(session_status))
}

/// Connection-time configuration, carried as query parameters on the
/// upgrade request.
#[derive(Deserialize)]
struct LiveQuery {
    framespersecond: Option<String>,
    #[serde(rename = "audioBitrate")]
    audio_bitrate: Option<String>,
}

async fn ws_upgrade(ws: WebSocketUpgrade, Query(query): Query<LiveQuery>) -> impl IntoResponse {
    let profile = EncodingProfile::from_query(
        query.framespersecond.as_deref(),
        query.audio_bitrate.as_deref(),
    );
    ws.on_upgrade(move |socket| async move {
        let id = uuid::Uuid::new_v4().to_string();
        log::info!("Live: connection {} opened", id);
        if let Err(e) = handle_live_socket(socket, &id, profile).await {
            log::warn!("Live: connection {} ended abnormally: {:#}", id, e);
        }
        log::info!("Live: connection {} closed", id);
    })
}

async fn list_sessions() -> Json<Vec<String>> {
    Json(manager::list_sessions().await)
}

async fn session_status(Path(id): Path<String>) -> Json<String> {
    match manager::get_session(&id).await {
        Some(entry) => Json(format!("connected ({:?})", entry.profile.framerate)),
        None => Json("not found".to_string()),
    }
}

async fn handle_live_socket(
    socket: WebSocket,
    id: &str,
    profile: EncodingProfile,
) -> anyhow::Result<()> {
    manager::add_session(id, profile).await?;
    let result = run_session(socket, id, profile).await;
    manager::remove_session(id).await;
    result
}

/// Drives one session: WebSocket frames in, encoder events in, batched
/// payloads out. The session struct is only ever touched from this task.
async fn run_session(
    mut socket: WebSocket,
    id: &str,
    profile: EncodingProfile,
) -> anyhow::Result<()> {
    let (event_tx, mut event_rx) = mpsc::channel::<FfmpegEvent>(64);
    let mut session = Session::new(id.to_string(), profile, event_tx);
    let mut socket_open = true;

    send_event(
        &mut socket,
        &ServerMessage::Message("Hello from mediarecorder-to-rtmp server!".to_string()),
    )
    .await?;
    send_event(
        &mut socket,
        &ServerMessage::Message("Please set rtmp destination before start streaming.".to_string()),
    )
    .await?;

    loop {
        if session.is_stopped() {
            break;
        }

        tokio::select! {
            incoming = socket.recv(), if socket_open => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ControlMessage>(text.as_str()) {
                        Ok(ctl) => session.on_control(ctl),
                        Err(e) => log::debug!("Live: {} unrecognized control frame: {}", id, e),
                    }
                }
                Some(Ok(Message::Binary(data))) => session.on_fragment(data),
                Some(Ok(Message::Close(_))) => {
                    socket_open = false;
                    session.on_disconnect();
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::debug!("Live: {} socket error: {}", id, e);
                    socket_open = false;
                    session.on_disconnect();
                }
                None => {
                    socket_open = false;
                    session.on_disconnect();
                }
            },
            Some(event) = event_rx.recv() => session.on_ffmpeg_event(event),
            _ = flush_timer(session.flush_deadline()) => session.on_flush_deadline(),
        }

        for msg in session.drain_outbox() {
            if socket_open && send_event(&mut socket, &msg).await.is_err() {
                socket_open = false;
                session.on_disconnect();
            }
        }
    }

    log::debug!(
        "Live: session {} finished in state {:?}",
        session.id(),
        session.state()
    );
    if socket_open {
        let _ = socket.send(Message::Close(None)).await;
    }
    Ok(())
}

async fn flush_timer(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending().await,
    }
}

async fn send_event(socket: &mut WebSocket, msg: &ServerMessage) -> anyhow::Result<()> {
    let json = serde_json::to_string(msg)?;
    socket.send(Message::Text(json.into())).await?;
    Ok(())
}
