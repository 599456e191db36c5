use std::{
    collections::HashMap,
    sync::LazyLock,
};

use tokio::sync::RwLock;

use crate::stream::types::EncodingProfile;

/// Registry entry for a live connection. The session itself is owned by its
/// connection task; the registry only tracks existence and profile.
#[derive(Clone)]
pub struct SessionEntry {
    pub profile: EncodingProfile,
}

static SESSION_MANAGER: LazyLock<RwLock<HashMap<String, SessionEntry>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

pub(crate) async fn add_session(id: &str, profile: EncodingProfile) -> anyhow::Result<()> {
    let mut sessions = SESSION_MANAGER.write().await;
    if sessions.contains_key(id) {
        return Err(anyhow::anyhow!("Session already exists"));
    }
    sessions.insert(id.to_string(), SessionEntry { profile });
    Ok(())
}

pub(crate) async fn remove_session(id: &str) {
    SESSION_MANAGER.write().await.remove(id);
}

pub(crate) async fn list_sessions() -> Vec<String> {
    SESSION_MANAGER.read().await.keys().cloned().collect()
}

pub(crate) async fn get_session(id: &str) -> Option<SessionEntry> {
    SESSION_MANAGER.read().await.get(id).cloned()
}
