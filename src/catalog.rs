use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::config;

const API_BASE: &str = "https://ws.api.video";

/// Upstream live-stream record as returned by the video platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStream {
    pub live_stream_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stream_key: Option<String>,
    #[serde(default)]
    pub broadcasting: bool,
}

#[derive(Deserialize)]
struct LiveStreamPage {
    data: Vec<LiveStream>,
}

/// Thin client for the upstream stream catalog. Creates and lists the
/// live-stream records that clients later push to.
pub struct CatalogClient {
    http: reqwest::Client,
    api_key: String,
}

impl CatalogClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
        }
    }

    pub async fn create_stream(&self, name: &str) -> anyhow::Result<LiveStream> {
        let resp = self
            .http
            .post(format!("{}/live-streams", API_BASE))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    pub async fn list_streams(&self) -> anyhow::Result<Vec<LiveStream>> {
        let resp = self
            .http
            .get(format!("{}/live-streams", API_BASE))
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?;
        let page: LiveStreamPage = resp.json().await?;
        Ok(page.data)
    }
}

pub fn client() -> anyhow::Result<&'static CatalogClient> {
    static CLIENT: OnceLock<CatalogClient> = OnceLock::new();
    if let Some(client) = CLIENT.get() {
        return Ok(client);
    }
    let key = config::config()
        .api_video_key()
        .ok_or_else(|| anyhow::anyhow!("API_VIDEO_KEY not configured"))?;
    Ok(CLIENT.get_or_init(|| CatalogClient::new(key)))
}
