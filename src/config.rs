use std::sync::LazyLock;

pub struct RelayConfig {
    listen_addr: String,
    ffmpeg_bin: String,
    api_video_key: Option<String>,
}

impl RelayConfig {
    fn from_env() -> Self {
        Self {
            listen_addr: std::env::var("RELAY_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            ffmpeg_bin: std::env::var("RELAY_FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string()),
            api_video_key: std::env::var("API_VIDEO_KEY").ok(),
        }
    }

    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }

    pub fn ffmpeg_bin(&self) -> &str {
        &self.ffmpeg_bin
    }

    pub fn api_video_key(&self) -> Option<&str> {
        self.api_video_key.as_deref()
    }
}

pub fn config() -> &'static RelayConfig {
    static CONFIG: LazyLock<RelayConfig> = LazyLock::new(RelayConfig::from_env);
    &CONFIG
}
