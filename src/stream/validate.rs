use crate::stream::types::{StreamError, ValidUrl};

/// Accepts `rtmp://` and `rtmps://` URLs with no embedded whitespace.
pub fn validate_destination(url: &str) -> Result<ValidUrl, StreamError> {
    let scheme_ok = url.starts_with("rtmp://") || url.starts_with("rtmps://");
    if !scheme_ok || url.contains(char::is_whitespace) {
        return Err(StreamError::InvalidDestination);
    }
    Ok(ValidUrl(url.to_string()))
}

/// Legacy profile only: codec tokens are plain alphanumeric names like
/// "libx264", at least two characters long.
pub fn validate_codec_token(token: &str) -> Result<(), StreamError> {
    if token.len() >= 2 && token.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(StreamError::InvalidCodec)
    }
}
