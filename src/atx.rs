// Latest ATX id from the network API

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::CapabilityError;
use crate::hex::{base64_to_hex, is_valid_id_hex};

#[derive(Debug, Deserialize)]
struct HighestResponse {
    activation: Option<Activation>,
}

#[derive(Debug, Deserialize)]
struct Activation {
    id: Option<String>,
}

/// Client for the `ActivationService/Highest` endpoint
#[derive(Debug, Clone)]
pub struct AtxClient {
    client: reqwest::Client,
    url: String,
}

impl AtxClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CapabilityError::Fetch(e.to_string()))?;
        Ok(Self { client, url: url.into() })
    }

    /// POST `{}` and return `activation.id` as lowercase hex
    pub async fn fetch_latest(&self) -> Result<String, CapabilityError> {
        debug!(url = %self.url, "Requesting latest ATX");
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| CapabilityError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Fetch(format!("API returned {status}: {body}")));
        }

        let body: HighestResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::Fetch(format!("invalid response body: {e}")))?;

        let raw = body
            .activation
            .and_then(|a| a.id)
            .ok_or_else(|| CapabilityError::Fetch("Invalid API response: missing ATX ID".to_string()))?;

        let id = normalize_atx_id(&raw)
            .ok_or_else(|| CapabilityError::Fetch(format!("unrecognised ATX ID encoding: {raw}")))?;
        info!(atx_id = %id, "Fetched latest ATX ID");
        Ok(id)
    }
}

/// Accept hex (any case) or base64 of 32 bytes; return lowercase hex
pub fn normalize_atx_id(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if is_valid_id_hex(raw) {
        return Some(raw.to_lowercase());
    }
    base64_to_hex(raw).filter(|hex| is_valid_id_hex(hex))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_hex() {
        assert_eq!(normalize_atx_id(&"AB".repeat(32)), Some("ab".repeat(32)));
    }

    #[test]
    fn test_normalize_base64() {
        let zeros = format!("{}=", "A".repeat(43));
        assert_eq!(normalize_atx_id(&zeros), Some("0".repeat(64)));
        // 3 bytes is not an id
        assert_eq!(normalize_atx_id("AAAA"), None);
        assert_eq!(normalize_atx_id(""), None);
    }
}
