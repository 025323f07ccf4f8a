use log::{debug, warn};
use std::time::Duration;

/// Candidate endpoints tried in order; the first parseable reading wins.
const NOISE_ENDPOINTS: [&str; 4] = ["/noise", "/noise_level", "/sound", "/get_noise"];

/// Last-resort endpoint returning a bare numeric body.
const PLAIN_TEXT_ENDPOINT: &str = "/noise.txt";

/// Per-candidate request timeout. An unreachable device costs at most
/// one timeout per candidate, never an unbounded stall.
const CANDIDATE_TIMEOUT: Duration = Duration::from_secs(2);

/// Reads the noise level from the device over HTTP.
///
/// The device firmware has shipped the reading under several routes over
/// time, so `read` walks the known candidates in order and short-circuits
/// on the first value it can parse. Every failure mode degrades to `None`;
/// the probe never surfaces an error to the poll loop.
pub struct NoiseProbe {
    client: reqwest::Client,
    base_url: String,
}

impl NoiseProbe {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CANDIDATE_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Current noise reading, or `None` when the device is unavailable.
    pub async fn read(&self) -> Option<f64> {
        for endpoint in NOISE_ENDPOINTS {
            if let Some(value) = self.try_json(endpoint).await {
                debug!("Noise reading {} from {}", value, endpoint);
                return Some(value);
            }
        }

        match self.try_plain_text(PLAIN_TEXT_ENDPOINT).await {
            Some(value) => {
                debug!("Noise reading {} from {}", value, PLAIN_TEXT_ENDPOINT);
                Some(value)
            }
            None => {
                warn!("No noise endpoint reachable on {}", self.base_url);
                None
            }
        }
    }

    /// Expects either `{"noise": 55.2}` or a bare numeric payload.
    async fn try_json(&self, endpoint: &str) -> Option<f64> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, endpoint))
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }

        let body: serde_json::Value = response.json().await.ok()?;
        parse_noise(&body)
    }

    async fn try_plain_text(&self, endpoint: &str) -> Option<f64> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, endpoint))
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }

        let body = response.text().await.ok()?;
        body.trim().parse().ok()
    }
}

/// Pull a numeric reading out of a JSON body: the `noise` field of an
/// object, a bare number, or a numeric string.
fn parse_noise(body: &serde_json::Value) -> Option<f64> {
    let value = match body {
        serde_json::Value::Object(_) => body.get("noise")?,
        _ => body,
    };

    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
