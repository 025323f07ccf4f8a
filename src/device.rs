use reqwest::Response;
use std::time::Duration;

/// Servo axes exposed by the pan/tilt mount.
#[derive(Debug, Clone, Copy)]
pub enum ServoAxis {
    X,
    Y,
}

impl ServoAxis {
    fn endpoint(self) -> &'static str {
        match self {
            ServoAxis::X => "servo_x",
            ServoAxis::Y => "servo_y",
        }
    }
}

/// Stateless HTTP client for the camera/actuator endpoints of the device.
///
/// Every call is a plain forward with a short timeout; callers decide what
/// a failure means. The long-lived `/stream` request is the one exception
/// to the timeout rule, since an MJPEG stream stays open indefinitely.
#[derive(Clone)]
pub struct DeviceClient {
    client: reqwest::Client,
    base_url: String,
}

impl DeviceClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a single JPEG frame from `/capture`.
    pub async fn snapshot(&self) -> Result<bytes::Bytes, reqwest::Error> {
        self.client
            .get(format!("{}/capture", self.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await
    }

    /// Open the device's MJPEG stream for byte-forwarding.
    pub async fn stream(&self) -> Result<Response, reqwest::Error> {
        self.client
            .get(format!("{}/stream", self.base_url))
            .send()
            .await?
            .error_for_status()
    }

    /// Whether the camera answers a capture request.
    pub async fn is_connected(&self) -> bool {
        self.client
            .get(format!("{}/capture", self.base_url))
            .timeout(Duration::from_secs(3))
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }

    /// Point one servo axis at `angle` (already clamped by the caller).
    pub async fn set_servo(&self, axis: ServoAxis, angle: u8) -> Result<(), reqwest::Error> {
        self.client
            .get(format!("{}/{}?angle={}", self.base_url, axis.endpoint(), angle))
            .timeout(Duration::from_secs(1))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Switch the buzzer on or off.
    pub async fn set_buzzer(&self, on: bool) -> Result<(), reqwest::Error> {
        self.client
            .get(format!("{}/buzzer?on={}", self.base_url, on as u8))
            .timeout(Duration::from_secs(1))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
