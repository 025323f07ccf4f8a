//! Home-monitoring dashboard backed by an ESP32-CAM class device.
//!
//! The core is the background noise monitor: a poll loop that samples the
//! device's microphone endpoints, persists every reading, and fires a
//! debounced buzzer alert when the configured threshold is crossed. A thin
//! axum layer serves the dashboard and proxies the camera and servo
//! endpoints of the device.

pub mod buzzer;
pub mod config;
pub mod device;
pub mod error;
pub mod monitor;
pub mod probe;
pub mod server;
pub mod store;
