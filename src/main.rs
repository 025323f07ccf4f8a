use anyhow::{Context, Result};
use clap::Parser;
use homewatch::buzzer::Buzzer;
use homewatch::config;
use homewatch::device::DeviceClient;
use homewatch::monitor::NoiseMonitor;
use homewatch::probe::NoiseProbe;
use homewatch::server::{self, AppState, Credentials, Sessions};
use homewatch::store::MonitorStore;
use log::info;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    info!("Starting homewatch");

    // Parse command-line arguments
    let cli = config::Cli::parse();

    // Load configuration
    let config = config::load_config(&cli)?;
    info!("Configuration loaded successfully");

    let store = MonitorStore::open(&config.db_path)?;
    let device = DeviceClient::new(&config.device_url);

    let probe = NoiseProbe::new(&config.device_url);
    let buzzer = Buzzer::new(device.clone(), config.enable_buzzer);

    let monitor = Arc::new(NoiseMonitor::new(
        store,
        Arc::new(probe),
        Box::new(buzzer),
        Duration::from_secs_f64(config.poll_interval_secs),
    ));
    monitor.start().await;

    let state = AppState {
        monitor: Arc::clone(&monitor),
        device,
        sessions: Arc::new(Sessions::new()),
        credentials: Arc::new(Credentials {
            username: config.username.clone(),
            password: config.password.clone(),
        }),
    };

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(
        "Dashboard listening on http://{} (device at {})",
        config.listen_addr, config.device_url
    );

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down, stopping noise monitor");
    monitor.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
