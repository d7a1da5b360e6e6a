//! UDS-over-J1939 bootloader daemon.
//!
//! Owns the SocketCAN connection and the bootloader engine, and republishes
//! the engine's event stream (plus a small command surface) over WebSocket
//! so a desktop or web UI can drive a flash without linking against CAN
//! hardware itself.

mod can_adapter;
mod config_file;
mod websocket;
mod ws_sink;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use uds_bootloader_engine::uds::security::DefaultSecurityHook;
use uds_bootloader_engine::Engine;

use can_adapter::SocketCanPort;
use ws_sink::WsEventSink;

const WS_PORT: u16 = 7878;
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "daemon.toml".to_string());
    let config = config_file::load_or_default(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;
    config.validate().context("invalid configuration")?;

    let iface = format!("can{}", config.can_channel - 1);
    let can_port = SocketCanPort::open(&iface)
        .with_context(|| format!("failed to open CAN interface {iface}"))?;

    let (rx_tx, mut rx_rx) = tokio::sync::mpsc::unbounded_channel();
    can_port.spawn_recv_loop(rx_tx)?;

    let (sink, mut events_for_log) = WsEventSink::new(EVENT_CHANNEL_CAPACITY);
    let events_tx = sink.sender();
    tokio::spawn(async move {
        while let Ok(event) = events_for_log.recv().await {
            info!(?event, "engine event");
        }
    });

    let engine = Engine::new(
        config,
        Box::new(can_port),
        Box::new(sink.clone()),
        Box::new(DefaultSecurityHook),
    );
    let engine = Arc::new(Mutex::new(engine));

    let frame_engine = Arc::clone(&engine);
    tokio::spawn(async move {
        while let Some(frame) = rx_rx.recv().await {
            let mut engine = frame_engine.lock().await;
            if let Err(e) = engine.on_frame(frame).await {
                tracing::warn!(error = %e, "frame handling failed");
            }
        }
    });

    // The engine never blocks on its own clock (see its concurrency
    // notes); this tick is what actually turns an armed N_As/N_Bs/N_Cr
    // deadline into a timeout error when the ECU goes quiet mid-flash.
    let timeout_engine = Arc::clone(&engine);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_millis(100));
        loop {
            tick.tick().await;
            let mut engine = timeout_engine.lock().await;
            if let Err(e) = engine.check_timeouts() {
                tracing::warn!(error = %e, "bootloader timeout");
            }
        }
    });

    info!(port = WS_PORT, "starting bootloader daemon");
    websocket::run_server(WS_PORT, engine, events_tx).await
}
