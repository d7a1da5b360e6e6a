//! WebSocket server for web/desktop UI communication.
//!
//! A bounded connection count, a per-connection command loop, JSON in/JSON
//! out. Every connection additionally receives the engine's event stream
//! alongside command acks, since the bootloader drives itself off CAN
//! traffic rather than only ever replying to what was asked.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use uds_bootloader_engine::{BootloaderState, ByteOrder, Engine, EngineEvent};

const MAX_CONNECTIONS: usize = 5;

static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", content = "data")]
enum WsCommand {
    #[serde(rename = "set_firmware")]
    SetFirmware { bytes: Vec<u8> },

    #[serde(rename = "start")]
    Start,

    #[serde(rename = "check_state")]
    CheckState,

    #[serde(rename = "ecu_uds_reset")]
    EcuUdsReset,

    #[serde(rename = "ecu_software_reset")]
    EcuSoftwareReset,

    #[serde(rename = "apply_source_address")]
    ApplySourceAddress { device: u8, tester: u8 },

    #[serde(rename = "set_transfer_byte_order")]
    SetTransferByteOrder { big_endian: bool },

    #[serde(rename = "status")]
    Status,
}

/// Ack for a command, distinguished from the engine's own `EngineEvent`
/// stream by the fixed `kind: "ack"` tag (events use their own `kind`
/// values: `state`, `progress`, `finished`, ...).
#[derive(Debug, Serialize)]
struct WsResponse {
    kind: &'static str,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl WsResponse {
    fn success(data: serde_json::Value) -> Self {
        Self { kind: "ack", success: true, data: Some(data), error: None }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self { kind: "ack", success: false, data: None, error: Some(msg.into()) }
    }
}

pub async fn run_server(
    port: u16,
    engine: Arc<Mutex<Engine>>,
    events: broadcast::Sender<EngineEvent>,
) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "WebSocket server listening");

    while let Ok((stream, peer)) = listener.accept().await {
        let current = ACTIVE_CONNECTIONS.load(Ordering::SeqCst);
        if current >= MAX_CONNECTIONS {
            warn!(%peer, current, "connection rejected, max connections reached");
            drop(stream);
            continue;
        }

        ACTIVE_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
        info!(%peer, active = current + 1, "new connection");

        let engine = Arc::clone(&engine);
        let event_rx = events.subscribe();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, engine, event_rx).await {
                error!(error = %e, "connection error");
            }
            let remaining = ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
            info!(active = remaining, "connection closed");
        });
    }

    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    engine: Arc<Mutex<Engine>>,
    mut event_rx: broadcast::Receiver<EngineEvent>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!(%text, "received command");
                        let response = match serde_json::from_str::<WsCommand>(&text) {
                            Ok(cmd) => process_command(cmd, &engine).await,
                            Err(e) => WsResponse::error(format!("invalid command: {e}")),
                        };
                        let json = serde_json::to_string(&response)?;
                        write.send(Message::Text(json)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "websocket error");
                        break;
                    }
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        let json = serde_json::to_string(&event)?;
                        write.send(Message::Text(json)).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event subscriber lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    Ok(())
}

async fn process_command(cmd: WsCommand, engine: &Arc<Mutex<Engine>>) -> WsResponse {
    let mut engine = engine.lock().await;

    match cmd {
        WsCommand::SetFirmware { bytes } => match engine.set_firmware(bytes) {
            Ok(()) => WsResponse::success(serde_json::json!({ "firmware_set": true })),
            Err(e) => WsResponse::error(e.to_string()),
        },
        WsCommand::Start => match engine.start() {
            Ok(()) => WsResponse::success(serde_json::json!({ "started": true })),
            Err(e) => WsResponse::error(e.to_string()),
        },
        WsCommand::CheckState => match engine.check_state() {
            Ok(()) => WsResponse::success(serde_json::json!({ "checking": true })),
            Err(e) => WsResponse::error(e.to_string()),
        },
        WsCommand::EcuUdsReset => match engine.ecu_uds_reset() {
            Ok(()) => WsResponse::success(serde_json::json!({ "reset_requested": "uds" })),
            Err(e) => WsResponse::error(e.to_string()),
        },
        WsCommand::EcuSoftwareReset => match engine.ecu_software_reset() {
            Ok(()) => WsResponse::success(serde_json::json!({ "reset_requested": "software" })),
            Err(e) => WsResponse::error(e.to_string()),
        },
        WsCommand::ApplySourceAddress { device, tester } => {
            match engine.apply_source_address(device, tester) {
                Ok(()) => WsResponse::success(serde_json::json!({ "device": device, "tester": tester })),
                Err(e) => WsResponse::error(e.to_string()),
            }
        }
        WsCommand::SetTransferByteOrder { big_endian } => {
            let order = if big_endian { ByteOrder::Big } else { ByteOrder::Little };
            engine.set_transfer_byte_order(order);
            WsResponse::success(serde_json::json!({ "big_endian": big_endian }))
        }
        WsCommand::Status => WsResponse::success(serde_json::json!({
            "state": state_label(engine.state()),
            "candidates": engine.observer().candidates(),
        })),
    }
}

fn state_label(state: BootloaderState) -> &'static str {
    match state {
        BootloaderState::Ready => "ready",
        BootloaderState::SetProgrammingSession => "set_programming_session",
        BootloaderState::RequestSeed => "request_seed",
        BootloaderState::SeedVerification => "seed_verification",
        BootloaderState::WriteFingerprint => "write_fingerprint",
        BootloaderState::EraseFirmware => "erase_firmware",
        BootloaderState::RequestDownload => "request_download",
        BootloaderState::RequestDownloadConsecutive => "request_download_consecutive",
        BootloaderState::TransferDataFf => "transfer_data_ff",
        BootloaderState::TransferDataCf => "transfer_data_cf",
        BootloaderState::RequestTransferExit => "request_transfer_exit",
        BootloaderState::EcuUdsReset => "ecu_uds_reset",
        BootloaderState::EcuSoftwareReset => "ecu_software_reset",
        BootloaderState::ReadFingerprint => "read_fingerprint",
        BootloaderState::Error => "error",
    }
}
