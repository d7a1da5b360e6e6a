//! SocketCAN adapter: the concrete `CanPort` this daemon wires into the
//! engine. Opens the interface, owns a dedicated recv thread, and forwards
//! frames into an async channel so the engine never blocks on a socket
//! read.

use std::thread;

use anyhow::{Context, Result};
use socketcan::{CanDataFrame, CanFrame, CanSocket, ExtendedId, Frame as EmbeddedFrame, Id, Socket};
use tokio::sync::mpsc;
use tracing::{info, warn};

use uds_bootloader_engine::port::{CanPort, Frame};
use uds_bootloader_engine::EngineError;

/// Owns the write half of a SocketCAN interface; `spawn_recv_loop` opens a
/// second socket on the same interface for the blocking read side, since
/// SocketCAN sockets are single-direction-friendly but not cheaply shared
/// between a sync thread and the async send path.
pub struct SocketCanPort {
    socket: CanSocket,
    iface: String,
}

impl SocketCanPort {
    pub fn open(iface: &str) -> Result<Self> {
        info!(iface, "opening SocketCAN interface");
        let socket = CanSocket::open(iface)
            .with_context(|| format!("failed to open SocketCAN interface {iface}"))?;
        Ok(Self {
            socket,
            iface: iface.to_string(),
        })
    }

    /// Spawn the blocking recv loop on its own thread and socket. Received
    /// frames are pushed onto `rx_tx`; the caller drives them into the
    /// engine on the async side.
    pub fn spawn_recv_loop(&self, rx_tx: mpsc::UnboundedSender<Frame>) -> Result<()> {
        let socket = CanSocket::open(&self.iface)
            .with_context(|| format!("failed to open SocketCAN read socket for {}", self.iface))?;
        let iface = self.iface.clone();

        thread::spawn(move || loop {
            match socket.read_frame() {
                Ok(CanFrame::Data(data_frame)) => {
                    let id = match data_frame.id() {
                        Id::Extended(ext) => ext.as_raw(),
                        Id::Standard(std_id) => std_id.as_raw() as u32,
                    };
                    let frame = Frame::new(id, data_frame.data());
                    if rx_tx.send(frame).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(iface, error = %e, "SocketCAN read error, stopping recv loop");
                    break;
                }
            }
        });
        Ok(())
    }
}

impl CanPort for SocketCanPort {
    fn send(&mut self, frame: Frame) -> Result<(), EngineError> {
        let id = ExtendedId::new(frame.id)
            .ok_or_else(|| EngineError::Encoding(format!("invalid 29-bit id {:#x}", frame.id)))?;
        let payload = &frame.data[..frame.dlc as usize];
        let can_frame = CanDataFrame::new(id, payload)
            .ok_or_else(|| EngineError::Encoding("failed to build CAN data frame".into()))?;
        self.socket
            .write_frame(&CanFrame::Data(can_frame))
            .map_err(|e| EngineError::Transport(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        true
    }
}
