//! UDS-over-J1939 bootloader protocol engine.
//!
//! This crate drives an ECU reflash end-to-end: J1939 identifier codec,
//! ISO-TP segmentation, UDS service encoders, and the bootloader state
//! machine that sequences them. It owns no CAN hardware itself — a
//! [`port::CanPort`] is injected by the caller (the `daemon` binary wires
//! up a concrete SocketCAN adapter; tests use [`port::MockCanPort`]).

pub mod config;
pub mod error;
pub mod events;
pub mod firmware;
pub mod isotp;
pub mod j1939;
pub mod observer;
pub mod port;
pub mod state_machine;
pub mod uds;

pub use config::{ByteOrder, Config};
pub use error::{EngineError, EngineResult};
pub use events::{EngineEvent, EventSink, Severity, SharedRecordingSink};
pub use firmware::FirmwareImage;
pub use port::{CanPort, Frame, MockCanPort, SharedMockCanPort};
pub use state_machine::{BootloaderState, Engine, Identifiers};
pub use uds::security::{DefaultSecurityHook, SecurityHook};
