use thiserror::Error;

/// Taxonomy of everything that can go wrong while driving the bootloader.
///
/// `Precondition` and `Encoding` never move the engine out of its current
/// state; every other variant is fatal to an in-progress flash and drives
/// the state machine to `ERROR`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("precondition not met: {0}")]
    Precondition(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("negative response 0x{nrc:02X} ({description}) to SID 0x{sid:02X}")]
    NegativeResponse {
        sid: u8,
        nrc: u8,
        description: &'static str,
    },

    #[error("timeout waiting for {phase}")]
    Timeout { phase: &'static str },

    #[error("transport error: {0}")]
    Transport(String),
}

impl EngineError {
    /// Whether this error is fatal to an in-progress flash (drives the
    /// state machine to `ERROR`) as opposed to a local, state-preserving
    /// failure.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EngineError::Precondition(_) | EngineError::Encoding(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
