//! Configuration surface: transfer byte order, identifier templates, and
//! the CAN channel parameters an operator sets before flashing.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaudRate {
    B125k,
    B250k,
    B500k,
    B1000k,
}

impl BaudRate {
    pub fn bits_per_second(self) -> u32 {
        match self {
            BaudRate::B125k => 125_000,
            BaudRate::B250k => 250_000,
            BaudRate::B500k => 500_000,
            BaudRate::B1000k => 1_000_000,
        }
    }
}

/// TX or RX identifier template: priority and PGN are fixed by the bus
/// convention, source addresses are filled in at runtime from the
/// configured tester/device addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierTemplate {
    pub priority: u8,
    pub pgn: u32,
}

impl Default for IdentifierTemplate {
    fn default() -> Self {
        // Default UDS diagnostic request/response PGN (0xDA00) at priority 6,
        // matching the convention used by the reference bootloader tool.
        Self {
            priority: 6,
            pgn: 0xDA00,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub transfer_byte_order: ByteOrder,
    pub source_address: Option<u8>,
    pub tester_address: u8,
    pub can_channel: u8,
    pub baud_rate: BaudRate,
    pub terminator: bool,
    pub tx: IdentifierTemplate,
    pub rx: IdentifierTemplate,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transfer_byte_order: ByteOrder::Big,
            source_address: None,
            tester_address: 0xF9,
            can_channel: 1,
            baud_rate: BaudRate::B500k,
            terminator: true,
            tx: IdentifierTemplate::default(),
            rx: IdentifierTemplate::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(1..=4).contains(&self.can_channel) {
            return Err(EngineError::Precondition(format!(
                "can_channel {} out of range 1..=4",
                self.can_channel
            )));
        }
        Ok(())
    }

    /// TX identifier for the currently configured device source address.
    pub fn tx_identifier(&self) -> Result<u32, EngineError> {
        let device = self
            .source_address
            .ok_or_else(|| EngineError::Precondition("no device source address configured".into()))?;
        Ok(crate::j1939::encode(
            self.tx.priority,
            self.tx.pgn,
            self.tester_address,
            device,
        ))
    }

    /// RX identifier to listen for responses from the configured device.
    pub fn rx_identifier(&self) -> Result<u32, EngineError> {
        let device = self
            .source_address
            .ok_or_else(|| EngineError::Precondition("no device source address configured".into()))?;
        Ok(crate::j1939::encode(
            self.rx.priority,
            self.rx.pgn,
            device,
            self.tester_address,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_bus_convention() {
        let cfg = Config::default();
        assert_eq!(cfg.tester_address, 0xF9);
        assert_eq!(cfg.tx.pgn, 0xDA00);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_channel() {
        let mut cfg = Config::default();
        cfg.can_channel = 5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn tx_identifier_requires_source_address() {
        let cfg = Config::default();
        assert!(cfg.tx_identifier().is_err());
    }
}
