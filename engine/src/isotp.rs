//! ISO-TP (ISO 15765-2) segmentation and reassembly over 8-byte CAN frames.

use crate::error::EngineError;
use crate::port::Frame;

pub const MAX_FIRST_FRAME_LENGTH: usize = 0x0FFF;
pub const N_CR_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    ContinueToSend,
    Wait,
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    Single { data: Vec<u8> },
    First { total_length: u16, data: Vec<u8> },
    Consecutive { sequence_number: u8, data: Vec<u8> },
    FlowControl { status: FlowStatus, block_size: u8, st_min: u8 },
}

/// Decode the PCI nibble and payload of a raw 8-byte CAN frame.
pub fn decode_frame(data: &[u8]) -> Result<DecodedFrame, EngineError> {
    if data.is_empty() {
        return Err(EngineError::Protocol("empty ISO-TP frame".into()));
    }
    let pci_type = data[0] >> 4;
    match pci_type {
        0x0 => {
            let len = (data[0] & 0x0F) as usize;
            if len == 0 || len > data.len().saturating_sub(1) {
                return Err(EngineError::Protocol(format!("invalid SF length {len}")));
            }
            Ok(DecodedFrame::Single {
                data: data[1..1 + len].to_vec(),
            })
        }
        0x1 => {
            if data.len() < 2 {
                return Err(EngineError::Protocol("truncated FF".into()));
            }
            let total_length = (((data[0] & 0x0F) as u16) << 8) | data[1] as u16;
            Ok(DecodedFrame::First {
                total_length,
                data: data[2..].to_vec(),
            })
        }
        0x2 => {
            let sequence_number = data[0] & 0x0F;
            Ok(DecodedFrame::Consecutive {
                sequence_number,
                data: data[1..].to_vec(),
            })
        }
        0x3 => {
            if data.len() < 3 {
                return Err(EngineError::Protocol("truncated FC".into()));
            }
            let status = match data[0] & 0x0F {
                0 => FlowStatus::ContinueToSend,
                1 => FlowStatus::Wait,
                2 => FlowStatus::Overflow,
                other => {
                    return Err(EngineError::Protocol(format!("invalid flow status {other}")))
                }
            };
            Ok(DecodedFrame::FlowControl {
                status,
                block_size: data[1],
                st_min: data[2],
            })
        }
        other => Err(EngineError::Protocol(format!("unknown PCI type {other}"))),
    }
}

/// Build a single-frame CAN frame. `data.len()` must be in `1..=7`.
pub fn encode_single(id: u32, data: &[u8]) -> Frame {
    debug_assert!(!data.is_empty() && data.len() <= 7);
    let mut content = Vec::with_capacity(1 + data.len());
    content.push(data.len() as u8);
    content.extend_from_slice(data);
    Frame::new(id, &content)
}

/// Build a first frame. `first6.len()` must be `6`.
pub fn encode_first(id: u32, total_length: u16, first6: &[u8]) -> Frame {
    debug_assert_eq!(first6.len(), 6);
    let mut content = Vec::with_capacity(8);
    content.push(0x10 | ((total_length >> 8) as u8 & 0x0F));
    content.push((total_length & 0xFF) as u8);
    content.extend_from_slice(first6);
    Frame::new(id, &content)
}

/// Build a consecutive frame. `sn` is taken mod 16. `data.len()` must be `<=7`.
pub fn encode_consecutive(id: u32, sn: u8, data: &[u8]) -> Frame {
    debug_assert!(data.len() <= 7);
    let mut content = Vec::with_capacity(1 + data.len());
    content.push(0x20 | (sn & 0x0F));
    content.extend_from_slice(data);
    Frame::new(id, &content)
}

/// Build a flow control frame.
pub fn encode_flow_control(id: u32, status: FlowStatus, block_size: u8, st_min: u8) -> Frame {
    let fs = match status {
        FlowStatus::ContinueToSend => 0,
        FlowStatus::Wait => 1,
        FlowStatus::Overflow => 2,
    };
    Frame::new(id, &[0x30 | fs, block_size, st_min])
}

/// Interpret an ISO-TP STmin byte as a `Duration`.
/// `0x00..=0x7F` is milliseconds, `0xF1..=0xF9` is 100-900 microseconds,
/// any other value is reserved and treated as zero delay.
pub fn st_min_duration(st_min: u8) -> std::time::Duration {
    match st_min {
        0x00..=0x7F => std::time::Duration::from_millis(st_min as u64),
        0xF1..=0xF9 => std::time::Duration::from_micros(100 * (st_min - 0xF0) as u64),
        _ => std::time::Duration::from_millis(0),
    }
}

/// Split `payload` into the frames needed to transmit it: either a single
/// `Single` frame, or a `First` frame plus the full list of `Consecutive`
/// frames (sequence numbers cycling `1..=15, 0, 1, ...`), ignoring block
/// size — callers pace delivery of the consecutive frames themselves using
/// [`ConsecutiveFrames`].
pub fn plan_transmission(id: u32, payload: &[u8]) -> Result<TransmitPlan, EngineError> {
    if payload.is_empty() {
        return Err(EngineError::Encoding("empty ISO-TP payload".into()));
    }
    if payload.len() <= 7 {
        return Ok(TransmitPlan::Single(encode_single(id, payload)));
    }
    if payload.len() > MAX_FIRST_FRAME_LENGTH {
        return Err(EngineError::Encoding(format!(
            "payload of {} bytes exceeds max ISO-TP first-frame length {}",
            payload.len(),
            MAX_FIRST_FRAME_LENGTH
        )));
    }
    let first = encode_first(id, payload.len() as u16, &payload[..6]);
    let remainder = &payload[6..];
    let mut consecutive = Vec::new();
    let mut sn: u8 = 1;
    for chunk in remainder.chunks(7) {
        consecutive.push(encode_consecutive(id, sn, chunk));
        sn = if sn == 15 { 0 } else { sn + 1 };
    }
    Ok(TransmitPlan::Multi { first, consecutive })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmitPlan {
    Single(Frame),
    Multi { first: Frame, consecutive: Vec<Frame> },
}

/// Accumulates an incoming multi-frame message from FF + CFs.
#[derive(Debug)]
pub struct Reassembler {
    total_length: usize,
    buffer: Vec<u8>,
    expected_sn: u8,
}

impl Reassembler {
    pub fn start(total_length: u16, first_chunk: &[u8]) -> Self {
        let mut buffer = Vec::with_capacity(total_length as usize);
        buffer.extend_from_slice(first_chunk);
        Self {
            total_length: total_length as usize,
            buffer,
            expected_sn: 1,
        }
    }

    /// Feed a consecutive frame. Returns `Ok(Some(payload))` once complete,
    /// `Ok(None)` if more frames are still expected.
    pub fn feed_consecutive(
        &mut self,
        sequence_number: u8,
        data: &[u8],
    ) -> Result<Option<Vec<u8>>, EngineError> {
        if sequence_number != self.expected_sn {
            return Err(EngineError::Protocol(format!(
                "ISO-TP sequence error: expected {}, got {}",
                self.expected_sn, sequence_number
            )));
        }
        let remaining = self.total_length - self.buffer.len();
        let take = remaining.min(data.len());
        self.buffer.extend_from_slice(&data[..take]);
        self.expected_sn = if self.expected_sn == 15 { 0 } else { self.expected_sn + 1 };
        if self.buffer.len() >= self.total_length {
            Ok(Some(std::mem::take(&mut self.buffer)))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_frame_roundtrip() {
        let frame = encode_single(0x123, &[0x02, 0x10, 0x02]);
        assert_eq!(frame.data, [0x03, 0x02, 0x10, 0x02, 0xFF, 0xFF, 0xFF, 0xFF]);
        let decoded = decode_frame(&frame.data).unwrap();
        assert_eq!(decoded, DecodedFrame::Single { data: vec![0x02, 0x10, 0x02] });
    }

    #[test]
    fn plan_small_payload_is_single_frame() {
        let plan = plan_transmission(0x1, &[0x10, 0x02]).unwrap();
        assert!(matches!(plan, TransmitPlan::Single(_)));
    }

    #[test]
    fn plan_16_byte_transfer_block_matches_scenario() {
        // 36 01 + 16 bytes of firmware = 18 content bytes total.
        let mut content = vec![0x36, 0x01];
        content.extend(0x00u8..=0x0F);
        let plan = plan_transmission(0x1, &content).unwrap();
        match plan {
            TransmitPlan::Multi { first, consecutive } => {
                assert_eq!(
                    first.data,
                    [0x10, 0x12, 0x36, 0x01, 0x00, 0x01, 0x02, 0x03]
                );
                assert_eq!(consecutive.len(), 2);
                assert_eq!(
                    consecutive[0].data,
                    [0x21, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A]
                );
                assert_eq!(
                    consecutive[1].data,
                    [0x22, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0xFF, 0xFF]
                );
            }
            _ => panic!("expected multi-frame plan"),
        }
    }

    #[test]
    fn reassembles_first_and_consecutive_frames() {
        let mut reasm = Reassembler::start(18, &[0x36, 0x01, 0x00, 0x01, 0x02, 0x03]);
        assert_eq!(
            reasm.feed_consecutive(1, &[0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A]).unwrap(),
            None
        );
        let complete = reasm.feed_consecutive(2, &[0x0B, 0x0C, 0x0D, 0x0E, 0x0F]).unwrap();
        assert_eq!(
            complete,
            Some(vec![
                0x36, 0x01, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A,
                0x0B, 0x0C, 0x0D, 0x0E, 0x0F
            ])
        );
    }

    #[test]
    fn reassembler_rejects_out_of_order_sequence() {
        let mut reasm = Reassembler::start(18, &[0x36, 0x01, 0x00, 0x01, 0x02, 0x03]);
        assert!(reasm.feed_consecutive(2, &[0x00; 7]).is_err());
    }

    #[test]
    fn st_min_interprets_ms_and_us_ranges() {
        assert_eq!(st_min_duration(0x0A), std::time::Duration::from_millis(10));
        assert_eq!(st_min_duration(0xF3), std::time::Duration::from_micros(300));
        assert_eq!(st_min_duration(0xFA), std::time::Duration::from_millis(0));
    }
}
