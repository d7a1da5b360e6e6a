//! RequestDownload (0x34), TransferData (0x36), RequestTransferExit (0x37).
//!
//! These builders return raw UDS content bytes (SID onward, no ISO-TP PCI);
//! the ISO-TP segmenter decides single-frame vs. first-frame/consecutive-frame
//! framing based on the resulting length.

use crate::config::ByteOrder;

use super::sid;

const ADDRESS_AND_LENGTH_FORMAT: u8 = 0x44;
const DATA_FORMAT_IDENTIFIER: u8 = 0x00;

/// Build the RequestDownload content: `34 00 44 <addr[4]BE> <size[4]>`.
/// Address is always big-endian; the length field honors `byte_order`
/// since some ECUs expect it little-endian despite the address staying big.
pub fn build_request_download(address: u32, size: u32, byte_order: ByteOrder) -> Vec<u8> {
    let mut out = Vec::with_capacity(11);
    out.push(sid::RequestDownload);
    out.push(DATA_FORMAT_IDENTIFIER);
    out.push(ADDRESS_AND_LENGTH_FORMAT);
    out.extend_from_slice(&address.to_be_bytes());
    match byte_order {
        ByteOrder::Big => out.extend_from_slice(&size.to_be_bytes()),
        ByteOrder::Little => out.extend_from_slice(&size.to_le_bytes()),
    }
    out
}

pub fn verify_download_accepted(payload: &[u8]) -> bool {
    !payload.is_empty()
}

/// Build one TransferData content block: `36 <seq-id> <data...>`.
pub fn build_transfer_data(sequence_id: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + data.len());
    out.push(sid::TransferData);
    out.push(sequence_id);
    out.extend_from_slice(data);
    out
}

pub fn verify_transfer_ack(payload: &[u8], sequence_id: u8) -> bool {
    payload.first() == Some(&sequence_id)
}

/// `01 37` — request transfer exit.
pub fn build_request_transfer_exit() -> [u8; 1] {
    [sid::RequestTransferExit]
}

pub fn verify_transfer_exit_accepted(_payload: &[u8]) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_request_download_big_endian_length() {
        let content = build_request_download(0x0001_0000, 0x0000_1234, ByteOrder::Big);
        assert_eq!(
            content,
            vec![0x34, 0x00, 0x44, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x12, 0x34]
        );
    }

    #[test]
    fn builds_request_download_little_endian_length() {
        let content = build_request_download(0x0001_0000, 0x0000_1234, ByteOrder::Little);
        assert_eq!(
            content,
            vec![0x34, 0x00, 0x44, 0x00, 0x01, 0x00, 0x00, 0x34, 0x12, 0x00, 0x00]
        );
    }

    #[test]
    fn builds_transfer_data_block() {
        let content = build_transfer_data(0x01, &[0x00, 0x01, 0x02, 0x03]);
        assert_eq!(content, vec![0x36, 0x01, 0x00, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn verifies_transfer_ack_sequence() {
        assert!(verify_transfer_ack(&[0x01], 0x01));
        assert!(!verify_transfer_ack(&[0x02], 0x01));
    }
}
