//! UDS (ISO 14229) service identifiers, NRC table, and per-service
//! encoder/verifier pairs.

pub mod data;
pub mod reset;
pub mod routine;
pub mod security;
pub mod session;
pub mod transfer;

/// Service identifiers used by this engine.
#[allow(non_upper_case_globals)]
pub mod sid {
    pub const DiagnosticSessionControl: u8 = 0x10;
    pub const EcuReset: u8 = 0x11;
    pub const SecurityAccess: u8 = 0x27;
    pub const WriteDataByIdentifier: u8 = 0x2E;
    pub const RoutineControl: u8 = 0x31;
    pub const ReadDataByIdentifier: u8 = 0x22;
    pub const RequestDownload: u8 = 0x34;
    pub const TransferData: u8 = 0x36;
    pub const RequestTransferExit: u8 = 0x37;

    pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
}

/// Negative response codes (ISO 14229 Table A.1, subset relevant here).
pub mod nrc {
    pub const GENERAL_REJECT: u8 = 0x10;
    pub const SERVICE_NOT_SUPPORTED: u8 = 0x11;
    pub const SUB_FUNCTION_NOT_SUPPORTED: u8 = 0x12;
    pub const INCORRECT_MESSAGE_LENGTH: u8 = 0x13;
    pub const CONDITIONS_NOT_CORRECT: u8 = 0x22;
    pub const REQUEST_SEQUENCE_ERROR: u8 = 0x24;
    pub const REQUEST_OUT_OF_RANGE: u8 = 0x31;
    pub const SECURITY_ACCESS_DENIED: u8 = 0x33;
    pub const INVALID_KEY: u8 = 0x35;
    pub const EXCEED_NUMBER_OF_ATTEMPTS: u8 = 0x36;
    pub const REQUIRED_TIME_DELAY_NOT_EXPIRED: u8 = 0x37;
    pub const UPLOAD_DOWNLOAD_NOT_ACCEPTED: u8 = 0x70;
    pub const TRANSFER_DATA_SUSPENDED: u8 = 0x71;
    pub const GENERAL_PROGRAMMING_FAILURE: u8 = 0x72;
    pub const WRONG_BLOCK_SEQUENCE_COUNTER: u8 = 0x73;
    pub const REQUEST_CORRECTLY_RECEIVED_RESPONSE_PENDING: u8 = 0x78;
    pub const SERVICE_NOT_SUPPORTED_IN_ACTIVE_SESSION: u8 = 0x7F;

    /// Human-readable description for event payloads, falling back to a
    /// generic label for NRCs outside this table.
    pub fn description(code: u8) -> &'static str {
        match code {
            GENERAL_REJECT => "general reject",
            SERVICE_NOT_SUPPORTED => "service not supported",
            SUB_FUNCTION_NOT_SUPPORTED => "sub-function not supported",
            INCORRECT_MESSAGE_LENGTH => "incorrect message length or invalid format",
            CONDITIONS_NOT_CORRECT => "conditions not correct",
            REQUEST_SEQUENCE_ERROR => "request sequence error",
            REQUEST_OUT_OF_RANGE => "request out of range",
            SECURITY_ACCESS_DENIED => "security access denied",
            INVALID_KEY => "invalid key",
            EXCEED_NUMBER_OF_ATTEMPTS => "exceeded number of attempts",
            REQUIRED_TIME_DELAY_NOT_EXPIRED => "required time delay not expired",
            UPLOAD_DOWNLOAD_NOT_ACCEPTED => "upload/download not accepted",
            TRANSFER_DATA_SUSPENDED => "transfer data suspended",
            GENERAL_PROGRAMMING_FAILURE => "general programming failure",
            WRONG_BLOCK_SEQUENCE_COUNTER => "wrong block sequence counter",
            REQUEST_CORRECTLY_RECEIVED_RESPONSE_PENDING => "request correctly received, response pending",
            SERVICE_NOT_SUPPORTED_IN_ACTIVE_SESSION => "service not supported in active session",
            _ => "unknown negative response code",
        }
    }
}

/// Parsed UDS response: either positive (SID+0x40, payload) or negative
/// (request SID, NRC).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UdsResponse<'a> {
    Positive { sid: u8, payload: &'a [u8] },
    Negative { request_sid: u8, nrc: u8 },
}

/// Parse a reassembled UDS response payload (post-ISO-TP, PCI already
/// stripped). Returns `None` if the payload is too short to contain a SID.
pub fn parse_response(payload: &[u8]) -> Option<UdsResponse<'_>> {
    if payload.is_empty() {
        return None;
    }
    if payload[0] == sid::NEGATIVE_RESPONSE {
        if payload.len() < 3 {
            return None;
        }
        return Some(UdsResponse::Negative {
            request_sid: payload[1],
            nrc: payload[2],
        });
    }
    Some(UdsResponse::Positive {
        sid: payload[0],
        payload: &payload[1..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positive_response() {
        let resp = parse_response(&[0x50, 0x02]).unwrap();
        assert_eq!(resp, UdsResponse::Positive { sid: 0x50, payload: &[0x02] });
    }

    #[test]
    fn parses_negative_response() {
        let resp = parse_response(&[0x7F, 0x27, 0x78]).unwrap();
        assert_eq!(resp, UdsResponse::Negative { request_sid: 0x27, nrc: 0x78 });
    }

    #[test]
    fn nrc_description_known_and_unknown() {
        assert_eq!(nrc::description(0x78), "request correctly received, response pending");
        assert_eq!(nrc::description(0x00), "unknown negative response code");
    }
}
