//! SecurityAccess (0x27): request seed / send key.

use super::sid;

pub mod sub {
    pub const REQUEST_SEED: u8 = 0x01;
    pub const SEND_KEY: u8 = 0x02;
}

/// `02 27 01` — request seed.
pub fn build_request_seed() -> [u8; 2] {
    [sid::SecurityAccess, sub::REQUEST_SEED]
}

/// `06 27 02 <k0..k3>` — send computed key.
pub fn build_send_key(key: [u8; 4]) -> [u8; 6] {
    [
        sid::SecurityAccess,
        sub::SEND_KEY,
        key[0],
        key[1],
        key[2],
        key[3],
    ]
}

pub fn verify_seed_response(payload: &[u8]) -> bool {
    payload.first() == Some(&sub::REQUEST_SEED)
}

pub fn verify_key_accepted(payload: &[u8]) -> bool {
    payload.first() == Some(&sub::SEND_KEY)
}

/// Extract the seed bytes (everything after the sub-function byte).
pub fn seed_bytes(payload: &[u8]) -> &[u8] {
    payload.get(1..).unwrap_or(&[])
}

/// Default key-computation hook: a placeholder XOR-with-0xFF transform.
/// Real ECUs require vendor-specific algorithms; callers inject their own
/// `SecurityHook` implementation instead of relying on this default.
pub fn default_compute_key(seed: &[u8]) -> [u8; 4] {
    let mut key = [0u8; 4];
    for (i, slot) in key.iter_mut().enumerate() {
        *slot = seed.get(i).copied().unwrap_or(0) ^ 0xFF;
    }
    key
}

/// Pluggable seed-to-key algorithm. The engine stays agnostic to the
/// actual security algorithm; this hook is the seam.
pub trait SecurityHook: Send {
    fn compute_key(&mut self, seed: &[u8]) -> [u8; 4];
}

/// `SecurityHook` backed by [`default_compute_key`].
#[derive(Default)]
pub struct DefaultSecurityHook;

impl SecurityHook for DefaultSecurityHook {
    fn compute_key(&mut self, seed: &[u8]) -> [u8; 4] {
        default_compute_key(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_seed_request() {
        assert_eq!(build_request_seed(), [0x27, 0x01]);
    }

    #[test]
    fn builds_send_key_frame() {
        assert_eq!(build_send_key([0xDE, 0xAD, 0xBE, 0xEF]), [0x27, 0x02, 0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn default_hook_is_deterministic() {
        let mut hook = DefaultSecurityHook;
        assert_eq!(hook.compute_key(&[0x01, 0x02, 0x03, 0x04]), [0xFE, 0xFD, 0xFC, 0xFB]);
    }
}
