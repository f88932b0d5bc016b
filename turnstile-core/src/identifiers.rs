use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// QR payload size in bytes (256 bits).
const QR_CODE_BYTES: usize = 32;

/// Source of human-readable order/ticket numbers and QR validation codes
pub trait CodeGenerator: Send + Sync {
    fn order_number(&self) -> String;
    fn ticket_number(&self) -> String;
    fn qr_code(&self) -> String;
}

/// Numbers are UUIDv7 (millisecond timestamp followed by 74 random bits)
/// rendered in Crockford base32, so they sort by creation time and stay
/// readable over the phone. QR codes come straight from the OS CSPRNG and
/// carry no time component.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureCodeGenerator;

impl CodeGenerator for SecureCodeGenerator {
    fn order_number(&self) -> String {
        format!("ORD-{}", encode_crockford(Uuid::now_v7().as_bytes()))
    }

    fn ticket_number(&self) -> String {
        format!("TKT-{}", encode_crockford(Uuid::now_v7().as_bytes()))
    }

    fn qr_code(&self) -> String {
        let mut bytes = [0u8; QR_CODE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        encode_crockford(&bytes)
    }
}

/// Crockford base32, most significant bits first; the last group is
/// zero-padded on the right.
pub fn encode_crockford(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer: u16 = 0;
    let mut bits: u8 = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | u16::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            let index = ((buffer >> bits) & 0x1f) as usize;
            out.push(CROCKFORD_ALPHABET[index] as char);
        }
    }
    if bits > 0 {
        let index = ((buffer << (5 - bits)) & 0x1f) as usize;
        out.push(CROCKFORD_ALPHABET[index] as char);
    }
    out
}
