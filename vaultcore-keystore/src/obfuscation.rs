//! Reversible byte scrambling for the store payload.
//!
//! Each byte is XORed with a repeating 16-byte key and then shifted by a
//! position-dependent amount, `(i % 11) + (i % 7) + (i % 5)`, modulo 256.
//!
//! This is NOT a security control. It only keeps the record from being
//! readable with `strings` or a hex viewer; confidentiality and integrity
//! come from the checksum, HMAC and canaries.

pub const OBFUSCATION_KEY_BYTES: usize = 16;

/// Fixed key shared by every implementation reading the same data directory.
pub const DEFAULT_OBFUSCATION_KEY: [u8; OBFUSCATION_KEY_BYTES] = [
    0x5a, 0x3c, 0x96, 0xe1, 0x27, 0xb8, 0x4d, 0x0f, 0xc3, 0x71, 0x9e, 0x62, 0xd5, 0x18, 0xaf, 0x84,
];

#[derive(Clone, Debug)]
pub struct Obfuscator {
    key: [u8; OBFUSCATION_KEY_BYTES],
}

impl Obfuscator {
    pub fn new(key: [u8; OBFUSCATION_KEY_BYTES]) -> Self {
        Self { key }
    }

    pub fn obfuscate(&self, data: &[u8]) -> Vec<u8> {
        data.iter()
            .enumerate()
            .map(|(i, &b)| (b ^ self.key[i % OBFUSCATION_KEY_BYTES]).wrapping_add(shift(i)))
            .collect()
    }

    pub fn deobfuscate(&self, data: &[u8]) -> Vec<u8> {
        data.iter()
            .enumerate()
            .map(|(i, &b)| b.wrapping_sub(shift(i)) ^ self.key[i % OBFUSCATION_KEY_BYTES])
            .collect()
    }
}

impl Default for Obfuscator {
    fn default() -> Self {
        Self::new(DEFAULT_OBFUSCATION_KEY)
    }
}

#[inline]
fn shift(i: usize) -> u8 {
    // max 10 + 6 + 4 = 20
    ((i % 11) + (i % 7) + (i % 5)) as u8
}
