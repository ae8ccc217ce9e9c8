#![no_main]

use libfuzzer_sys::fuzz_target;
use vaultcore::wire::{self, CipherType};

fuzz_target!(|data: &[u8]| {
    let _ = wire::peek_prefix(data);
    for cipher in CipherType::ALL {
        if let Ok(frame) = wire::decode_frame_as(data, cipher) {
            assert_eq!(frame.nonce.len(), cipher.nonce_len());
            assert_eq!(
                cipher.header_len() + frame.ciphertext.len(),
                data.len()
            );
        }
    }
});
