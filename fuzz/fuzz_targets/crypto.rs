//! Fuzz target for cryptographic operations
//!
//! Sealed fields and the body keystream must handle arbitrary input.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sfup_crypto::aead::seal_with_nonce;
use sfup_crypto::{FieldNonce, StreamCipher, StreamIv, TicketKey, open_field};

#[derive(Debug, Arbitrary)]
struct CryptoInput {
    key: [u8; 16],
    nonce: [u8; 12],
    iv: [u8; 16],
    plaintext: Vec<u8>,
    split: usize,
}

fuzz_target!(|input: CryptoInput| {
    let key = TicketKey::new(input.key);
    let nonce = FieldNonce::from_bytes(input.nonce);

    // Sealing then opening with the same key must round-trip
    if let Ok(sealed) = seal_with_nonce(&key, &nonce, &input.plaintext) {
        let opened = open_field(&key, &nonce, &sealed).expect("own ciphertext opens");
        assert_eq!(opened, input.plaintext);
    }

    // Opening arbitrary bytes must fail cleanly, never panic
    let _ = open_field(&key, &nonce, &input.plaintext);

    // Keystream output must not depend on how the body was split
    let iv = StreamIv::from_bytes(input.iv);
    let mut whole = input.plaintext.clone();
    StreamCipher::encryptor(&key, &iv).apply_keystream(&mut whole);

    let mut pieces = input.plaintext.clone();
    let split = if pieces.is_empty() { 0 } else { input.split % pieces.len() };
    let (head, tail) = pieces.split_at_mut(split);
    let mut cipher = StreamCipher::encryptor(&key, &iv);
    cipher.apply_keystream(head);
    cipher.apply_keystream(tail);
    assert_eq!(whole, pieces);
});
