//! Payload Extractor and Payload Decryptor.
//!
//! Extraction is trivial once the Decoder Locator has bound a payload field: the
//! field's `initial_bytes` already is the owned copy this module mutates in place.
//! Decryption is a stateless, index-keyed stream XOR; it is total, infallible, and an
//! involution, so callers must take care never to apply it twice.

use deobfstr_config::PipelineConfig;

use crate::decoder::DecoderLocation;

/// Acquires a mutable owned copy of the payload blob bound by the Decoder Locator.
/// The original metadata blob is left untouched; only this owned copy is mutated by
/// [`decrypt_in_place`].
pub fn extract(location: &DecoderLocation) -> Vec<u8> {
    location.raw_payload.clone()
}

/// Inverts the stream cipher over `payload` in place.
///
/// `payload[i] ^= (i % config.cipher_index_modulus) ^ config.cipher_key_byte`
///
/// Applying this function twice to the same buffer restores the original bytes
/// (`decrypt(decrypt(x)) == x`), which is also how idempotence under re-application
/// falls out: re-running the pipeline on already-patched
/// output decrypts the same payload the same way, it just finds no more matching
/// call sites to rewrite.
pub fn decrypt_in_place(payload: &mut [u8], config: &PipelineConfig) {
    for (i, byte) in payload.iter_mut().enumerate() {
        let index_term = (i as u32 % config.cipher_index_modulus) as u8;
        *byte ^= index_term ^ config.cipher_key_byte;
    }
}
