//! ChaCha20-Poly1305 AEAD (RFC 7539 §2.8), per spec.md §4.2: derive the
//! one-time Poly1305 key from block 0, encrypt from block 1, then MAC
//! `AAD ∥ pad ∥ ciphertext ∥ pad ∥ le64(|AAD|) ∥ le64(|C|)`.

use super::chacha20;
use super::poly1305::{self, TAG_LEN};

pub const TAG_LEN_BYTES: usize = TAG_LEN;
const MAX_AEAD_LEN: usize = 2048;

fn poly_key(key: &[u8; 32], nonce: &[u8; 12]) -> [u8; 32] {
    let block0 = chacha20::block(key, nonce, 0);
    let mut k = [0u8; 32];
    k.copy_from_slice(&block0[..32]);
    k
}

fn mac_input(aad: &[u8], ciphertext: &[u8], buf: &mut [u8; MAX_AEAD_LEN * 2 + 32]) -> usize {
    let mut n = 0;
    buf[n..n + aad.len()].copy_from_slice(aad);
    n += aad.len();
    let aad_pad = (16 - (aad.len() % 16)) % 16;
    n += aad_pad;

    buf[n..n + ciphertext.len()].copy_from_slice(ciphertext);
    n += ciphertext.len();
    let ct_pad = (16 - (ciphertext.len() % 16)) % 16;
    n += ct_pad;

    buf[n..n + 8].copy_from_slice(&(aad.len() as u64).to_le_bytes());
    n += 8;
    buf[n..n + 8].copy_from_slice(&(ciphertext.len() as u64).to_le_bytes());
    n += 8;
    n
}

/// Encrypt `plaintext` in place and return the 16-byte tag.
///
/// Callers (Pair-Setup/Verify sub-TLV encryption, BLE/IP session framing)
/// never exceed a few hundred bytes per call; `MAX_AEAD_LEN` bounds the
/// scratch buffer used to build the Poly1305 input without a heap.
pub fn seal(key: &[u8; 32], nonce: &[u8; 12], aad: &[u8], plaintext: &mut [u8]) -> [u8; TAG_LEN] {
    debug_assert!(plaintext.len() <= MAX_AEAD_LEN && aad.len() <= MAX_AEAD_LEN);
    chacha20::apply_keystream(key, nonce, 1, plaintext);

    let pkey = poly_key(key, nonce);
    let mut scratch = [0u8; MAX_AEAD_LEN * 2 + 32];
    let n = mac_input(aad, plaintext, &mut scratch);
    poly1305::mac(&pkey, &scratch[..n])
}

/// Decrypt `ciphertext` in place. Returns `true` and leaves the plaintext
/// in `ciphertext` iff the tag verifies; on failure the buffer is left
/// decrypted-but-unauthenticated and callers MUST discard it (spec.md §7:
/// "AEAD tag mismatch is fatal to the pairing exchange but not to the
/// connection").
pub fn open(key: &[u8; 32], nonce: &[u8; 12], aad: &[u8], ciphertext: &mut [u8], tag: &[u8; TAG_LEN]) -> bool {
    debug_assert!(ciphertext.len() <= MAX_AEAD_LEN && aad.len() <= MAX_AEAD_LEN);
    let pkey = poly_key(key, nonce);
    let mut scratch = [0u8; MAX_AEAD_LEN * 2 + 32];
    let n = mac_input(aad, ciphertext, &mut scratch);
    let ok = poly1305::verify(&pkey, &scratch[..n], tag);
    if ok {
        chacha20::apply_keystream(key, nonce, 1, ciphertext);
    }
    ok
}

/// Build the 96-bit nonce HAP uses everywhere: 4 zero bytes followed by an
/// 8-byte little-endian counter (pairing sub-TLV messages use fixed ASCII
/// counters like `"PS-Msg05"`; session framing uses a monotonic `seq`).
pub fn nonce_from_counter(counter: &[u8; 8]) -> [u8; 12] {
    let mut n = [0u8; 12];
    n[4..12].copy_from_slice(counter);
    n
}

pub fn nonce_from_seq(seq: u64) -> [u8; 12] {
    nonce_from_counter(&seq.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = [9u8; 32];
        let nonce = nonce_from_counter(b"PS-Msg05");
        let aad = b"";
        let mut pt = b"identifier+publickey+signature".to_vec();
        let original = pt.clone();

        let tag = seal(&key, &nonce, aad, &mut pt);
        assert_ne!(pt, original);

        let ok = open(&key, &nonce, aad, &mut pt, &tag);
        assert!(ok);
        assert_eq!(pt, original);
    }

    #[test]
    fn tampered_tag_is_rejected() {
        let key = [3u8; 32];
        let nonce = nonce_from_seq(42);
        let mut pt = b"hello world".to_vec();
        let mut tag = seal(&key, &nonce, b"aad", &mut pt);
        tag[0] ^= 0xff;
        assert!(!open(&key, &nonce, b"aad", &mut pt, &tag));
    }

    #[test]
    fn seq_nonces_differ_by_counter_only() {
        let a = nonce_from_seq(1);
        let b = nonce_from_seq(2);
        assert_ne!(a, b);
        assert_eq!(&a[..4], &[0, 0, 0, 0]);
    }
}
