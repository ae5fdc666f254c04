//! HKDF-SHA-512 (RFC 5869), restricted per spec.md §4.2 to `L <= HashLen`:
//! every HAP key-derivation call asks for at most 32 bytes of output key
//! material, so `expand` never needs more than the single `T(1)` block.

use super::hmac::hmac_sha512;
use crate::error::CryptoError;

pub const MAX_OKM_LEN: usize = 64;

/// `extract(salt, ikm) -> PRK`.
pub fn extract(salt: &[u8], ikm: &[u8]) -> [u8; 64] {
    hmac_sha512(salt, &[ikm])
}

/// `expand(prk, info, L) -> OKM`, `L <= 64`.
pub fn expand(prk: &[u8], info: &[u8], len: usize) -> core::result::Result<[u8; MAX_OKM_LEN], CryptoError> {
    if len > MAX_OKM_LEN {
        return Err(CryptoError::InvalidKeyLength);
    }
    let t1 = hmac_sha512(prk, &[info, &[0x01]]);
    let mut out = [0u8; MAX_OKM_LEN];
    out[..len].copy_from_slice(&t1[..len]);
    Ok(out)
}

/// `extract` then `expand` in one call — the shape every pairing-engine
/// key derivation actually uses (`HKDF(ikm, salt, info)`).
pub fn derive(ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> core::result::Result<[u8; MAX_OKM_LEN], CryptoError> {
    let prk = extract(salt, ikm);
    expand(&prk, info, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> std::string::String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn unhex(s: &str) -> std::vec::Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn rfc5869_case1_basic_truncated_to_42() {
        // RFC 5869 test case 1 is defined for SHA-256; we use it only to
        // exercise extract/expand plumbing with the SHA-512 PRK length,
        // checking internal consistency rather than a cross-hash vector.
        let ikm = unhex("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b");
        let salt = unhex("000102030405060708090a0b0c");
        let info = unhex("f0f1f2f3f4f5f6f7f8f9");

        let prk = extract(&salt, &ikm);
        let okm_a = expand(&prk, &info, 32).unwrap();
        let okm_b = expand(&prk, &info, 32).unwrap();
        assert_eq!(okm_a, okm_b);
        assert_eq!(hex(&okm_a[..32]).len(), 64);
    }

    #[test]
    fn derive_matches_manual_extract_expand() {
        let ikm = b"shared-secret-material";
        let salt = b"Pair-Setup-Encrypt-Salt";
        let info = b"Pair-Setup-Encrypt-Info";

        let combined = derive(ikm, salt, info, 32).unwrap();
        let prk = extract(salt, ikm);
        let manual = expand(&prk, info, 32).unwrap();
        assert_eq!(combined, manual);
    }

    #[test]
    fn rejects_length_beyond_hash_size() {
        assert!(expand(&[0u8; 64], b"info", 65).is_err());
    }
}
