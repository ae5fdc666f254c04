//! Hand-rolled cryptographic primitives (spec.md §4.1-4.3). Nothing here
//! delegates to a RustCrypto crate: the whole point of a constrained-device
//! HAP runtime is to own the primitives down to the bignum engine, so every
//! submodule below implements its RFC from scratch over fixed-size arrays.

pub mod aead;
pub mod bignum;
pub mod chacha20;
pub mod curve25519;
pub mod ed25519;
pub mod field25519;
pub mod hkdf;
pub mod hmac;
pub mod poly1305;
pub mod sha512;
pub mod srp;
