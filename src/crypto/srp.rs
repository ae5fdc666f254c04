//! SRP-6a authenticated key exchange (spec.md §4.3), built directly on the
//! multi-precision engine with `g = 5` and the HAP 3072-bit `N`. The
//! password itself never has to be known by the accessory at verify time:
//! [`Verifier`] captures `x`/`v` once at setup-code provisioning, and
//! [`Host`] runs the accessory side of the exchange against a stored `v`.
//! [`User`] is the symmetric controller-side computation, kept here only
//! because it is exercised by the test suite below.

use heapless::Vec;

use super::bignum::{Modulus, Wide, G, K};
use super::sha512::{self, HASH_SIZE_BYTES};
use crate::error::CryptoError;

pub const SALT_LEN: usize = 16;
pub const MODULUS_BYTES: usize = K * 4;
pub const KEY_LEN: usize = HASH_SIZE_BYTES;
const MAX_IDENTITY_LEN: usize = 64;

type Result<T> = core::result::Result<T, CryptoError>;

fn pad_wide(x: &Wide<K>) -> [u8; MODULUS_BYTES] {
    let mut out = [0u8; MODULUS_BYTES];
    x.to_be_bytes(&mut out).expect("Wide<K> always fits MODULUS_BYTES");
    out
}

fn pad_g() -> [u8; MODULUS_BYTES] {
    let mut out = [0u8; MODULUS_BYTES];
    out[MODULUS_BYTES - 4..].copy_from_slice(&G.to_be_bytes());
    out
}

fn g_wide() -> Wide<K> {
    let mut g = Wide::<K>::ZERO;
    g.digits[0] = G;
    g
}

/// `x = H(s ∥ H(I ∥ ":" ∥ p))`.
pub fn compute_x(salt: &[u8; SALT_LEN], identity: &[u8], password: &[u8]) -> [u8; KEY_LEN] {
    let inner = sha512::digest(&[identity, b":", password]);
    sha512::digest(&[salt, &inner])
}

/// `k = H(N ∥ pad(g))`, the multiplier shared by host and user.
fn compute_k(modulus: &Modulus) -> Wide<K> {
    let n_bytes = pad_wide(modulus.n());
    let g_bytes = pad_g();
    let h = sha512::digest(&[&n_bytes, &g_bytes]);
    Wide::from_be_bytes(&h).expect("64-byte hash fits K digits")
}

/// `u = H(A ∥ B)`.
fn compute_u(a_pub: &Wide<K>, b_pub: &Wide<K>) -> Wide<K> {
    let h = sha512::digest(&[&pad_wide(a_pub), &pad_wide(b_pub)]);
    Wide::from_be_bytes(&h).expect("64-byte hash fits K digits")
}

/// `(a + u*x)` as a plain (non-modular) integer — SRP exponents are never
/// reduced, only the bases are. `u` and `x` are each a single SHA-512
/// output (≤512 bits) so the product fits comfortably within `Wide<K>`'s
/// 3072-bit width; the truncation in `mul_wide`'s low digits loses nothing.
fn combine_exponent(a: &Wide<K>, u: &Wide<K>, x: &Wide<K>) -> Wide<K> {
    let wide_product = super::bignum::mul_wide(u, x);
    let mut ux = Wide::<K>::ZERO;
    ux.digits.copy_from_slice(&wide_product.digits[..K]);
    let (sum, _carry) = a.add(&ux);
    sum
}

fn sub_mod(modulus: &Modulus, a: &Wide<K>, b: &Wide<K>) -> Wide<K> {
    let (diff, borrow) = a.sub(b);
    if borrow == 1 {
        let (wrapped, _) = diff.add(modulus.n());
        wrapped
    } else {
        diff
    }
}

/// Captures the identity/password/salt at provisioning time and derives the
/// long-lived verifier `v` that [`crate::config::Config`] persists.
pub struct Verifier {
    pub salt: [u8; SALT_LEN],
    pub v: Wide<K>,
}

impl Verifier {
    pub fn new(modulus: &Modulus, identity: &[u8], password: &[u8], salt: [u8; SALT_LEN]) -> Self {
        let x_bytes = compute_x(&salt, identity, password);
        let x = Wide::from_be_bytes(&x_bytes).expect("64-byte hash fits K digits");
        let v = modulus.exp_mod(&g_wide(), &x);
        Self { salt, v }
    }
}

/// The accessory side of one pairing attempt. Exactly one `Host` may be
/// open per accessory at a time (spec.md §4.5 SetupM1's `Busy` rule is
/// enforced by the pairing engine, not here).
pub struct Host<'m> {
    modulus: &'m Modulus,
    identity: Vec<u8, MAX_IDENTITY_LEN>,
    salt: [u8; SALT_LEN],
    v: Wide<K>,
    b: Wide<K>,
    b_pub: Wide<K>,
    a_pub: Option<Wide<K>>,
    session_key: Option<[u8; KEY_LEN]>,
}

impl<'m> Host<'m> {
    /// Opens a host session: `B = kv + g^b mod N`.
    pub fn open(modulus: &'m Modulus, identity: &[u8], verifier: &Verifier, b_secret: &[u8]) -> Result<Self> {
        let b = Wide::from_be_bytes(b_secret)?;
        let k = compute_k(modulus);
        let g_to_b = modulus.exp_mod(&g_wide(), &b);
        let kv = modulus.mul_mod(&k, &verifier.v);
        let b_pub = modulus.add_mod(&kv, &g_to_b);

        let mut identity_buf = Vec::new();
        identity_buf
            .extend_from_slice(identity)
            .map_err(|_| CryptoError::CapacityExceeded)?;

        Ok(Self {
            modulus,
            identity: identity_buf,
            salt: verifier.salt,
            v: verifier.v,
            b,
            b_pub,
            a_pub: None,
            session_key: None,
        })
    }

    pub fn public_key(&self) -> Wide<K> {
        self.b_pub
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// `setA(A)`: computes `u`, `S = (A·v^u)^b mod N`, and `K = H(S)`.
    /// Returns `false` without updating any state when `A ≡ 0 (mod N)`,
    /// the classic SRP-6a safety check against a zero premaster secret.
    pub fn set_a(&mut self, a_pub: &Wide<K>) -> bool {
        if a_pub.is_zero() {
            return false;
        }
        let u = compute_u(a_pub, &self.b_pub);
        let v_u = self.modulus.exp_mod(&self.v, &u);
        let base = self.modulus.mul_mod(a_pub, &v_u);
        let s = self.modulus.exp_mod(&base, &self.b);
        self.session_key = Some(sha512::digest(&[&pad_wide(&s)]));
        self.a_pub = Some(*a_pub);
        true
    }

    pub fn session_key(&self) -> Option<&[u8; KEY_LEN]> {
        self.session_key.as_ref()
    }

    /// `M = H(H(N) XOR H(g) ∥ H(I) ∥ s ∥ A ∥ B ∥ K)`.
    fn expected_proof(&self) -> Option<[u8; KEY_LEN]> {
        let a_pub = self.a_pub?;
        let session_key = self.session_key?;
        Some(build_proof_m(
            self.modulus,
            &self.identity,
            &self.salt,
            &a_pub,
            &self.b_pub,
            &session_key,
        ))
    }

    /// Verifies the controller's proof against the host's own computation.
    pub fn verify_proof(&self, claimed: &[u8; KEY_LEN]) -> bool {
        match self.expected_proof() {
            Some(expected) => constant_time_eq(&expected, claimed),
            None => false,
        }
    }

    /// `V = H(A ∥ M ∥ K)`, the host's own proof sent back to the controller.
    pub fn proof_hamk(&self) -> Option<[u8; KEY_LEN]> {
        let a_pub = self.a_pub?;
        let session_key = self.session_key?;
        let m = self.expected_proof()?;
        Some(sha512::digest(&[&pad_wide(&a_pub), &m, &session_key]))
    }
}

fn build_proof_m(
    modulus: &Modulus,
    identity: &[u8],
    salt: &[u8; SALT_LEN],
    a_pub: &Wide<K>,
    b_pub: &Wide<K>,
    session_key: &[u8; KEY_LEN],
) -> [u8; KEY_LEN] {
    let h_n = sha512::digest(&[&pad_wide(modulus.n())]);
    let h_g = sha512::digest(&[&pad_g()]);
    let mut h_n_xor_h_g = [0u8; HASH_SIZE_BYTES];
    for i in 0..HASH_SIZE_BYTES {
        h_n_xor_h_g[i] = h_n[i] ^ h_g[i];
    }
    let h_i = sha512::digest(&[identity]);
    sha512::digest(&[
        &h_n_xor_h_g,
        &h_i,
        salt,
        &pad_wide(a_pub),
        &pad_wide(b_pub),
        session_key,
    ])
}

fn constant_time_eq(a: &[u8; KEY_LEN], b: &[u8; KEY_LEN]) -> bool {
    let mut diff = 0u8;
    for i in 0..KEY_LEN {
        diff |= a[i] ^ b[i];
    }
    diff == 0
}

/// The controller-side computation, symmetric to [`Host`]. HAP accessories
/// never run this role; it exists so the protocol's mutual-agreement
/// property can be exercised end to end in tests.
pub struct User<'m> {
    modulus: &'m Modulus,
    identity: Vec<u8, MAX_IDENTITY_LEN>,
    salt: [u8; SALT_LEN],
    a: Wide<K>,
    a_pub: Wide<K>,
    x: Wide<K>,
    session_key: Option<[u8; KEY_LEN]>,
    b_pub: Option<Wide<K>>,
}

impl<'m> User<'m> {
    pub fn new(
        modulus: &'m Modulus,
        identity: &[u8],
        password: &[u8],
        salt: [u8; SALT_LEN],
        a_secret: &[u8],
    ) -> Result<Self> {
        let a = Wide::from_be_bytes(a_secret)?;
        let a_pub = modulus.exp_mod(&g_wide(), &a);
        let x_bytes = compute_x(&salt, identity, password);
        let x = Wide::from_be_bytes(&x_bytes).expect("64-byte hash fits K digits");

        let mut identity_buf = Vec::new();
        identity_buf
            .extend_from_slice(identity)
            .map_err(|_| CryptoError::CapacityExceeded)?;

        Ok(Self {
            modulus,
            identity: identity_buf,
            salt,
            a,
            a_pub,
            x,
            session_key: None,
            b_pub: None,
        })
    }

    pub fn public_key(&self) -> Wide<K> {
        self.a_pub
    }

    /// `setB(B)`: `S = (B - k*g^x)^(a+u*x) mod N`. Returns `false` without
    /// updating state when `B ≡ 0 (mod N)`.
    pub fn set_b(&mut self, b_pub: &Wide<K>) -> bool {
        if b_pub.is_zero() {
            return false;
        }
        let k = compute_k(self.modulus);
        let u = compute_u(&self.a_pub, b_pub);
        let g_to_x = self.modulus.exp_mod(&g_wide(), &self.x);
        let k_g_x = self.modulus.mul_mod(&k, &g_to_x);
        let base = sub_mod(self.modulus, b_pub, &k_g_x);
        let exponent = combine_exponent(&self.a, &u, &self.x);
        let s = self.modulus.exp_mod(&base, &exponent);
        self.session_key = Some(sha512::digest(&[&pad_wide(&s)]));
        self.b_pub = Some(*b_pub);
        true
    }

    pub fn session_key(&self) -> Option<&[u8; KEY_LEN]> {
        self.session_key.as_ref()
    }

    /// `M = H(H(N) XOR H(g) ∥ H(I) ∥ s ∥ A ∥ B ∥ K)`, sent to the host.
    pub fn proof_m(&self) -> Option<[u8; KEY_LEN]> {
        let b_pub = self.b_pub?;
        let session_key = self.session_key?;
        Some(build_proof_m(
            self.modulus,
            &self.identity,
            &self.salt,
            &self.a_pub,
            &b_pub,
            &session_key,
        ))
    }

    /// Verifies the host's `HAMK` against the user's own `M` and `K`.
    pub fn verify_hamk(&self, hamk: &[u8; KEY_LEN]) -> bool {
        let (Some(m), Some(session_key)) = (self.proof_m(), self.session_key) else {
            return false;
        };
        let expected = sha512::digest(&[&pad_wide(&self.a_pub), &m, &session_key]);
        constant_time_eq(&expected, hamk)
    }
}
