//! Ed25519 signatures (RFC 8032), used for HAP long-term accessory and
//! controller identity keys. Point arithmetic follows the classic extended
//! twisted-Edwards coordinates (X, Y, Z, T) over [`super::field25519`];
//! scalar reduction mod the group order `L` follows the widely used
//! 64-limb schoolbook reduction.

use super::field25519 as f;
use super::field25519::Gf;
use super::sha512;

pub const PUBLIC_KEY_LEN: usize = 32;
pub const SECRET_KEY_LEN: usize = 64;
pub const SIGNATURE_LEN: usize = 64;

/// `L`, the order of the Ed25519 base point, little-endian.
const L: [i64; 32] = [
    0xed, 0xd3, 0xf5, 0x5c, 0x1a, 0x63, 0x12, 0x58, 0xd6, 0x9c, 0xf7, 0xa2, 0xde, 0xf9, 0xde, 0x14, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0x10,
];

type Point = [Gf; 4]; // (X, Y, Z, T) extended coordinates

fn point_set(x: Gf, y: Gf, z: Gf, t: Gf) -> Point {
    [x, y, z, t]
}

fn base_point() -> Point {
    let mut t = f::GF0;
    f::mul(&mut t, &f::ED_BASE_X, &f::ED_BASE_Y);
    point_set(f::ED_BASE_X, f::ED_BASE_Y, f::GF1, t)
}

fn point_add(p: &Point, q: &Point) -> Point {
    let mut a = f::GF0;
    f::sub(&mut a, &p[1], &p[0]);
    let mut t = f::GF0;
    f::sub(&mut t, &q[1], &q[0]);
    let mut a2 = f::GF0;
    f::mul(&mut a2, &a, &t);

    let mut b = f::GF0;
    f::add(&mut b, &p[0], &p[1]);
    let mut t2 = f::GF0;
    f::add(&mut t2, &q[0], &q[1]);
    let mut b2 = f::GF0;
    f::mul(&mut b2, &b, &t2);

    let mut c = f::GF0;
    f::mul(&mut c, &p[3], &q[3]);
    let c_tmp = c;
    f::mul(&mut c, &c_tmp, &f::ED_D2);

    let mut d = f::GF0;
    f::mul(&mut d, &p[2], &q[2]);
    let d_tmp = d;
    f::add(&mut d, &d_tmp, &d_tmp);

    let mut e = f::GF0;
    f::sub(&mut e, &b2, &a2);
    let mut ff = f::GF0;
    f::sub(&mut ff, &d, &c);
    let mut g = f::GF0;
    f::add(&mut g, &d, &c);
    let mut h = f::GF0;
    f::add(&mut h, &b2, &a2);

    let mut ox = f::GF0;
    f::mul(&mut ox, &e, &ff);
    let mut oy = f::GF0;
    f::mul(&mut oy, &h, &g);
    let mut oz = f::GF0;
    f::mul(&mut oz, &g, &ff);
    let mut ot = f::GF0;
    f::mul(&mut ot, &e, &h);

    point_set(ox, oy, oz, ot)
}

fn cswap(p: &mut Point, q: &mut Point, b: i64) {
    for i in 0..4 {
        f::sel25519(&mut p[i], &mut q[i], b);
    }
}

fn scalarmult_point(point: &Point, scalar: &[u8; 32]) -> Point {
    let mut p: Point = point_set(f::GF0, f::GF1, f::GF1, f::GF0);
    let mut q = *point;
    for i in (0..256).rev() {
        let b = ((scalar[i >> 3] >> (i & 7)) & 1) as i64;
        cswap(&mut p, &mut q, b);
        q = point_add(&q, &p);
        p = point_add(&p, &p);
        cswap(&mut p, &mut q, b);
    }
    p
}

fn scalarmult_base_point(scalar: &[u8; 32]) -> Point {
    scalarmult_point(&base_point(), scalar)
}

fn point_pack(p: &Point) -> [u8; 32] {
    let mut zi = f::GF0;
    f::inv25519(&mut zi, &p[2]);
    let mut tx = f::GF0;
    f::mul(&mut tx, &p[0], &zi);
    let mut ty = f::GF0;
    f::mul(&mut ty, &p[1], &zi);

    let mut out = [0u8; 32];
    f::pack25519(&mut out, &ty);
    out[31] ^= f::par25519(&tx) << 7;
    out
}

/// Decompress a packed point; HAP never needs the small-order / non-canonical
/// rejection checks full RFC 8032 validation does, so this mirrors the
/// widely used compact unpack (candidate-sqrt plus the two expected square
/// checks).
fn point_unpack_neg(packed: &[u8; 32]) -> Option<Point> {
    let mut y = f::GF0;
    f::unpack25519(&mut y, packed);
    let z = f::GF1;

    let mut num = f::GF0;
    f::square(&mut num, &y);
    let mut den = f::GF0;
    f::mul(&mut den, &num, &f::ED_D);
    let num_tmp = num;
    f::sub(&mut num, &num_tmp, &z);
    let den_tmp = den;
    f::add(&mut den, &den_tmp, &z);

    let mut den2 = f::GF0;
    f::square(&mut den2, &den);
    let mut den4 = f::GF0;
    f::square(&mut den4, &den2);
    let mut den6 = f::GF0;
    f::mul(&mut den6, &den4, &den2);

    let mut t = f::GF0;
    f::mul(&mut t, &den6, &num);
    let t_tmp = t;
    f::mul(&mut t, &t_tmp, &den);

    let mut t2 = f::GF0;
    f::pow2523(&mut t2, &t);
    let t2_tmp = t2;
    f::mul(&mut t2, &t2_tmp, &num);
    let t2_tmp = t2;
    f::mul(&mut t2, &t2_tmp, &den);
    let t2_tmp = t2;
    f::mul(&mut t2, &t2_tmp, &den);

    let mut x = f::GF0;
    f::mul(&mut x, &t2, &den);

    let mut chk = f::GF0;
    f::square(&mut chk, &x);
    let chk_tmp = chk;
    f::mul(&mut chk, &chk_tmp, &den);
    if f::neq25519(&chk, &num) {
        let x_tmp = x;
        f::mul(&mut x, &x_tmp, &f::SQRT_M1);
    }

    let mut chk2 = f::GF0;
    f::square(&mut chk2, &x);
    let chk2_tmp = chk2;
    f::mul(&mut chk2, &chk2_tmp, &den);
    if f::neq25519(&chk2, &num) {
        return None;
    }

    if f::par25519(&x) == (packed[31] >> 7) {
        let mut neg_x = f::GF0;
        f::sub(&mut neg_x, &f::GF0, &x);
        x = neg_x;
    }

    let mut t3 = f::GF0;
    f::mul(&mut t3, &x, &y);
    Some(point_set(x, y, z, t3))
}

/// Reduce a 64-byte little-endian integer modulo the group order `L`,
/// writing the canonical 32-byte little-endian result.
fn reduce_mod_l(x: &mut [i64; 64]) -> [u8; 32] {
    for i in (32..64).rev() {
        let mut carry = 0i64;
        for j in (i - 32)..(i - 12) {
            x[j] += carry - 16 * x[i] * L[j - (i - 32)];
            carry = (x[j] + 128) >> 8;
            x[j] -= carry << 8;
        }
        x[i - 12] += carry;
        x[i] = 0;
    }

    let mut carry = 0i64;
    for j in 0..32 {
        x[j] += carry - (x[31] >> 4) * L[j];
        carry = x[j] >> 8;
        x[j] &= 255;
    }
    for j in 0..32 {
        x[j] -= carry * L[j];
    }
    for i in 0..31 {
        x[i + 1] += x[i] >> 8;
        x[i] &= 255;
    }

    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = x[i] as u8;
    }
    out
}

fn reduce_hash(h: &[u8; 64]) -> [u8; 32] {
    let mut x = [0i64; 64];
    for i in 0..64 {
        x[i] = h[i] as i64;
    }
    reduce_mod_l(&mut x)
}

fn clamp_scalar(h: &mut [u8; 32]) {
    h[0] &= 248;
    h[31] &= 127;
    h[31] |= 64;
}

/// A keypair seed expanded into its signing scalar, nonce prefix, and public
/// key, i.e. the first half of RFC 8032's `sign` algorithm.
struct ExpandedKey {
    scalar: [u8; 32],
    prefix: [u8; 32],
    public: [u8; 32],
}

fn expand_seed(seed: &[u8; 32]) -> ExpandedKey {
    let h = sha512::digest(&[seed]);
    let mut scalar = [0u8; 32];
    scalar.copy_from_slice(&h[..32]);
    clamp_scalar(&mut scalar);
    let mut prefix = [0u8; 32];
    prefix.copy_from_slice(&h[32..]);
    let public = point_pack(&scalarmult_base_point(&scalar));
    ExpandedKey { scalar, prefix, public }
}

/// Generate a fresh key pair from a caller-supplied 32-byte seed (HAP
/// accessories draw this from their RNG port at first boot).
pub fn keypair_from_seed(seed: &[u8; 32]) -> ([u8; PUBLIC_KEY_LEN], [u8; SECRET_KEY_LEN]) {
    let expanded = expand_seed(seed);
    let mut sk = [0u8; SECRET_KEY_LEN];
    sk[..32].copy_from_slice(seed);
    sk[32..].copy_from_slice(&expanded.public);
    (expanded.public, sk)
}

/// Rebuild a key pair from an already-known public/private pair, e.g. when
/// loading persisted LTSK/LTPK from [`crate::config::Config`].
pub fn keypair_from_parts(public: [u8; PUBLIC_KEY_LEN], seed: [u8; 32]) -> [u8; SECRET_KEY_LEN] {
    let mut sk = [0u8; SECRET_KEY_LEN];
    sk[..32].copy_from_slice(&seed);
    sk[32..].copy_from_slice(&public);
    sk
}

pub fn sign(message: &[u8], sk: &[u8; SECRET_KEY_LEN]) -> [u8; SIGNATURE_LEN] {
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&sk[..32]);
    let expanded = expand_seed(&seed);
    let public = &sk[32..64];

    let r_hash = sha512::digest(&[&expanded.prefix, message]);
    let r = reduce_hash(&r_hash);
    let r_point = point_pack(&scalarmult_base_point(&r));

    let k_hash = sha512::digest(&[&r_point, public, message]);
    let k = reduce_hash(&k_hash);

    let mut x = [0i64; 64];
    for i in 0..32 {
        x[i] = r[i] as i64;
    }
    for i in 0..32 {
        for j in 0..32 {
            x[i + j] += k[i] as i64 * expanded.scalar[j] as i64;
        }
    }
    let s = reduce_mod_l(&mut x);

    let mut sig = [0u8; SIGNATURE_LEN];
    sig[..32].copy_from_slice(&r_point);
    sig[32..].copy_from_slice(&s);
    sig
}

pub fn verify(message: &[u8], public: &[u8; PUBLIC_KEY_LEN], sig: &[u8; SIGNATURE_LEN]) -> bool {
    // Reject non-canonical S (S >= L), per RFC 8032 §5.1.7.
    for i in (0..32).rev() {
        let s = sig[32 + i] as i64;
        let l = L[i];
        if s > l {
            return false;
        }
        if s < l {
            break;
        }
        if i == 0 {
            return false;
        }
    }

    let neg_a = match point_unpack_neg(public) {
        Some(p) => p,
        None => return false,
    };

    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&sig[32..]);

    let k_hash = sha512::digest(&[&sig[..32], public, message]);
    let k = reduce_hash(&k_hash);

    let p1 = scalarmult_point(&neg_a, &k);
    let p2 = scalarmult_base_point(&s_bytes);
    let sum = point_add(&p1, &p2);
    let encoded = point_pack(&sum);

    encoded == sig[..32]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unhex32(s: &str) -> [u8; 32] {
        let mut out = [0u8; 32];
        for i in 0..32 {
            out[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).unwrap();
        }
        out
    }

    fn unhex64(s: &str) -> [u8; 64] {
        let mut out = [0u8; 64];
        for i in 0..64 {
            out[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).unwrap();
        }
        out
    }

    #[test]
    fn rfc8032_test_vector_1() {
        // RFC 8032 §7.1, first SHA-512/Ed25519 test vector (empty message).
        let seed = unhex32("9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60");
        let expected_pk = unhex32("d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511");
        let expected_sig = unhex64(
            "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e06522490155\
5fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b",
        );

        let (pk, sk) = keypair_from_seed(&seed);
        assert_eq!(pk, expected_pk);

        let sig = sign(b"", &sk);
        assert_eq!(sig, expected_sig);
        assert!(verify(b"", &pk, &sig));
    }

    #[test]
    fn sign_verify_roundtrip() {
        let seed = [42u8; 32];
        let (pk, sk) = keypair_from_seed(&seed);
        let message = [7u8; 64];
        let sig = sign(&message, &sk);
        assert!(verify(&message, &pk, &sig));
    }

    #[test]
    fn tampered_message_fails_verification() {
        let seed = [5u8; 32];
        let (pk, sk) = keypair_from_seed(&seed);
        let sig = sign(b"hello", &sk);
        assert!(!verify(b"hellp", &pk, &sig));
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let seed = [9u8; 32];
        let (pk, sk) = keypair_from_seed(&seed);
        let mut sig = sign(b"identify me", &sk);
        sig[0] ^= 1;
        assert!(!verify(b"identify me", &pk, &sig));
    }
}
