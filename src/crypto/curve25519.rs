//! X25519 Diffie-Hellman (RFC 7748), used for HAP Pair-Verify key agreement.
//! The Montgomery ladder below is the textbook constant-time scalar
//! multiplication; only the field arithmetic in [`super::field25519`] is
//! shared with [`super::ed25519`].

use super::field25519 as f;

pub const SCALAR_LEN: usize = 32;
pub const POINT_LEN: usize = 32;

/// Curve25519 base point `u = 9`.
pub const BASE_POINT: [u8; POINT_LEN] = {
    let mut b = [0u8; 32];
    b[0] = 9;
    b
};

fn clamp(scalar: &mut [u8; SCALAR_LEN]) {
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;
}

/// `scalarmult(n, p)`: the Montgomery-ladder X25519 function.
pub fn scalarmult(scalar: &[u8; SCALAR_LEN], point: &[u8; POINT_LEN]) -> [u8; POINT_LEN] {
    let mut z = *scalar;
    clamp(&mut z);

    let mut x1 = f::GF0;
    f::unpack25519(&mut x1, point);

    let mut x2 = f::GF1;
    let mut z2 = f::GF0;
    let mut x3 = x1;
    let mut z3 = f::GF1;
    let mut swap = 0i64;

    for pos in (0..255).rev() {
        let bit = ((z[pos >> 3] >> (pos & 7)) & 1) as i64;
        swap ^= bit;
        f::sel25519(&mut x2, &mut x3, swap);
        f::sel25519(&mut z2, &mut z3, swap);
        swap = bit;

        let mut a = f::GF0;
        f::add(&mut a, &x2, &z2);
        let mut b = f::GF0;
        f::sub(&mut b, &x2, &z2);
        let mut aa = f::GF0;
        f::square(&mut aa, &a);
        let mut bb = f::GF0;
        f::square(&mut bb, &b);
        let mut e = f::GF0;
        f::sub(&mut e, &aa, &bb);
        let mut c = f::GF0;
        f::add(&mut c, &x3, &z3);
        let mut d = f::GF0;
        f::sub(&mut d, &x3, &z3);
        let mut da = f::GF0;
        f::mul(&mut da, &d, &a);
        let mut cb = f::GF0;
        f::mul(&mut cb, &c, &b);

        let mut t0 = f::GF0;
        f::add(&mut t0, &da, &cb);
        f::square(&mut x3, &t0);

        let mut t1 = f::GF0;
        f::sub(&mut t1, &da, &cb);
        let mut t1sq = f::GF0;
        f::square(&mut t1sq, &t1);
        f::mul(&mut z3, &x1, &t1sq);

        f::mul(&mut x2, &aa, &bb);

        let mut e_a24 = f::GF0;
        f::mul(&mut e_a24, &e, &f::A24);
        let mut t2 = f::GF0;
        f::add(&mut t2, &bb, &e_a24);
        f::mul(&mut z2, &e, &t2);
    }

    f::sel25519(&mut x2, &mut x3, swap);
    f::sel25519(&mut z2, &mut z3, swap);

    let mut zi = f::GF0;
    f::inv25519(&mut zi, &z2);
    let mut out_gf = f::GF0;
    f::mul(&mut out_gf, &x2, &zi);

    let mut out = [0u8; POINT_LEN];
    f::pack25519(&mut out, &out_gf);
    out
}

/// `scalarmult(n, 9)`, i.e. derive a public key from a private scalar.
pub fn scalarmult_base(scalar: &[u8; SCALAR_LEN]) -> [u8; POINT_LEN] {
    scalarmult(scalar, &BASE_POINT)
}

/// A local X25519 key pair, matching the stateful `init`/`pubKey`/
/// `sharedSecret` shape HAP controllers use for Pair-Verify.
pub struct KeyPair {
    private: [u8; SCALAR_LEN],
    public: [u8; POINT_LEN],
}

impl KeyPair {
    pub fn from_random(seed: [u8; SCALAR_LEN]) -> Self {
        let public = scalarmult_base(&seed);
        Self { private: seed, public }
    }

    pub fn public_key(&self) -> &[u8; POINT_LEN] {
        &self.public
    }

    pub fn shared_secret(&self, peer_public: &[u8; POINT_LEN]) -> [u8; POINT_LEN] {
        scalarmult(&self.private, peer_public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_point_scalarmult_matches_scalarmult_base() {
        let scalar = [0x5a_u8; 32];
        assert_eq!(scalarmult(&scalar, &BASE_POINT), scalarmult_base(&scalar));
    }

    #[test]
    fn diffie_hellman_agrees() {
        let a = KeyPair::from_random([1u8; 32]);
        let b = KeyPair::from_random([2u8; 32]);
        assert_eq!(a.shared_secret(b.public_key()), b.shared_secret(a.public_key()));
    }

    #[test]
    fn monte_carlo_chain_agrees_both_directions() {
        // Derive two "private scalars" by repeatedly hashing the ladder
        // output through itself, then confirm F(a, F(b, 9)) == F(b, F(a, 9))
        // after each step, as an iterated-agreement sanity check.
        let mut a = [0xaa_u8; 32];
        let mut b = [0xbb_u8; 32];
        for _ in 0..9 {
            let pa = scalarmult_base(&a);
            let pb = scalarmult_base(&b);
            let shared_ab = scalarmult(&a, &pb);
            let shared_ba = scalarmult(&b, &pa);
            assert_eq!(shared_ab, shared_ba);
            a = shared_ab;
            b = shared_ba;
        }
    }
}
