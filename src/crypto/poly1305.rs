//! Poly1305 (RFC 7539): one-time MAC over a 256-bit key split into a
//! 130-bit clamped `r` and a 128-bit `pad`. Implemented with a 130-bit
//! accumulator carried across five 26-bit limbs, reduced mod `2^130 - 5`.

pub const TAG_LEN: usize = 16;

const fn mask26() -> u32 {
    (1 << 26) - 1
}

pub struct Poly1305 {
    r: [u32; 5],
    pad: [u8; 16],
    acc: [u32; 5],
    buf: [u8; 16],
    buf_len: usize,
}

impl Poly1305 {
    pub fn new(key: &[u8; 32]) -> Self {
        let mut r = [0u8; 16];
        r.copy_from_slice(&key[..16]);
        // Clamp r per RFC 7539 §2.5.1.
        r[3] &= 15;
        r[7] &= 15;
        r[11] &= 15;
        r[15] &= 15;
        r[4] &= 252;
        r[8] &= 252;
        r[12] &= 252;

        let mut pad = [0u8; 16];
        pad.copy_from_slice(&key[16..]);

        Self {
            r: unpack_26(&r),
            pad,
            acc: [0; 5],
            buf: [0; 16],
            buf_len: 0,
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        if self.buf_len > 0 {
            let take = (16 - self.buf_len).min(data.len());
            self.buf[self.buf_len..self.buf_len + take].copy_from_slice(&data[..take]);
            self.buf_len += take;
            data = &data[take..];
            if self.buf_len == 16 {
                let block = self.buf;
                self.absorb(&block, true);
                self.buf_len = 0;
            }
        }
        while data.len() >= 16 {
            let mut block = [0u8; 16];
            block.copy_from_slice(&data[..16]);
            self.absorb(&block, true);
            data = &data[16..];
        }
        if !data.is_empty() {
            self.buf[..data.len()].copy_from_slice(data);
            self.buf_len = data.len();
        }
    }

    fn absorb(&mut self, block16: &[u8; 16], full_block: bool) {
        let mut limbs = unpack_26(block16);
        if full_block {
            limbs[4] |= 1 << 24;
        }
        for i in 0..5 {
            self.acc[i] = self.acc[i].wrapping_add(limbs[i]);
        }
        self.acc = mul_mod_p(&self.acc, &self.r);
    }

    pub fn finish(mut self) -> [u8; TAG_LEN] {
        if self.buf_len > 0 {
            let mut last = [0u8; 16];
            last[..self.buf_len].copy_from_slice(&self.buf[..self.buf_len]);
            last[self.buf_len] = 1;
            let limbs = unpack_26(&last);
            for i in 0..5 {
                self.acc[i] = self.acc[i].wrapping_add(limbs[i]);
            }
            self.acc = mul_mod_p(&self.acc, &self.r);
        }

        let acc128 = fully_reduce(&self.acc);
        let pad128 = u128::from_le_bytes(self.pad);
        let tag = acc128.wrapping_add(pad128);

        let mut out = [0u8; TAG_LEN];
        out.copy_from_slice(&tag.to_le_bytes()[..16]);
        out
    }
}

/// One-shot `Poly1305(key, message)`.
pub fn mac(key: &[u8; 32], data: &[u8]) -> [u8; TAG_LEN] {
    let mut p = Poly1305::new(key);
    p.update(data);
    p.finish()
}

/// Constant-time tag comparison.
pub fn verify(key: &[u8; 32], data: &[u8], tag: &[u8; TAG_LEN]) -> bool {
    let computed = mac(key, data);
    let mut diff = 0u8;
    for (a, b) in computed.iter().zip(tag.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

fn unpack_26(block16: &[u8; 16]) -> [u32; 5] {
    let lo = u128::from_le_bytes(*block16);
    let mask = mask26() as u128;
    [
        (lo & mask) as u32,
        ((lo >> 26) & mask) as u32,
        ((lo >> 52) & mask) as u32,
        ((lo >> 78) & mask) as u32,
        ((lo >> 104) & mask) as u32,
    ]
}

/// `(acc + limbs) * r mod (2^130 - 5)`, all as 5x26-bit limbs, done in u64
/// to leave headroom for the partial products before carry propagation.
fn mul_mod_p(acc: &[u32; 5], r: &[u32; 5]) -> [u32; 5] {
    let r0 = r[0] as u64;
    let r1 = r[1] as u64;
    let r2 = r[2] as u64;
    let r3 = r[3] as u64;
    let r4 = r[4] as u64;
    let s1 = r1 * 5;
    let s2 = r2 * 5;
    let s3 = r3 * 5;
    let s4 = r4 * 5;

    let a0 = acc[0] as u64;
    let a1 = acc[1] as u64;
    let a2 = acc[2] as u64;
    let a3 = acc[3] as u64;
    let a4 = acc[4] as u64;

    let mut d0 = a0 * r0 + a1 * s4 + a2 * s3 + a3 * s2 + a4 * s1;
    let mut d1 = a0 * r1 + a1 * r0 + a2 * s4 + a3 * s3 + a4 * s2;
    let mut d2 = a0 * r2 + a1 * r1 + a2 * r0 + a3 * s4 + a4 * s3;
    let mut d3 = a0 * r3 + a1 * r2 + a2 * r1 + a3 * r0 + a4 * s4;
    let mut d4 = a0 * r4 + a1 * r3 + a2 * r2 + a3 * r1 + a4 * r0;

    let mask = mask26() as u64;
    let mut carry;

    carry = d0 >> 26;
    d0 &= mask;
    d1 += carry;

    carry = d1 >> 26;
    d1 &= mask;
    d2 += carry;

    carry = d2 >> 26;
    d2 &= mask;
    d3 += carry;

    carry = d3 >> 26;
    d3 &= mask;
    d4 += carry;

    carry = d4 >> 26;
    d4 &= mask;
    d0 += carry * 5;

    carry = d0 >> 26;
    d0 &= mask;
    d1 += carry;

    [d0 as u32, d1 as u32, d2 as u32, d3 as u32, d4 as u32]
}

/// Fully carry `h`, then conditionally subtract `p = 2^130 - 5` so the
/// result is the unique canonical representative below `p` (poly1305-donna
/// 32-bit final-reduction step).
fn fully_reduce(limbs: &[u32; 5]) -> u128 {
    let mask = mask26();
    let mut h = *limbs;

    let mut c = h[1] >> 26;
    h[1] &= mask;
    h[2] = h[2].wrapping_add(c);
    c = h[2] >> 26;
    h[2] &= mask;
    h[3] = h[3].wrapping_add(c);
    c = h[3] >> 26;
    h[3] &= mask;
    h[4] = h[4].wrapping_add(c);
    c = h[4] >> 26;
    h[4] &= mask;
    h[0] = h[0].wrapping_add(c.wrapping_mul(5));
    c = h[0] >> 26;
    h[0] &= mask;
    h[1] = h[1].wrapping_add(c);

    let mut g = [0u32; 5];
    g[0] = h[0].wrapping_add(5);
    c = g[0] >> 26;
    g[0] &= mask;
    g[1] = h[1].wrapping_add(c);
    c = g[1] >> 26;
    g[1] &= mask;
    g[2] = h[2].wrapping_add(c);
    c = g[2] >> 26;
    g[2] &= mask;
    g[3] = h[3].wrapping_add(c);
    c = g[3] >> 26;
    g[3] &= mask;
    g[4] = h[4].wrapping_add(c).wrapping_sub(1 << 26);

    let select_g = 0u32.wrapping_sub(g[4] >> 31 ^ 1);
    let select_h = !select_g;
    for i in 0..5 {
        h[i] = (h[i] & select_h) | (g[i] & select_g);
    }

    let mut acc: u128 = 0;
    acc |= h[0] as u128;
    acc |= (h[1] as u128) << 26;
    acc |= (h[2] as u128) << 52;
    acc |= (h[3] as u128) << 78;
    acc |= (h[4] as u128) << 104;
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unhex(s: &str) -> std::vec::Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn hex(bytes: &[u8]) -> std::string::String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn rfc7539_test_vector() {
        let key: [u8; 32] = unhex("85d6be7857556d337f4452fe42d506a80103808afb0db2fd4abff6af4149f51b")
            .try_into()
            .unwrap();
        let msg = b"Cryptographic Forum Research Group";
        let tag = mac(&key, msg);
        assert_eq!(hex(&tag), "a8061dc1305136c6c22b8baf0c0127a9");
    }

    #[test]
    fn verify_accepts_matching_tag_rejects_tampered() {
        let key = [7u8; 32];
        let msg = b"hello procedure";
        let tag = mac(&key, msg);
        assert!(verify(&key, msg, &tag));

        let mut bad = tag;
        bad[0] ^= 1;
        assert!(!verify(&key, msg, &bad));
    }
}
