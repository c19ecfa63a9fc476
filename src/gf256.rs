//! GF(256) arithmetic for the Reed-Solomon codec.
//!
//! - Field: GF(2^8), primitive polynomial x^8 + x^4 + x^3 + x^2 + 1 (`0x11D`)
//! - Generator: α = 2
//!
//! The `exp`/`log` tables are built once at compile time and shared read-only by every
//! codec instance, so they are safe to use from any number of links at once. `exp` is
//! 512 entries long so that `exp[log a + log b]` never needs a modulo.

use crate::consts::MAX_POLY_LEN;

const PRIMITIVE_POLY: u16 = 0x11D;
const GF_EXP_LEN: usize = 512;
const GF_LOG_LEN: usize = 256;

/// The multiplicative order of the field.
pub const FIELD_ORDER: usize = 255;

/// Precomputed exponent and logarithm tables.
#[derive(Debug)]
pub struct GaloisField {
    /// `exp[i] = α^i` for `i` in `0..512`.
    pub exp: [u8; GF_EXP_LEN],
    /// `log[α^i] = i`; `log[0]` is unused.
    pub log: [u8; GF_LOG_LEN],
}

/// The process-wide field tables.
pub static GF: GaloisField = build_tables();

const fn build_tables() -> GaloisField {
    let mut exp = [0u8; GF_EXP_LEN];
    let mut log = [0u8; GF_LOG_LEN];

    let mut i = 0usize;
    let mut x: u16 = 1;
    while i < FIELD_ORDER {
        exp[i] = x as u8;
        log[x as usize] = i as u8;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= PRIMITIVE_POLY;
        }
        i += 1;
    }

    let mut j = FIELD_ORDER;
    while j < GF_EXP_LEN {
        exp[j] = exp[j - FIELD_ORDER];
        j += 1;
    }

    GaloisField { exp, log }
}

/// Field multiplication.
#[inline]
pub fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        0
    } else {
        GF.exp[GF.log[a as usize] as usize + GF.log[b as usize] as usize]
    }
}

/// Multiplicative inverse. `a` must be nonzero.
#[inline]
pub fn inv(a: u8) -> u8 {
    debug_assert!(a != 0);
    GF.exp[FIELD_ORDER - GF.log[a as usize] as usize]
}

/// Field division. `b` must be nonzero.
#[inline]
pub fn div(a: u8, b: u8) -> u8 {
    if a == 0 {
        0
    } else {
        GF.exp[GF.log[a as usize] as usize + FIELD_ORDER - GF.log[b as usize] as usize]
    }
}

/// α raised to `power`, reduced modulo the field order.
#[inline]
pub fn alpha_pow(power: usize) -> u8 {
    GF.exp[power % FIELD_ORDER]
}

/// A polynomial over GF(256) stored lowest degree first.
pub(crate) type Poly = [u8; MAX_POLY_LEN];

/// `dst = a * b`, truncated to the scratch capacity.
pub(crate) fn poly_mul(a: &Poly, b: &Poly) -> Poly {
    let mut dst = [0u8; MAX_POLY_LEN];
    for (i, &ai) in a.iter().enumerate() {
        if ai == 0 {
            continue;
        }
        for (j, &bj) in b.iter().take(MAX_POLY_LEN - i).enumerate() {
            dst[i + j] ^= mul(ai, bj);
        }
    }
    dst
}

/// Multiplies by `z`: shifts every coefficient one degree up.
pub(crate) fn poly_mul_z(p: &mut Poly) {
    p.copy_within(0..MAX_POLY_LEN - 1, 1);
    p[0] = 0;
}

/// Multiplies every coefficient by `k`.
pub(crate) fn poly_scale(p: &Poly, k: u8) -> Poly {
    let mut dst = [0u8; MAX_POLY_LEN];
    for (d, &c) in dst.iter_mut().zip(p.iter()) {
        *d = mul(c, k);
    }
    dst
}

/// Evaluates `p` at `x` with Horner's rule.
pub(crate) fn poly_eval(p: &[u8], x: u8) -> u8 {
    p.iter().rev().fold(0, |acc, &c| mul(acc, x) ^ c)
}

/// Degree of `p`, or `None` for the zero polynomial.
pub(crate) fn poly_degree(p: &Poly) -> Option<usize> {
    p.iter().rposition(|&c| c != 0)
}
