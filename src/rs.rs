//! Systematic Reed-Solomon block coding over GF(256).
//!
//! A codeword is `data ‖ parity` where the parity bytes are the remainder of
//! `data · x^parity` divided by the generator polynomial `Π (x + α^i), i = 1..=parity`.
//! Decoding supports pure error correction as well as combined error and erasure
//! correction:
//!
//! - up to `parity / 2` byte errors at unknown positions, or
//! - any mix of `e` erasures (known-bad positions) and `w` errors with `e + 2w ≤ parity`.
//!
//! ## Decoding steps
//!
//! 1. Syndromes: the received word evaluated at `α^1 ..= α^parity`. All zero means the
//!    block is accepted untouched.
//! 2. Erasure locator `Γ(z) = Π (1 + α^loc z)` seeds a modified Berlekamp-Massey run
//!    that yields the combined locator `Λ(z)`.
//! 3. Evaluator `Ω(z) = Λ(z)·S(z) mod z^parity`.
//! 4. Brute-force root search of `Λ` over all 255 nonzero field elements.
//! 5. Forney: `e = Ω(X⁻¹) / Λ'(X⁻¹)` at every root, XORed into the codeword.
//!
//! ## Limitations
//!
//! Bounded-distance decoding can *false accept*: a pattern beyond the correction
//! capacity may land within distance `parity / 2` of another codeword and be "corrected"
//! into it. Nothing at this layer can detect that; the frame CRC wrapped inside every FEC
//! message is what catches it.

use crate::consts::{MAX_CODEWORD_LEN, MAX_PARITY, MAX_POLY_LEN};
use crate::error::RsError;
use crate::gf256::{
    FIELD_ORDER, Poly, alpha_pow, div, inv, mul, poly_degree, poly_eval, poly_mul, poly_mul_z,
    poly_scale,
};

/// Reed-Solomon codec for a fixed number of parity bytes.
///
/// The generator polynomial is computed once at construction; the field tables are
/// shared by all instances. A codec holds no per-block state, so one instance can serve
/// any number of encoders and decoders.
#[derive(Debug, Clone)]
pub struct ReedSolomon {
    parity: usize,
    /// Generator coefficients, lowest degree first; `generator[parity] == 1`.
    generator: [u8; MAX_PARITY + 1],
}

/// Syndromes of a received block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Syndromes {
    values: [u8; MAX_PARITY],
    len: usize,
}

impl Syndromes {
    /// The syndrome values, `S_j` evaluated at `α^(j+1)`.
    pub fn as_slice(&self) -> &[u8] {
        &self.values[..self.len]
    }

    /// `true` when no error was detected.
    pub fn is_zero(&self) -> bool {
        self.as_slice().iter().all(|&s| s == 0)
    }
}

/// Per-decode scratch state. Built fresh for every block and dropped afterwards.
struct ErrorLocatorContext {
    syndromes: Poly,
    lambda: Poly,
    omega: Poly,
    erasures: [usize; MAX_PARITY],
    n_erasures: usize,
    locations: [usize; MAX_PARITY],
    n_errors: usize,
}

impl ErrorLocatorContext {
    fn new(syndromes: &Syndromes) -> Self {
        let mut s = [0u8; MAX_POLY_LEN];
        s[..syndromes.len].copy_from_slice(syndromes.as_slice());
        Self {
            syndromes: s,
            lambda: [0u8; MAX_POLY_LEN],
            omega: [0u8; MAX_POLY_LEN],
            erasures: [0; MAX_PARITY],
            n_erasures: 0,
            locations: [0; MAX_PARITY],
            n_errors: 0,
        }
    }

    /// `Γ(z) = Π (1 + α^loc z)` over the known erasure locations.
    fn erasure_locator(&self) -> Poly {
        let mut gamma = [0u8; MAX_POLY_LEN];
        gamma[0] = 1;
        for &loc in &self.erasures[..self.n_erasures] {
            let mut term = poly_scale(&gamma, alpha_pow(loc));
            poly_mul_z(&mut term);
            for (g, t) in gamma.iter_mut().zip(term.iter()) {
                *g ^= t;
            }
        }
        gamma
    }

    /// Modified Berlekamp-Massey seeded with the erasure locator, followed by the
    /// error evaluator.
    fn berlekamp_massey(&mut self, parity: usize) {
        let gamma = self.erasure_locator();
        let mut psi = gamma;
        let mut correction = gamma;
        poly_mul_z(&mut correction);

        let mut k: isize = -1;
        let mut l = self.n_erasures;

        for n in self.n_erasures..parity {
            let d = (0..=l.min(n)).fold(0, |acc, i| acc ^ mul(psi[i], self.syndromes[n - i]));

            if d != 0 {
                let scaled = poly_scale(&correction, d);
                let mut next = psi;
                for (p, s) in next.iter_mut().zip(scaled.iter()) {
                    *p ^= s;
                }

                let order = n as isize - k;
                if (l as isize) < order {
                    k = n as isize - l as isize;
                    correction = poly_scale(&psi, inv(d));
                    l = order as usize;
                }

                psi = next;
            }

            poly_mul_z(&mut correction);
        }

        self.lambda = psi;

        let product = poly_mul(&self.lambda, &self.syndromes);
        self.omega = [0u8; MAX_POLY_LEN];
        self.omega[..parity].copy_from_slice(&product[..parity]);
    }

    /// Evaluates `Λ` at every nonzero field element and records the error locations,
    /// counted from the end of the codeword.
    fn find_roots(&mut self, parity: usize, len: usize) -> Result<(), RsError> {
        let degree = poly_degree(&self.lambda).unwrap_or(0);
        let lambda = &self.lambda[..=degree];
        self.n_errors = 0;

        for r in 1..=FIELD_ORDER {
            if poly_eval(lambda, alpha_pow(r)) != 0 {
                continue;
            }
            if self.n_errors >= parity {
                return Err(RsError::Uncorrectable);
            }
            let loc = FIELD_ORDER - r;
            if loc >= len {
                return Err(RsError::Uncorrectable);
            }
            self.locations[self.n_errors] = loc;
            self.n_errors += 1;
        }

        // Nonzero syndromes with no roots, or a locator that doesn't split over the
        // field, means more errors than the code distance allows.
        if self.n_errors == 0 || self.n_errors != degree {
            return Err(RsError::Uncorrectable);
        }
        Ok(())
    }

    /// Forney magnitudes at each located root. Nothing is written until every
    /// magnitude is known.
    fn correct(&self, codeword: &mut [u8]) -> Result<usize, RsError> {
        let mut magnitudes = [0u8; MAX_PARITY];

        for (m, &loc) in magnitudes.iter_mut().zip(&self.locations[..self.n_errors]) {
            let x_inv = FIELD_ORDER - loc;
            let num = poly_eval(&self.omega, alpha_pow(x_inv));

            // Λ'(z) keeps only the odd-degree terms in characteristic 2
            let mut denom = 0u8;
            for j in (1..MAX_POLY_LEN).step_by(2) {
                denom ^= mul(self.lambda[j], alpha_pow(x_inv * (j - 1)));
            }
            if denom == 0 {
                return Err(RsError::Uncorrectable);
            }
            *m = div(num, denom);
        }

        // an erased position may turn out to hold the right value
        let len = codeword.len();
        let mut changed = 0;
        for (&m, &loc) in magnitudes.iter().zip(&self.locations[..self.n_errors]) {
            if m != 0 {
                codeword[len - 1 - loc] ^= m;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

impl ReedSolomon {
    /// Creates a codec appending `parity` bytes to every block.
    ///
    /// # Errors
    /// [`RsError::InvalidParity`] unless `1 ≤ parity ≤ MAX_PARITY`.
    pub fn new(parity: usize) -> Result<Self, RsError> {
        if parity == 0 || parity > MAX_PARITY {
            return Err(RsError::InvalidParity { parity });
        }
        Ok(Self::with_parity(parity))
    }

    /// Builds the generator for an already validated parity count.
    pub(crate) fn with_parity(parity: usize) -> Self {
        // multiply (x + α^i) for i = 1..=parity
        let mut generator = [0u8; MAX_PARITY + 1];
        generator[0] = 1;
        for i in 1..=parity {
            let root = alpha_pow(i);
            for k in (1..=i).rev() {
                generator[k] = generator[k - 1] ^ mul(generator[k], root);
            }
            generator[0] = mul(generator[0], root);
        }

        Self { parity, generator }
    }

    /// Number of parity bytes per block.
    pub fn parity(&self) -> usize {
        self.parity
    }

    /// Generator polynomial coefficients, lowest degree first.
    pub fn generator(&self) -> &[u8] {
        &self.generator[..=self.parity]
    }

    /// Computes the parity bytes for `data` into `parity`, most significant first.
    ///
    /// This runs the data through a `parity`-stage LFSR tapped with the generator
    /// coefficients; the register contents afterwards are the remainder.
    ///
    /// # Errors
    /// - [`RsError::InvalidLength`] if `data` plus parity exceeds a codeword, or if
    ///   `parity` is shorter than the configured parity count.
    pub fn encode_parity(&self, data: &[u8], parity: &mut [u8]) -> Result<(), RsError> {
        let p = self.parity;
        if data.len() + p > MAX_CODEWORD_LEN || parity.len() < p {
            return Err(RsError::InvalidLength {
                len: data.len() + p,
            });
        }
        self.write_parity(data, parity);
        Ok(())
    }

    /// LFSR parity computation; `parity` must hold at least `self.parity` bytes.
    pub(crate) fn write_parity(&self, data: &[u8], parity: &mut [u8]) {
        let p = self.parity;
        let mut lfsr = [0u8; MAX_PARITY];
        for &byte in data {
            let feedback = byte ^ lfsr[p - 1];
            for j in (1..p).rev() {
                lfsr[j] = lfsr[j - 1] ^ mul(self.generator[j], feedback);
            }
            lfsr[0] = mul(self.generator[0], feedback);
        }

        for (i, out) in parity[..p].iter_mut().enumerate() {
            *out = lfsr[p - 1 - i];
        }
    }

    /// Writes the codeword `data ‖ parity` into `dst` and returns its length.
    ///
    /// # Errors
    /// [`RsError::InvalidLength`] if the codeword is too long or `dst` too small.
    pub fn encode(&self, data: &[u8], dst: &mut [u8]) -> Result<usize, RsError> {
        let len = data.len() + self.parity;
        if dst.len() < len {
            return Err(RsError::InvalidLength { len });
        }
        let (head, tail) = dst.split_at_mut(data.len());
        head.copy_from_slice(data);
        self.encode_parity(data, tail)?;
        Ok(len)
    }

    fn check_len(&self, len: usize) -> Result<(), RsError> {
        if len <= self.parity || len > MAX_CODEWORD_LEN {
            return Err(RsError::InvalidLength { len });
        }
        Ok(())
    }

    /// Evaluates the received block at `α^1 ..= α^parity`.
    ///
    /// # Errors
    /// [`RsError::InvalidLength`] if the block is not longer than the parity or longer
    /// than 255 bytes.
    pub fn syndromes(&self, codeword: &[u8]) -> Result<Syndromes, RsError> {
        self.check_len(codeword.len())?;
        let mut values = [0u8; MAX_PARITY];
        for (j, s) in values[..self.parity].iter_mut().enumerate() {
            let x = alpha_pow(j + 1);
            *s = codeword.iter().fold(0, |acc, &b| b ^ mul(x, acc));
        }
        Ok(Syndromes {
            values,
            len: self.parity,
        })
    }

    /// Returns `true` if the block is a valid codeword.
    ///
    /// # Errors
    /// See [`ReedSolomon::syndromes`].
    pub fn check(&self, codeword: &[u8]) -> Result<bool, RsError> {
        Ok(self.syndromes(codeword)?.is_zero())
    }

    /// Corrects `codeword` in place and returns the number of bytes that were changed
    /// (zero when the block was already valid).
    ///
    /// `erasures` lists indices into `codeword` that are known to be unreliable.
    /// On failure the block is left exactly as it was.
    ///
    /// # Errors
    /// - [`RsError::InvalidLength`], [`RsError::TooManyErasures`] or
    ///   [`RsError::ErasureOutOfRange`] for bad arguments.
    /// - [`RsError::Uncorrectable`] when the error pattern is beyond the code's capacity.
    pub fn decode(&self, codeword: &mut [u8], erasures: &[usize]) -> Result<usize, RsError> {
        let len = codeword.len();
        self.check_len(len)?;
        if erasures.len() > self.parity {
            return Err(RsError::TooManyErasures {
                count: erasures.len(),
                max: self.parity,
            });
        }

        if let Some(&position) = erasures.iter().find(|&&p| p >= len) {
            return Err(RsError::ErasureOutOfRange { position, len });
        }

        let syndromes = self.syndromes(codeword)?;
        if syndromes.is_zero() {
            return Ok(0);
        }

        let mut ctx = ErrorLocatorContext::new(&syndromes);
        for (slot, &position) in ctx.erasures.iter_mut().zip(erasures) {
            *slot = len - 1 - position;
        }
        ctx.n_erasures = erasures.len();

        ctx.berlekamp_massey(self.parity);
        ctx.find_roots(self.parity, len)?;
        ctx.correct(codeword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::index::sample;
    use rand::{Rng, SeedableRng};

    fn random_codeword(rs: &ReedSolomon, rng: &mut StdRng, data_len: usize) -> Vec<u8> {
        let data: Vec<u8> = (0..data_len).map(|_| rng.r#gen()).collect();
        let mut block = vec![0u8; data_len + rs.parity()];
        assert_eq!(rs.encode(&data, &mut block), Ok(data_len + rs.parity()));
        block
    }

    fn corrupt(block: &mut [u8], rng: &mut StdRng, count: usize) -> Vec<usize> {
        let positions = sample(rng, block.len(), count).into_vec();
        for &p in &positions {
            block[p] ^= rng.gen_range(1..=255u8);
        }
        positions
    }

    #[test]
    fn test_invalid_parity_is_rejected() {
        assert_eq!(
            ReedSolomon::new(0).unwrap_err(),
            RsError::InvalidParity { parity: 0 }
        );
        assert!(ReedSolomon::new(MAX_PARITY + 1).is_err());
        assert!(ReedSolomon::new(MAX_PARITY).is_ok());
    }

    #[test]
    fn test_generator_has_consecutive_alpha_roots() {
        let rs = ReedSolomon::new(4).unwrap();
        let g = rs.generator();
        assert_eq!(g.len(), 5);
        assert_eq!(g[4], 1);
        for i in 1..=4 {
            assert_eq!(poly_eval(g, alpha_pow(i)), 0);
        }
        assert_ne!(poly_eval(g, alpha_pow(5)), 0);
    }

    #[test]
    fn test_encoded_block_has_zero_syndromes() {
        let rs = ReedSolomon::new(4).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let block = random_codeword(&rs, &mut rng, 16);
        assert_eq!(rs.check(&block), Ok(true));
    }

    #[test]
    fn test_zero_data_has_zero_parity() {
        let rs = ReedSolomon::new(6).unwrap();
        let mut parity = [0xaa; 6];
        rs.encode_parity(&[0u8; 10], &mut parity).unwrap();
        assert_eq!(parity, [0u8; 6]);
    }

    #[test]
    fn test_clean_block_decodes_without_changes() {
        let rs = ReedSolomon::new(4).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let mut block = random_codeword(&rs, &mut rng, 16);
        let original = block.clone();
        assert_eq!(rs.decode(&mut block, &[]), Ok(0));
        assert_eq!(block, original);
    }

    #[test]
    fn test_corrects_up_to_half_parity_errors() {
        let mut rng = StdRng::seed_from_u64(3);
        for parity in [2usize, 4, 8, 16] {
            let rs = ReedSolomon::new(parity).unwrap();
            for _ in 0..200 {
                let data_len = rng.gen_range(1..=(MAX_CODEWORD_LEN - parity).min(60));
                let original = random_codeword(&rs, &mut rng, data_len);
                let errors = rng.gen_range(1..=parity / 2);
                let mut block = original.clone();
                let _ = corrupt(&mut block, &mut rng, errors);
                assert_eq!(rs.decode(&mut block, &[]), Ok(errors));
                assert_eq!(block, original);
            }
        }
    }

    #[test]
    fn test_corrects_errors_in_full_length_codeword() {
        let rs = ReedSolomon::new(8).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let original = random_codeword(&rs, &mut rng, MAX_CODEWORD_LEN - 8);
        let mut block = original.clone();
        block[0] ^= 0x01;
        block[254] ^= 0x80;
        block[100] ^= 0xff;
        assert_eq!(rs.decode(&mut block, &[]), Ok(3));
        assert_eq!(block, original);
    }

    #[test]
    fn test_one_error_beyond_capacity_never_restores_original() {
        let rs = ReedSolomon::new(4).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mut failures = 0;
        for _ in 0..500 {
            let original = random_codeword(&rs, &mut rng, 16);
            let mut block = original.clone();
            let _ = corrupt(&mut block, &mut rng, 3);
            let corrupted = block.clone();
            match rs.decode(&mut block, &[]) {
                Err(RsError::Uncorrectable) => {
                    failures += 1;
                    assert_eq!(block, corrupted);
                }
                Ok(_) => assert_ne!(block, original),
                Err(e) => panic!("unexpected error {e:?}"),
            }
        }
        // most patterns beyond the distance are detected
        assert!(failures > 400, "only {failures} failures reported");
    }

    #[test]
    fn test_erasures_and_errors_within_budget() {
        let mut rng = StdRng::seed_from_u64(6);
        for parity in [4usize, 6, 10] {
            let rs = ReedSolomon::new(parity).unwrap();
            for erasures in 0..=parity {
                let errors = (parity - erasures) / 2;
                for _ in 0..50 {
                    let original = random_codeword(&rs, &mut rng, 24);
                    let mut block = original.clone();
                    let positions = corrupt(&mut block, &mut rng, erasures + errors);
                    let known = &positions[..erasures];
                    let fixed = rs.decode(&mut block, known);
                    assert!(fixed.is_ok(), "e={erasures} w={errors} parity={parity}");
                    assert_eq!(block, original);
                }
            }
        }
    }

    #[test]
    fn test_erasure_of_correct_byte_is_harmless() {
        let rs = ReedSolomon::new(4).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let original = random_codeword(&rs, &mut rng, 12);
        let mut block = original.clone();
        block[3] ^= 0x55;
        assert_eq!(rs.decode(&mut block, &[3, 9]), Ok(1));
        assert_eq!(block, original);
    }

    #[test]
    fn test_argument_errors() {
        let rs = ReedSolomon::new(4).unwrap();
        let mut short = [0u8; 4];
        assert_eq!(
            rs.decode(&mut short, &[]),
            Err(RsError::InvalidLength { len: 4 })
        );
        let mut long = [0u8; 256];
        assert!(matches!(
            rs.decode(&mut long, &[]),
            Err(RsError::InvalidLength { len: 256 })
        ));
        let mut block = [0u8; 10];
        block[0] = 1;
        assert_eq!(
            rs.decode(&mut block, &[0, 1, 2, 3, 4]),
            Err(RsError::TooManyErasures { count: 5, max: 4 })
        );
        assert_eq!(
            rs.decode(&mut block, &[10]),
            Err(RsError::ErasureOutOfRange {
                position: 10,
                len: 10
            })
        );
        let mut dst = [0u8; 5];
        assert!(rs.encode(&[1, 2], &mut dst).is_err());
    }
}
