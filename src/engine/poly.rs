// Polynomials
// Fixed-length coefficient vectors under a shared modulus
use crate::engine::error::{OffloadError, OffloadResult};
use crate::engine::kernels::{self, OpMode};

/// Representation tag. Carried along and compared, never interpreted by the
/// elementwise core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolyFormat {
    #[default]
    Coefficient,
    Evaluation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolyParams {
    pub n: usize,
    pub q: u32,
    pub fmt: PolyFormat,
}

impl PolyParams {
    pub fn new(n: usize, q: u32) -> OffloadResult<Self> {
        if q == 0 {
            return Err(OffloadError::InvalidModulus(0));
        }
        Ok(Self {
            n,
            q,
            fmt: PolyFormat::Coefficient,
        })
    }

    pub fn with_format(mut self, fmt: PolyFormat) -> Self {
        self.fmt = fmt;
        self
    }
}

/// Seeded, reproducible coefficient source.
///
/// Each coefficient is a pure function of `(seed, index)`, so any index can be
/// sampled independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformGenerator {
    seed: u64,
}

impl UniformGenerator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    #[inline]
    pub fn sample_mod(&self, q: u32, idx: u64) -> u32 {
        (splitmix64(self.seed ^ idx) % q as u64) as u32
    }
}

#[inline(always)]
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// Polynomial of length `params.n` with every coefficient in [0, q).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poly {
    params: PolyParams,
    coeffs: Vec<u32>,
}

impl Poly {
    pub fn zero(params: PolyParams) -> Self {
        Self {
            params,
            coeffs: vec![0; params.n],
        }
    }

    pub fn sample(params: PolyParams, gen: &UniformGenerator) -> Self {
        let coeffs = (0..params.n as u64)
            .map(|i| gen.sample_mod(params.q, i))
            .collect();
        Self { params, coeffs }
    }

    /// Takes ownership of an external vector, reducing every entry mod q.
    pub fn from_vec(params: PolyParams, mut coeffs: Vec<u32>) -> OffloadResult<Self> {
        if coeffs.len() != params.n {
            return Err(OffloadError::LengthMismatch {
                op: "poly from vec",
                lhs: params.n,
                rhs: coeffs.len(),
            });
        }
        coeffs.iter_mut().for_each(|c| *c %= params.q);
        Ok(Self { params, coeffs })
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn modulus(&self) -> u32 {
        self.params.q
    }

    pub fn params(&self) -> &PolyParams {
        &self.params
    }

    pub fn coeffs(&self) -> &[u32] {
        &self.coeffs
    }

    pub fn into_coeffs(self) -> Vec<u32> {
        self.coeffs
    }

    /// Elementwise `mode` against `other`, computed on the host in one pass.
    pub fn apply(&self, other: &Poly, mode: OpMode) -> OffloadResult<Poly> {
        self.check_compatible(other, "poly apply")?;
        let mut out = Poly::zero(self.params);
        kernels::apply(mode, self.params.q, &self.coeffs, &other.coeffs, &mut out.coeffs)?;
        Ok(out)
    }

    pub fn add(&self, other: &Poly) -> OffloadResult<Poly> {
        self.apply(other, OpMode::Add)
    }

    pub fn mul(&self, other: &Poly) -> OffloadResult<Poly> {
        self.apply(other, OpMode::Mul)
    }

    pub(crate) fn check_compatible(&self, other: &Poly, op: &'static str) -> OffloadResult<()> {
        if self.params.n != other.params.n
            || self.params.q != other.params.q
            || self.params.fmt != other.params.fmt
        {
            return Err(OffloadError::ParamMismatch {
                op,
                lhs_n: self.params.n,
                lhs_q: self.params.q,
                rhs_n: other.params.n,
                rhs_q: other.params.q,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splitmix_known_vector() {
        // First output of the reference SplitMix64 stream seeded with 0.
        assert_eq!(splitmix64(0), 0xe220_a839_7b1d_cdaf);
    }

    #[test]
    fn same_seed_same_poly() {
        let params = PolyParams::new(257, 65537).unwrap();
        let a = Poly::sample(params, &UniformGenerator::new(42));
        let b = Poly::sample(params, &UniformGenerator::new(42));
        let c = Poly::sample(params, &UniformGenerator::new(43));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.coeffs().iter().all(|&x| x < 65537));
    }

    #[test]
    fn from_vec_reduces_and_checks_length() {
        let params = PolyParams::new(3, 7).unwrap();
        let p = Poly::from_vec(params, vec![7, 8, 20]).unwrap();
        assert_eq!(p.coeffs(), &[0, 1, 6]);
        assert!(Poly::from_vec(params, vec![1, 2]).is_err());
    }

    #[test]
    fn zero_modulus_rejected() {
        assert!(matches!(PolyParams::new(4, 0), Err(OffloadError::InvalidModulus(0))));
    }

    #[test]
    fn apply_rejects_mismatched_params() {
        let a = Poly::zero(PolyParams::new(4, 17).unwrap());
        let b = Poly::zero(PolyParams::new(4, 19).unwrap());
        let c = Poly::zero(PolyParams::new(5, 17).unwrap());
        let d = Poly::zero(PolyParams::new(4, 17).unwrap().with_format(PolyFormat::Evaluation));
        assert!(matches!(a.add(&b), Err(OffloadError::ParamMismatch { .. })));
        assert!(a.mul(&c).is_err());
        assert!(a.add(&d).is_err());
    }

    #[test]
    fn host_ops_match_scalar_kernel() {
        let params = PolyParams::new(100, 97).unwrap();
        let a = Poly::sample(params, &UniformGenerator::new(1));
        let b = Poly::sample(params, &UniformGenerator::new(2));
        let sum = a.add(&b).unwrap();
        let prod = a.mul(&b).unwrap();
        for i in 0..100 {
            let (x, y) = (a.coeffs()[i] as u64, b.coeffs()[i] as u64);
            assert_eq!(sum.coeffs()[i] as u64, (x + y) % 97);
            assert_eq!(prod.coeffs()[i] as u64, (x * y) % 97);
        }
    }
}
