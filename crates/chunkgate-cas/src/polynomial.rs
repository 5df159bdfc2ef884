//! Polynomials over GF(2) for the Rabin fingerprint.
//!
//! Bit `i` of the inner `u64` is the coefficient of `x^i`. Addition is XOR,
//! so there is no carry and no sign.

use std::fmt;
use std::str::FromStr;

use crate::error::CasError;

/// Smallest degree accepted for a chunking polynomial.
///
/// The hash folds one byte at a time, so the modulus must leave room for
/// the eight bits that are shifted above it on every step.
const MIN_DEGREE: i32 = 9;

/// Largest degree accepted for a chunking polynomial.
///
/// Reduction tables store `b(x) * x^deg` for every byte `b` in a `u64`.
const MAX_DEGREE: i32 = 55;

/// A polynomial over GF(2), stored as a bit vector.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pol(u64);

impl Pol {
    /// Create a polynomial from its coefficient bits.
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    /// Return the coefficient bits.
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Degree of the polynomial, or `-1` for the zero polynomial.
    pub fn deg(self) -> i32 {
        63 - self.0.leading_zeros() as i32
    }

    /// Remainder of `self` divided by `d`.
    ///
    /// Dividing by the zero polynomial leaves `self` unchanged.
    pub fn modulo(self, d: Pol) -> Pol {
        if d.0 == 0 {
            return self;
        }

        let mut x = self.0;
        let dd = d.deg();
        while Pol(x).deg() >= dd {
            x ^= d.0 << (Pol(x).deg() - dd);
        }
        Pol(x)
    }

    /// `self * other mod g`, never overflowing for `deg(g) <= 62`.
    fn mul_mod(self, other: Pol, g: Pol) -> Pol {
        let gd = g.deg();
        let mut a = self.modulo(g).0;
        let mut b = other.modulo(g).0;
        let mut res = 0u64;

        while b != 0 {
            if b & 1 == 1 {
                res ^= a;
            }
            b >>= 1;
            a <<= 1;
            if Pol(a).deg() == gd {
                a ^= g.0;
            }
        }

        Pol(res)
    }

    /// Greatest common divisor.
    pub fn gcd(self, other: Pol) -> Pol {
        let (mut a, mut b) = (self, other);
        while b.0 != 0 {
            let r = a.modulo(b);
            a = b;
            b = r;
        }
        a
    }

    /// Test for irreducibility using Ben-Or's algorithm.
    ///
    /// `g` is irreducible iff `gcd(g, x^(2^i) - x) == 1` for every
    /// `1 <= i <= deg(g) / 2`.
    pub fn is_irreducible(self) -> bool {
        let deg = self.deg();
        if deg <= 0 {
            return false;
        }

        (1..=deg / 2).all(|i| {
            let q = x_pow_two_pow(i as u32, self);
            self.gcd(Pol(q.0 ^ 0b10)) == Pol(1)
        })
    }

    /// Check that this polynomial can drive the chunker.
    pub fn validate(self) -> Result<(), CasError> {
        let deg = self.deg();
        if !(MIN_DEGREE..=MAX_DEGREE).contains(&deg) {
            return Err(CasError::InvalidPolynomial {
                pol: self.to_string(),
                reason: "degree must be between 9 and 55",
            });
        }
        if !self.is_irreducible() {
            return Err(CasError::InvalidPolynomial {
                pol: self.to_string(),
                reason: "polynomial is reducible",
            });
        }
        Ok(())
    }
}

/// `x^(2^p) mod g`, by repeated squaring of `x`.
fn x_pow_two_pow(p: u32, g: Pol) -> Pol {
    let mut res = Pol(0b10);
    for _ in 0..p {
        res = res.mul_mod(res, g);
    }
    res
}

impl fmt::Display for Pol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for Pol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pol({self})")
    }
}

impl FromStr for Pol {
    type Err = std::num::ParseIntError;

    /// Parse hex, with or without a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u64::from_str_radix(digits, 16).map(Pol)
    }
}
