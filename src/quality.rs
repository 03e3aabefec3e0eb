//! Proof quality.
//!
//! The quality of a proof is a 256-bit number derived from the challenge,
//! the proven entry and the public key of the plot owner. It is uniformly
//! distributed, and a higher quality is better.

use std::fmt;

use primitive_types::U256;

use crate::{hash_chain::public_key_digest, prove::Proof, Challenge};

const QUALITY_CONTEXT: &str = "pos-rs 2024-06-01 proof quality";

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quality(pub U256);

impl Quality {
    /// The quality normalized into `[0, 1)`.
    pub fn to_f64(&self) -> f64 {
        // The top 53 bits fill the mantissa exactly.
        let top = (self.0 >> (256usize - 53)).low_u64();
        top as f64 / (1u64 << 53) as f64
    }
}

impl fmt::Debug for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Quality({:#x})", self.0)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.to_f64())
    }
}

/// Score a proof for `challenge` made by the owner of `public_key`.
///
/// Pure: the same inputs always give the same quality.
pub fn score_proof(proof: &Proof, challenge: &Challenge, public_key: &[u8]) -> Quality {
    score(challenge, proof.x, &public_key_digest(public_key))
}

pub(crate) fn score(challenge: &Challenge, x: u64, public_key_digest: &[u8; 32]) -> Quality {
    let mut hasher = blake3::Hasher::new_derive_key(QUALITY_CONTEXT);
    hasher.update(&challenge.0);
    hasher.update(&x.to_le_bytes());
    hasher.update(public_key_digest);
    Quality(U256::from_big_endian(hasher.finalize().as_bytes()))
}
