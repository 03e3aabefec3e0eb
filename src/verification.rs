//! Verifying proofs without access to the plot.
//!
//! A proof is valid for a challenge and a public key if:
//! - it answers that challenge,
//! - its `k` is a supported plot size, at least the configured `min_k`,
//!   and `x` indexes an entry of such a plot,
//! - its seed is derived from the public key and the plot nonce,
//! - the recomputed `y` of entry `x` starts with the challenge prefix.
//!
//! The verifier keeps no state between calls.

use crate::{
    config::ProofConfig,
    difficulty::{lookup_prefix_bits, Prefix},
    format::{ensure_k, num_entries},
    hash_chain::{derive_seed, HashChain},
    prove::Proof,
    Challenge,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("proof answers a different challenge")]
    ChallengeMismatch,
    #[error("unsupported plot size k={0}")]
    InvalidK(u8),
    #[error("plot size k={k} is below the minimum of {min_k}")]
    PlotTooSmall { k: u8, min_k: u8 },
    #[error("x ({x}) is out of range for k={k}")]
    IndexOutOfRange { x: u64, k: u8 },
    #[error("plot seed is not derived from the public key")]
    IdentityMismatch,
    #[error("y ({y:#018x}) doesn't start with prefix {prefix:#x} ({bits} bits)")]
    PrefixMismatch { y: u64, prefix: u64, bits: u8 },
    #[error("invalid verification parameters: {0}")]
    InvalidParameters(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Verifier {
    config: ProofConfig,
}

impl Verifier {
    pub fn new(config: ProofConfig) -> Self {
        Self { config }
    }

    pub fn verify(
        &self,
        proof: &Proof,
        challenge: &Challenge,
        public_key: &[u8],
    ) -> Result<(), VerificationError> {
        if proof.challenge != *challenge {
            return Err(VerificationError::ChallengeMismatch);
        }
        ensure_k(proof.k).map_err(|_| VerificationError::InvalidK(proof.k))?;
        if proof.k < self.config.min_k {
            return Err(VerificationError::PlotTooSmall {
                k: proof.k,
                min_k: self.config.min_k,
            });
        }
        if proof.x >= num_entries(proof.k) {
            return Err(VerificationError::IndexOutOfRange {
                x: proof.x,
                k: proof.k,
            });
        }
        if public_key.is_empty() || derive_seed(public_key, &proof.nonce) != proof.seed {
            return Err(VerificationError::IdentityMismatch);
        }

        let bits = lookup_prefix_bits(proof.k, self.config.extra_prefix_bits)
            .map_err(|e| VerificationError::InvalidParameters(e.to_string()))?;
        let prefix = Prefix::from_challenge(challenge, bits)
            .map_err(|e| VerificationError::InvalidParameters(e.to_string()))?;
        let y = HashChain::new(&proof.seed).derive(proof.x);
        if !prefix.matches(y) {
            return Err(VerificationError::PrefixMismatch {
                y,
                prefix: prefix.value(),
                bits,
            });
        }
        Ok(())
    }
}

/// Accept or reject `proof` for `challenge` made by the owner of `public_key`.
pub fn verify_proof(proof: &Proof, challenge: &Challenge, public_key: &[u8]) -> bool {
    match Verifier::default().verify(proof, challenge, public_key) {
        Ok(()) => true,
        Err(e) => {
            log::debug!("rejected proof: {e}");
            false
        }
    }
}
