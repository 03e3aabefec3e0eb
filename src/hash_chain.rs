//! Keyed hash derivations shared by plotting and verification.
//!
//! Every role (seed, public key digest, entry digest) hashes in its own
//! BLAKE3 mode or derive-key context, so outputs of different roles never
//! collide even when fed the same bytes.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

const SEED_CONTEXT: &str = "pos-rs 2024-06-01 plot seed";
const PUBLIC_KEY_CONTEXT: &str = "pos-rs 2024-06-01 public key digest";

/// Digest width stored for each entry.
pub const Y_SIZE: usize = 8;

/// Plot-specific nonce the seed is derived from.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlotNonce(#[serde_as(as = "serde_with::hex::Hex")] pub [u8; 32]);

impl PlotNonce {
    /// Draw a fresh nonce from the thread-local CSPRNG.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Nonce binding a plot to the content of the source it was built for.
    pub fn from_source(reader: &mut impl std::io::Read) -> std::io::Result<Self> {
        let mut hasher = blake3::Hasher::new();
        std::io::copy(reader, &mut hasher)?;
        Ok(Self(hasher.finalize().into()))
    }
}

/// Key of the hash chain for a single plot.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlotSeed(#[serde_as(as = "serde_with::hex::Hex")] pub [u8; 32]);

impl std::fmt::Debug for PlotSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PlotSeed({})", hex::encode(self.0))
    }
}

pub fn public_key_digest(public_key: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(PUBLIC_KEY_CONTEXT);
    hasher.update(public_key);
    hasher.finalize().into()
}

/// Derive the seed of a plot owned by `public_key`.
pub fn derive_seed(public_key: &[u8], nonce: &PlotNonce) -> PlotSeed {
    derive_seed_from_digest(&public_key_digest(public_key), nonce)
}

pub(crate) fn derive_seed_from_digest(public_key_digest: &[u8; 32], nonce: &PlotNonce) -> PlotSeed {
    let mut hasher = blake3::Hasher::new_derive_key(SEED_CONTEXT);
    hasher.update(public_key_digest);
    hasher.update(&nonce.0);
    PlotSeed(hasher.finalize().into())
}

/// The keyed hash chain of one plot.
#[derive(Debug, Clone)]
pub struct HashChain {
    hasher: blake3::Hasher,
}

impl HashChain {
    pub fn new(seed: &PlotSeed) -> Self {
        Self {
            hasher: blake3::Hasher::new_keyed(&seed.0),
        }
    }

    /// Full 32-byte digest of `x`.
    pub fn digest(&self, x: u64) -> [u8; 32] {
        // Cloning the keyed hasher reuses the key schedule.
        let mut hasher = self.hasher.clone();
        hasher.update(&x.to_le_bytes());
        hasher.finalize().into()
    }

    /// `y` of entry `x`: the leading [Y_SIZE] bytes of its digest, big-endian.
    #[inline]
    pub fn derive(&self, x: u64) -> u64 {
        let digest = self.digest(x);
        let mut y = [0u8; Y_SIZE];
        y.copy_from_slice(&digest[..Y_SIZE]);
        u64::from_be_bytes(y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn derive_is_deterministic() {
        let chain = HashChain::new(&PlotSeed([7u8; 32]));
        assert_eq!(chain.derive(42), chain.derive(42));
        assert_eq!(chain.derive(42), HashChain::new(&PlotSeed([7u8; 32])).derive(42));
    }

    #[test]
    fn y_is_digest_prefix() {
        let chain = HashChain::new(&PlotSeed([1u8; 32]));
        let digest = chain.digest(1000);
        assert_eq!(chain.derive(1000).to_be_bytes(), digest[..8]);
    }

    #[test]
    fn seed_binds_public_key_and_nonce() {
        let nonce = PlotNonce([3u8; 32]);
        let seed = derive_seed(b"alice", &nonce);
        assert_eq!(seed, derive_seed(b"alice", &nonce));
        assert_ne!(seed, derive_seed(b"bob", &nonce));
        assert_ne!(seed, derive_seed(b"alice", &PlotNonce([4u8; 32])));
        assert_eq!(
            seed,
            derive_seed_from_digest(&public_key_digest(b"alice"), &nonce)
        );
    }

    #[test]
    fn nonce_from_source_is_content_digest() {
        let data = b"some archived file".to_vec();
        let nonce = PlotNonce::from_source(&mut data.as_slice()).unwrap();
        assert_eq!(<[u8; 32]>::from(blake3::hash(&data)), nonce.0);
    }

    proptest! {
        #[test]
        fn different_seeds_give_different_digests(a: [u8; 32], b: [u8; 32], x: u64) {
            let da = HashChain::new(&PlotSeed(a)).digest(x);
            let db = HashChain::new(&PlotSeed(b)).digest(x);
            if a != b {
                assert_ne!(da, db);
            } else {
                assert_eq!(da, db);
            }
        }

        #[test]
        fn different_indices_give_different_digests(seed: [u8; 32], a: u64, b: u64) {
            let chain = HashChain::new(&PlotSeed(seed));
            if a != b {
                assert_ne!(chain.digest(a), chain.digest(b));
            } else {
                assert_eq!(chain.digest(a), chain.digest(b));
            }
        }
    }
}
