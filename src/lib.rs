mod bucket;
pub mod config;
pub mod difficulty;
pub mod error;
pub mod farm;
pub mod format;
pub mod hash_chain;
pub mod interrupt;
pub mod naming;
pub mod plot_verification;
pub mod plotting;
pub mod prove;
pub mod quality;
mod reader;
pub mod store;
pub mod verification;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

pub use error::{Error, Result};
pub use plotting::build_plot;
pub use prove::{find_proof, Proof};
pub use quality::{score_proof, Quality};
pub use verification::verify_proof;

/// A challenge a prover answers with a [Proof].
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Challenge(#[serde_as(as = "serde_with::hex::Hex")] pub [u8; 32]);
