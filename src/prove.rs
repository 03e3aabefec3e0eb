//! Answering challenges with [proofs](Proof) that a plot is still held.
//!
//! # proving algorithm
//! Each plot is asked for the entries whose `y` starts with the leading
//! `k + extra_prefix_bits` bits of the challenge (see [crate::difficulty]).
//! Every matching entry is a candidate proof. Candidates of all plots are
//! ranked by their [Quality] and the best one is the answer.

use std::{cmp::Reverse, path::Path};

use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

use crate::{
    config::ProofConfig,
    difficulty::{lookup_prefix_bits, Prefix},
    error::Result,
    hash_chain::{PlotNonce, PlotSeed},
    quality::{score, Quality},
    store::{PlotStore, PlotTable},
    Challenge,
};

/// Everything a verifier needs to check that the prover holds an entry
/// matching the challenge in a plot bound to its public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub k: u8,
    pub nonce: PlotNonce,
    pub seed: PlotSeed,
    pub x: u64,
    pub challenge: Challenge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub proof: Proof,
    pub quality: Quality,
}

/// All proofs `tables` hold for `challenge`, best quality first.
///
/// The tables are searched in parallel. The first failing lookup fails the
/// whole search.
pub fn find_proofs<T: PlotTable + Sync>(
    tables: &[T],
    challenge: &Challenge,
    config: ProofConfig,
) -> Result<Vec<Candidate>> {
    let mut candidates = tables
        .par_iter()
        .map(|table| candidates_in(table, challenge, config))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();
    candidates.sort_by_key(|c| Reverse(c.quality));
    Ok(candidates)
}

fn candidates_in<T: PlotTable>(
    table: &T,
    challenge: &Challenge,
    config: ProofConfig,
) -> Result<Vec<Candidate>> {
    let header = table.header();
    if header.k < config.min_k {
        log::debug!("skipping plot with k={} below {}", header.k, config.min_k);
        return Ok(Vec::new());
    }
    let bits = lookup_prefix_bits(header.k, config.extra_prefix_bits)?;
    let prefix = Prefix::from_challenge(challenge, bits)?;
    let candidates = table
        .range_lookup(prefix)?
        .into_iter()
        .map(|entry| Candidate {
            proof: Proof {
                k: header.k,
                nonce: header.nonce,
                seed: header.seed,
                x: entry.x,
                challenge: *challenge,
            },
            quality: score(challenge, entry.x, &header.public_key_digest),
        })
        .collect();
    Ok(candidates)
}

/// Find the best proof the plots in `plot_dir` hold for `challenge`.
///
/// Returns `None` if no plot has an entry matching the challenge.
pub fn find_proof(challenge: &Challenge, plot_dir: &Path) -> Result<Option<Proof>> {
    find_proof_with(challenge, plot_dir, ProofConfig::default())
}

pub fn find_proof_with(
    challenge: &Challenge,
    plot_dir: &Path,
    config: ProofConfig,
) -> Result<Option<Proof>> {
    let store = PlotStore::open_dir(plot_dir)?;
    let candidates = find_proofs(store.plots(), challenge, config)?;
    log::info!(
        "found {} candidate proofs in {} plots",
        candidates.len(),
        store.plots().len()
    );
    Ok(candidates.into_iter().next().map(|c| c.proof))
}
