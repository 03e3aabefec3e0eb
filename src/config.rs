use std::{fs::File, io::BufReader, path::Path, path::PathBuf};

use serde::Deserialize;

use crate::format::MIN_K;

/// Which CPU cores a worker pool runs on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cores {
    /// One thread per available core.
    #[default]
    All,
    /// The given number of unpinned threads.
    Any(usize),
    /// One thread pinned to each of the listed core IDs.
    Pin(Vec<usize>),
}

/// Build a rayon pool honoring `cores`.
pub fn create_thread_pool(cores: &Cores) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    let builder = rayon::ThreadPoolBuilder::new();
    match cores {
        Cores::All => builder.build(),
        Cores::Any(n) => builder.num_threads(*n).build(),
        Cores::Pin(ids) => {
            let available = core_affinity::get_core_ids().unwrap_or_default();
            let pinned: Vec<_> = available
                .into_iter()
                .filter(|core| ids.contains(&core.id))
                .collect();
            if pinned.len() != ids.len() {
                log::warn!(
                    "only {} of requested cores {ids:?} are available",
                    pinned.len()
                );
            }
            let threads = pinned.len().max(1);
            builder
                .num_threads(threads)
                .start_handler(move |idx| {
                    if let Some(core) = pinned.get(idx) {
                        if !core_affinity::set_for_current(*core) {
                            log::warn!("failed to pin thread {idx} to core {}", core.id);
                        }
                    }
                })
                .build()
        }
    }
}

/// Plot construction configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// Size parameter of the plot (2^k entries).
    /// Derived from the size of the plotted source when not set.
    pub k: Option<u8>,
    /// Maximal number of entries sorted in memory at once.
    pub max_bucket_entries: u64,
    /// Number of entries hashed per batch.
    pub batch_size: usize,
    /// Directory for temporary bucket files. Defaults to the plot's directory.
    pub tmp_dir: Option<PathBuf>,
    pub cores: Cores,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            k: None,
            max_bucket_entries: 1 << 22,
            batch_size: 1 << 16,
            tmp_dir: None,
            cores: Cores::All,
        }
    }
}

/// Proof lookup and verification configuration (network parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProofConfig {
    /// Bits of the challenge prefix matched on top of `k`.
    /// Higher values make a plot less likely to answer a challenge.
    pub extra_prefix_bits: u8,
    /// Smallest plot size accepted as a proof.
    /// Plots below it are cheap enough to compute on demand.
    pub min_k: u8,
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            extra_prefix_bits: 0,
            min_k: MIN_K,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub plot: PlotConfig,
    pub proof: ProofConfig,
}

pub fn load(path: &Path) -> eyre::Result<Config> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let cfg = serde_json::from_reader(reader)?;
    Ok(cfg)
}
