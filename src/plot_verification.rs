//! Plot data verification.
//!
//! Reads a finished plot from start to end and checks that its table is
//! sorted, matches the digest in the header, and that a random `fraction`
//! (in %) of its entries derive from the plot seed. Entries are sampled
//! and checked batch by batch, so memory use doesn't grow with the plot.
//!
//! Verifying 100% also proves every `x` appears exactly once: equal `x`
//! derive equal `y`, so a repeated `x` would sit next to itself in the
//! sorted table.

use std::{
    fs::File,
    io::{BufReader, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use rand::{distributions::Bernoulli, Rng};
use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};

use crate::{
    format::{Entry, EntryRecord, ENTRY_SIZE, HEADER_SIZE},
    hash_chain::HashChain,
    reader::{plot_files, BatchingReader},
    store::{Plot, PlotTable},
};

/// Entries read per batch.
const BATCH_ENTRIES: usize = 1 << 16;

#[derive(Debug, thiserror::Error)]
pub enum PlotVerificationError {
    #[error("entry {index} of {path} is out of order")]
    Unsorted { path: PathBuf, index: u64 },
    #[error("table of {path} doesn't match the digest in its header")]
    TableDigestMismatch { path: PathBuf },
    #[error("invalid entry {index} in {path}")]
    InvalidEntry { path: PathBuf, index: u64 },
    #[error("x ({x}) appears more than once in {path}")]
    DuplicateIndex { path: PathBuf, x: u64 },
    #[error("fraction of entries to verify must be within 0..=100 (got {0})")]
    InvalidFraction(f64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Plot(#[from] crate::error::Error),
}

/// Verify every plot in `dir`.
pub fn verify_plots(dir: &Path, fraction: f64) -> Result<(), PlotVerificationError> {
    for path in plot_files(dir)? {
        verify_plot(&path, fraction)?;
    }
    Ok(())
}

pub fn verify_plot(path: &Path, fraction: f64) -> Result<(), PlotVerificationError> {
    let sampling = if fraction >= 100.0 { 1.0 } else { fraction / 100.0 };
    let sampling =
        Bernoulli::new(sampling).map_err(|_| PlotVerificationError::InvalidFraction(fraction))?;

    log::info!("verifying plot {} ({fraction}% of entries)", path.display());
    let plot = Plot::open(path)?;
    let header = plot.header().clone();
    let num_entries = header.num_entries();
    let chain = HashChain::new(&header.seed);
    let mut rng = rand::thread_rng();

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
    let reader = BatchingReader::new(
        BufReader::new(file),
        HEADER_SIZE as u64,
        BATCH_ENTRIES * ENTRY_SIZE,
        num_entries * ENTRY_SIZE as u64,
    );

    let mut hasher = blake3::Hasher::new();
    let mut previous: Option<Entry> = None;
    let mut sampled = Vec::new();
    let mut verified = 0u64;
    for batch in reader {
        let batch = batch?;
        hasher.update(&batch.data);
        let first = (batch.pos - HEADER_SIZE as u64) / ENTRY_SIZE as u64;
        let records: &[EntryRecord] = bytemuck::cast_slice(&batch.data);

        sampled.clear();
        for (offset, record) in records.iter().enumerate() {
            let index = first + offset as u64;
            let entry = record.entry();
            match previous {
                Some(prev) if entry < prev => {
                    return Err(PlotVerificationError::Unsorted {
                        path: path.to_owned(),
                        index,
                    })
                }
                Some(prev) if entry == prev => {
                    return Err(PlotVerificationError::DuplicateIndex {
                        path: path.to_owned(),
                        x: entry.x,
                    })
                }
                _ => previous = Some(entry),
            }
            if entry.x >= num_entries {
                return Err(PlotVerificationError::InvalidEntry {
                    path: path.to_owned(),
                    index,
                });
            }
            if rng.sample(sampling) {
                sampled.push((index, entry));
            }
        }

        sampled
            .par_iter()
            .try_for_each(|&(index, entry)| -> Result<(), PlotVerificationError> {
                if chain.derive(entry.x) != entry.y {
                    return Err(PlotVerificationError::InvalidEntry {
                        path: path.to_owned(),
                        index,
                    });
                }
                Ok(())
            })?;
        verified += sampled.len() as u64;
    }

    if <[u8; 32]>::from(hasher.finalize()) != header.table_digest {
        return Err(PlotVerificationError::TableDigestMismatch {
            path: path.to_owned(),
        });
    }

    log::info!(
        "plot {} verified ({verified} of {num_entries} entries recomputed)",
        path.display()
    );
    Ok(())
}
