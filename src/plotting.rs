//! Building plots.
//!
//! Entries are hashed in batches on a rayon pool and spread over temporary
//! bucket files by the leading bits of `y`, in as many levels as it takes
//! for a bucket to fit `max_bucket_entries`. Each bucket is then sorted in
//! memory and appended to a hidden temporary file next to the output.
//! Only a complete table gets a valid header, and only then is the file
//! renamed into place.

use std::{
    fs::{create_dir_all, File},
    io::{BufReader, BufWriter, Seek, SeekFrom, Write},
    ops::Range,
    path::{Path, PathBuf},
    time::Instant,
};

use rayon::prelude::{IntoParallelIterator, ParallelIterator, ParallelSliceMut};
use tempfile::NamedTempFile;

use crate::{
    bucket::{bucket_bits, BucketArena, MAX_BUCKET_BITS},
    config::{create_thread_pool, PlotConfig},
    error::{Error, Result, Stage},
    format::{
        ensure_k, num_entries, Entry, EntryRecord, PlotHeader, ENTRY_SIZE, FORMAT_VERSION,
        HEADER_SIZE, MAX_K, MIN_K,
    },
    hash_chain::{derive_seed_from_digest, public_key_digest, HashChain, PlotNonce},
    interrupt::Interrupt,
    store::Plot,
};

/// Derive the records of entries `xs`.
pub fn hash_entries(chain: &HashChain, xs: Range<u64>) -> Vec<EntryRecord> {
    log::trace!("hashing entries {xs:?}");
    xs.into_par_iter()
        .map(|x| {
            EntryRecord::from(Entry {
                y: chain.derive(x),
                x,
            })
        })
        .collect()
}

/// Smallest `k` whose plot table holds at least `bytes` bytes,
/// within [MIN_K]..=[MAX_K].
pub fn k_for_size(bytes: u64) -> u8 {
    let entries = bytes.div_ceil(ENTRY_SIZE as u64).max(1);
    let k = entries.next_power_of_two().ilog2() as u8;
    k.clamp(MIN_K, MAX_K)
}

/// Build the plot of the file at `source` into `output`.
///
/// The plot nonce is the digest of the source content. Its size comes from
/// `config.k`, or from the size of the source if that is not set.
pub fn build_plot(
    source: &Path,
    output: &Path,
    public_key: &[u8],
    config: &PlotConfig,
    interrupt: &Interrupt,
) -> Result<Plot> {
    // Refuse before reading a possibly large source.
    if let Some(k) = config.k {
        ensure_k(k)?;
    }
    if output.exists() {
        return Err(Error::PlotExists(output.to_owned()));
    }

    let file = File::open(source).map_err(Error::io(source, Stage::Seeding))?;
    let size = file
        .metadata()
        .map_err(Error::io(source, Stage::Seeding))?
        .len();
    let nonce = PlotNonce::from_source(&mut BufReader::new(file))
        .map_err(Error::io(source, Stage::Seeding))?;
    let k = config.k.unwrap_or_else(|| k_for_size(size));
    log::debug!(
        "plotting {} ({size} bytes) with k={k}",
        source.display()
    );

    PlotBuilder::new(config.clone()).build(output, k, public_key, &nonce, interrupt)
}

pub struct PlotBuilder {
    config: PlotConfig,
}

impl PlotBuilder {
    pub fn new(config: PlotConfig) -> Self {
        Self { config }
    }

    /// Build a plot of `2^k` entries owned by `public_key` at `output`.
    ///
    /// An existing file at `output` is never overwritten. Whichever way this
    /// returns, no temporary files are left behind.
    pub fn build(
        &self,
        output: &Path,
        k: u8,
        public_key: &[u8],
        nonce: &PlotNonce,
        interrupt: &Interrupt,
    ) -> Result<Plot> {
        ensure_k(k)?;
        if public_key.is_empty() {
            return Err(Error::InvalidParameters("public key is empty".into()));
        }
        if self.config.batch_size == 0 || self.config.max_bucket_entries == 0 {
            return Err(Error::InvalidParameters(
                "batch size and bucket size must be positive".into(),
            ));
        }
        if output.exists() {
            return Err(Error::PlotExists(output.to_owned()));
        }

        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        create_dir_all(dir).map_err(Error::io(dir, Stage::Bucketing))?;
        let tmp_dir = self.config.tmp_dir.as_deref().unwrap_or(dir);
        create_dir_all(tmp_dir).map_err(Error::io(tmp_dir, Stage::Bucketing))?;

        let pool = create_thread_pool(&self.config.cores)
            .map_err(|e| Error::InvalidParameters(format!("building thread pool: {e}")))?;

        let pk_digest = public_key_digest(public_key);
        let seed = derive_seed_from_digest(&pk_digest, nonce);
        let chain = HashChain::new(&seed);

        let bits = bucket_bits(k, self.config.max_bucket_entries);
        let top_bits = bits.min(MAX_BUCKET_BITS);
        log::info!(
            "plotting {} (k={k}, {} buckets, {} threads)",
            output.display(),
            1u64 << bits,
            pool.current_num_threads()
        );
        let started = Instant::now();

        let mut arena = BucketArena::new(tmp_dir, 0, top_bits)?;
        pool.install(|| self.fill_buckets(&chain, k, &mut arena, output, interrupt))?;
        arena.seal()?;
        log::debug!(
            "bucketed {} entries in {:.2}s",
            num_entries(k),
            started.elapsed().as_secs_f64()
        );

        let mut table = tempfile::Builder::new()
            .prefix(".plot-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(Error::io(dir, Stage::Sorting))?;
        let table_digest = write_table(
            &pool,
            &mut arena,
            bits - top_bits,
            &mut table,
            output,
            interrupt,
        )?;
        // Bucket files are all consumed by now.
        drop(arena);

        let header = PlotHeader {
            version: FORMAT_VERSION,
            k,
            nonce: *nonce,
            seed,
            public_key_digest: pk_digest,
            table_digest,
        };
        interrupt.check(output, Stage::Publishing)?;
        publish(table, &header, output)?;

        log::info!(
            "plotted {} in {:.2}s",
            output.display(),
            started.elapsed().as_secs_f64()
        );
        Plot::open(output)
    }

    fn fill_buckets(
        &self,
        chain: &HashChain,
        k: u8,
        arena: &mut BucketArena,
        output: &Path,
        interrupt: &Interrupt,
    ) -> Result<()> {
        let total = num_entries(k);
        let mut start = 0;
        while start < total {
            interrupt.check(output, Stage::Bucketing)?;
            let end = total.min(start + self.config.batch_size as u64);
            let records = hash_entries(chain, start..end);
            arena.push(&records)?;
            start = end;
        }
        Ok(())
    }
}

/// Write a placeholder header followed by all buckets, each sorted, in bucket
/// order. Buckets are split by the `split_bits` following the arena's own
/// before being sorted. Returns the digest of the table.
fn write_table(
    pool: &rayon::ThreadPool,
    arena: &mut BucketArena,
    split_bits: u8,
    table: &mut NamedTempFile,
    output: &Path,
    interrupt: &Interrupt,
) -> Result<[u8; 32]> {
    let path = table.path().to_owned();
    let mut writer = TableWriter {
        pool,
        out: BufWriter::new(table.as_file_mut()),
        path,
        hasher: blake3::Hasher::new(),
        output,
        interrupt,
    };
    writer
        .out
        .write_all(&[0u8; HEADER_SIZE])
        .map_err(Error::io(&writer.path, Stage::Sorting))?;
    writer.write_buckets(arena, split_bits)?;
    writer
        .out
        .flush()
        .map_err(Error::io(&writer.path, Stage::Sorting))?;
    Ok(writer.hasher.finalize().into())
}

struct TableWriter<'a, W> {
    pool: &'a rayon::ThreadPool,
    out: W,
    path: PathBuf,
    hasher: blake3::Hasher,
    output: &'a Path,
    interrupt: &'a Interrupt,
}

impl<W: Write> TableWriter<'_, W> {
    fn write_buckets(&mut self, arena: &mut BucketArena, split_bits: u8) -> Result<()> {
        for idx in 0..arena.len() {
            self.interrupt.check(self.output, Stage::Sorting)?;
            if split_bits > 0 {
                let bits = split_bits.min(MAX_BUCKET_BITS);
                let mut child = arena.split(idx, bits)?;
                self.write_buckets(&mut child, split_bits - bits)?;
                continue;
            }

            let mut records = arena.take(idx)?;
            self.pool
                .install(|| records.par_sort_unstable_by_key(EntryRecord::key));
            log::trace!("sorted bucket {idx} ({} entries)", records.len());

            let bytes: &[u8] = bytemuck::cast_slice(&records);
            self.hasher.update(bytes);
            self.out
                .write_all(bytes)
                .map_err(Error::io(&self.path, Stage::Sorting))?;
        }
        Ok(())
    }
}

/// Give the table its header and move it to `output`.
fn publish(mut table: NamedTempFile, header: &PlotHeader, output: &Path) -> Result<()> {
    let file = table.as_file_mut();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.write_all(&header.encode()))
        .and_then(|_| file.sync_all())
        .map_err(Error::io(output, Stage::Publishing))?;

    table.persist_noclobber(output).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            Error::PlotExists(output.to_owned())
        } else {
            Error::io(output, Stage::Publishing)(e.error)
        }
    })?;
    Ok(())
}
