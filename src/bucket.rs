//! Temporary bucket files of the external sort.
//!
//! Buckets live in a private temporary directory and are addressed only by
//! their index. The directory (and whatever is left in it) is removed when
//! the arena is dropped, whichever way plotting ends.
//!
//! A table needing more than `2^MAX_BUCKET_BITS` buckets is partitioned in
//! levels: each bucket of one level is split by the next bits of `y` into an
//! arena of its own, so no more than `2^MAX_BUCKET_BITS` files are open at once.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use bytemuck::Zeroable;
use tempfile::TempDir;

use crate::{
    error::{Error, Result, Stage},
    format::EntryRecord,
};

/// Bits of `y` a single level of buckets partitions by.
pub const MAX_BUCKET_BITS: u8 = 8;

/// Records moved at once when splitting a bucket.
const SPLIT_CHUNK: usize = 1 << 16;

/// Bits of `y` selecting the bucket, so that a bucket of a `2^k` table
/// holds at most `max_entries` entries on average.
pub fn bucket_bits(k: u8, max_entries: u64) -> u8 {
    let entries = 1u64 << k;
    let buckets = entries.div_ceil(max_entries.max(1));
    let bits = buckets.next_power_of_two().ilog2() as u8;
    bits.min(k)
}

pub(crate) struct BucketArena {
    // Declared before `dir` so files are closed before the directory goes.
    writers: Vec<Option<BufWriter<File>>>,
    counts: Vec<u64>,
    /// Leading bits of `y` already fixed by the levels above.
    shift: u8,
    bits: u8,
    dir: TempDir,
}

impl BucketArena {
    /// Create `2^bits` buckets partitioning by the bits of `y` after the
    /// leading `shift`.
    pub(crate) fn new(parent: &Path, shift: u8, bits: u8) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(".plot-buckets-")
            .tempdir_in(parent)
            .map_err(Error::io(parent, Stage::Bucketing))?;

        let count = 1usize << bits;
        let mut writers = Vec::with_capacity(count);
        for idx in 0..count {
            let path = bucket_path(dir.path(), idx);
            let file = File::create(&path).map_err(Error::io(&path, Stage::Bucketing))?;
            writers.push(Some(BufWriter::new(file)));
        }
        log::debug!("created {count} buckets in {}", dir.path().display());

        Ok(Self {
            writers,
            counts: vec![0; count],
            shift,
            bits,
            dir,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.writers.len()
    }

    #[inline]
    pub(crate) fn bucket_of(&self, y: u64) -> usize {
        if self.bits == 0 {
            0
        } else {
            ((y << self.shift) >> (64 - self.bits as u32)) as usize
        }
    }

    pub(crate) fn count(&self, idx: usize) -> u64 {
        self.counts[idx]
    }

    /// Append records, each to the bucket its `y` falls in.
    pub(crate) fn push(&mut self, records: &[EntryRecord]) -> Result<()> {
        for record in records {
            let idx = self.bucket_of(record.y());
            let path = || bucket_path(self.dir.path(), idx);
            let Some(writer) = self.writers[idx].as_mut() else {
                return Err(Error::io(path(), Stage::Bucketing)(io::Error::other(
                    "bucket is already sealed",
                )));
            };
            writer
                .write_all(bytemuck::bytes_of(record))
                .map_err(Error::io(path(), Stage::Bucketing))?;
            self.counts[idx] += 1;
        }
        Ok(())
    }

    /// Flush and close all bucket writers.
    pub(crate) fn seal(&mut self) -> Result<()> {
        for (idx, writer) in self.writers.iter_mut().enumerate() {
            if let Some(writer) = writer.take() {
                writer
                    .into_inner()
                    .map_err(|e| e.into_error())
                    .map_err(Error::io(bucket_path(self.dir.path(), idx), Stage::Bucketing))?;
            }
        }
        Ok(())
    }

    /// Read a sealed bucket into memory and delete its file.
    pub(crate) fn take(&mut self, idx: usize) -> Result<Vec<EntryRecord>> {
        let path = bucket_path(self.dir.path(), idx);
        let mut records = vec![EntryRecord::zeroed(); self.counts[idx] as usize];
        let mut file = File::open(&path).map_err(Error::io(&path, Stage::Sorting))?;
        file.read_exact(bytemuck::cast_slice_mut(&mut records))
            .map_err(Error::io(&path, Stage::Sorting))?;
        drop(file);
        fs::remove_file(&path).map_err(Error::io(&path, Stage::Sorting))?;
        Ok(records)
    }

    /// Move a sealed bucket into a new, sealed arena of `2^bits` buckets
    /// partitioning by the next bits of `y`. The bucket is streamed in
    /// chunks and its file deleted.
    pub(crate) fn split(&mut self, idx: usize, bits: u8) -> Result<BucketArena> {
        let path = bucket_path(self.dir.path(), idx);
        let mut child = BucketArena::new(self.dir.path(), self.shift + self.bits, bits)?;

        let mut file = File::open(&path).map_err(Error::io(&path, Stage::Sorting))?;
        let mut chunk = vec![EntryRecord::zeroed(); SPLIT_CHUNK];
        let mut left = self.counts[idx];
        while left > 0 {
            let n = left.min(SPLIT_CHUNK as u64) as usize;
            file.read_exact(bytemuck::cast_slice_mut(&mut chunk[..n]))
                .map_err(Error::io(&path, Stage::Sorting))?;
            child.push(&chunk[..n])?;
            left -= n as u64;
        }
        drop(file);
        fs::remove_file(&path).map_err(Error::io(&path, Stage::Sorting))?;
        log::trace!("split bucket {idx} into {} buckets", child.len());

        child.seal()?;
        Ok(child)
    }

    #[cfg(test)]
    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn bucket_path(dir: &Path, idx: usize) -> PathBuf {
    dir.join(format!("bucket_{idx}.bin"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::PlotConfig,
        format::{Entry, MAX_K, MIN_K},
    };

    fn records(entries: &[Entry]) -> Vec<EntryRecord> {
        entries.iter().copied().map(Into::into).collect()
    }

    #[test]
    fn choosing_bucket_bits() {
        assert_eq!(0, bucket_bits(10, 1 << 10));
        assert_eq!(0, bucket_bits(10, 1 << 20));
        assert_eq!(1, bucket_bits(10, 1 << 9));
        assert_eq!(2, bucket_bits(10, 300));
        assert_eq!(20, bucket_bits(40, 1 << 20));
        assert_eq!(4, bucket_bits(4, 1));
    }

    #[test]
    fn buckets_stay_within_max_entries() {
        for max in [1, 1000, PlotConfig::default().max_bucket_entries] {
            for k in MIN_K..=MAX_K {
                let bits = bucket_bits(k, max);
                assert!(
                    (1u64 << k) >> bits <= max,
                    "k={k} bits={bits} exceeds {max} entries per bucket"
                );
            }
        }
    }

    #[test]
    fn buckets_partition_by_leading_bits() {
        let tmp = tempfile::tempdir().unwrap();
        let mut arena = BucketArena::new(tmp.path(), 0, 2).unwrap();
        assert_eq!(4, arena.len());

        let entries = [
            Entry { y: 0, x: 0 },
            Entry { y: u64::MAX, x: 1 },
            Entry { y: 1 << 62, x: 2 },
            Entry { y: 3 << 62, x: 3 },
            Entry { y: 1 << 63, x: 4 },
        ];
        arena.push(&records(&entries)).unwrap();
        arena.seal().unwrap();

        assert_eq!([1, 1, 1, 2], [0, 1, 2, 3].map(|i| arena.count(i)));

        let last: Vec<u64> = arena.take(3).unwrap().iter().map(|r| r.x()).collect();
        assert_eq!(vec![1, 3], last);
        assert!(!bucket_path(arena.path(), 3).exists());
    }

    #[test]
    fn splitting_partitions_by_the_next_bits() {
        let tmp = tempfile::tempdir().unwrap();
        let mut arena = BucketArena::new(tmp.path(), 0, 1).unwrap();
        let entries = [
            Entry { y: 0, x: 0 },
            Entry { y: u64::MAX, x: 1 },
            Entry { y: 1 << 63, x: 2 },
            Entry { y: 3 << 62, x: 3 },
            Entry { y: 5 << 61, x: 4 },
            Entry { y: 7 << 61, x: 5 },
        ];
        arena.push(&records(&entries)).unwrap();
        arena.seal().unwrap();
        assert_eq!(5, arena.count(1));

        let mut child = arena.split(1, 2).unwrap();
        assert!(!bucket_path(arena.path(), 1).exists());
        assert_eq!(4, child.len());
        // Partitioned by the second and third bit of `y`.
        assert_eq!([1, 1, 1, 2], [0, 1, 2, 3].map(|i| child.count(i)));

        let xs = |records: Vec<EntryRecord>| records.iter().map(|r| r.x()).collect::<Vec<_>>();
        assert_eq!(vec![2], xs(child.take(0).unwrap()));
        assert_eq!(vec![4], xs(child.take(1).unwrap()));
        assert_eq!(vec![3], xs(child.take(2).unwrap()));
        assert_eq!(vec![1, 5], xs(child.take(3).unwrap()));

        let child_dir = child.path().to_owned();
        assert!(child_dir.starts_with(arena.path()));
        drop(child);
        assert!(!child_dir.exists());
    }

    #[test]
    fn sealed_buckets_refuse_records() {
        let tmp = tempfile::tempdir().unwrap();
        let mut arena = BucketArena::new(tmp.path(), 0, 1).unwrap();
        arena.seal().unwrap();
        assert!(matches!(
            arena.push(&[EntryRecord::zeroed()]),
            Err(Error::Io {
                stage: Stage::Bucketing,
                ..
            })
        ));
    }

    #[test]
    fn arena_cleans_up_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let mut arena = BucketArena::new(tmp.path(), 0, 1).unwrap();
        arena.push(&[EntryRecord::zeroed()]).unwrap();
        let dir = arena.path().to_owned();
        assert!(dir.exists());

        drop(arena);
        assert!(!dir.exists());
        assert_eq!(0, std::fs::read_dir(tmp.path()).unwrap().count());
    }
}
