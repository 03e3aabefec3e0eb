//! On-disk plot layout.
//!
//! A plot is a fixed-size [PlotHeader] followed by `2^k` [EntryRecord]s
//! sorted ascending by `(y, x)`. All integers are little-endian except `y`,
//! which is stored big-endian so that byte order, numeric order and digest
//! prefix order coincide.

use std::path::Path;

use bytemuck::{Pod, Zeroable};

use crate::{
    error::{Error, Result},
    hash_chain::{PlotNonce, PlotSeed, Y_SIZE},
};

pub const MAGIC: [u8; 8] = *b"POSPLOT\0";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 160;
pub const ENTRY_SIZE: usize = std::mem::size_of::<EntryRecord>();

/// Smallest supported plot size parameter.
pub const MIN_K: u8 = 4;
/// Largest supported plot size parameter.
pub const MAX_K: u8 = 40;

const CHECKSUM_OFFSET: usize = 152;
const CHECKSUM_SIZE: usize = 8;

pub fn ensure_k(k: u8) -> Result<()> {
    if !(MIN_K..=MAX_K).contains(&k) {
        return Err(Error::InvalidParameters(format!(
            "k ({k}) must be within {MIN_K}..={MAX_K}"
        )));
    }
    Ok(())
}

/// Number of entries in a plot of size `k`.
pub fn num_entries(k: u8) -> u64 {
    1u64 << k
}

/// Exact size of a plot file of size `k`.
pub fn plot_file_size(k: u8) -> u64 {
    HEADER_SIZE as u64 + num_entries(k) * ENTRY_SIZE as u64
}

/// A single plot entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entry {
    // Field order gives the (y, x) table order.
    pub y: u64,
    pub x: u64,
}

/// The fixed-width record an [Entry] is stored as.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct EntryRecord {
    y: [u8; Y_SIZE],
    x: [u8; 8],
}

impl EntryRecord {
    pub fn y(&self) -> u64 {
        u64::from_be_bytes(self.y)
    }

    pub fn x(&self) -> u64 {
        u64::from_le_bytes(self.x)
    }

    pub fn entry(&self) -> Entry {
        Entry {
            y: self.y(),
            x: self.x(),
        }
    }

    /// Sort key matching the table order.
    #[inline]
    pub fn key(&self) -> (u64, u64) {
        (self.y(), self.x())
    }
}

impl From<Entry> for EntryRecord {
    fn from(entry: Entry) -> Self {
        Self {
            y: entry.y.to_be_bytes(),
            x: entry.x.to_le_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotHeader {
    pub version: u16,
    pub k: u8,
    pub nonce: PlotNonce,
    pub seed: PlotSeed,
    pub public_key_digest: [u8; 32],
    /// BLAKE3 of all entry records in table order.
    pub table_digest: [u8; 32],
}

impl PlotHeader {
    pub fn num_entries(&self) -> u64 {
        num_entries(self.k)
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..10].copy_from_slice(&self.version.to_le_bytes());
        buf[10] = self.k;
        buf[16..48].copy_from_slice(&self.nonce.0);
        buf[48..80].copy_from_slice(&self.seed.0);
        buf[80..112].copy_from_slice(&self.public_key_digest);
        buf[112..144].copy_from_slice(&self.table_digest);
        let checksum = checksum(&buf[..CHECKSUM_OFFSET]);
        buf[CHECKSUM_OFFSET..].copy_from_slice(&checksum);
        buf
    }

    /// Parse and validate a header read from `path`.
    pub fn decode(path: &Path, buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        if buf[0..8] != MAGIC {
            return Err(Error::corrupt(path, "bad magic"));
        }
        let expected = checksum(&buf[..CHECKSUM_OFFSET]);
        if buf[CHECKSUM_OFFSET..] != expected {
            return Err(Error::corrupt(path, "header checksum mismatch"));
        }
        let version = u16::from_le_bytes([buf[8], buf[9]]);
        if version != FORMAT_VERSION {
            return Err(Error::corrupt(
                path,
                format!("unsupported format version {version}"),
            ));
        }
        let k = buf[10];
        if ensure_k(k).is_err() {
            return Err(Error::corrupt(path, format!("k ({k}) out of range")));
        }
        if buf[11..16].iter().chain(&buf[144..152]).any(|&b| b != 0) {
            return Err(Error::corrupt(path, "reserved header bytes are set"));
        }

        let array = |range: std::ops::Range<usize>| -> [u8; 32] {
            let mut out = [0u8; 32];
            out.copy_from_slice(&buf[range]);
            out
        };
        Ok(Self {
            version,
            k,
            nonce: PlotNonce(array(16..48)),
            seed: PlotSeed(array(48..80)),
            public_key_digest: array(80..112),
            table_digest: array(112..144),
        })
    }
}

fn checksum(data: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let mut out = [0u8; CHECKSUM_SIZE];
    out.copy_from_slice(&blake3::hash(data).as_bytes()[..CHECKSUM_SIZE]);
    out
}
