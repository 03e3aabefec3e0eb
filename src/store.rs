//! Read access to finished plots.

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

use bytemuck::Zeroable;
use mockall::automock;

use crate::{
    difficulty::Prefix,
    error::{Error, Result, Stage},
    format::{plot_file_size, Entry, EntryRecord, PlotHeader, ENTRY_SIZE, HEADER_SIZE},
    reader::{leftovers, plot_files},
};

/// Entries read per positional read while scanning a matching range.
const SCAN_CHUNK: usize = 64;

/// A sorted plot table that can be searched by digest prefix.
#[automock]
pub trait PlotTable {
    fn header(&self) -> &PlotHeader;

    /// All entries whose `y` starts with `prefix`, in table order.
    fn range_lookup(&self, prefix: Prefix) -> Result<Vec<Entry>>;
}

/// An open, validated plot file.
///
/// The file handle is released when the plot is dropped. All reads are
/// positional, so one `Plot` can serve concurrent lookups.
#[derive(Debug)]
pub struct Plot {
    path: PathBuf,
    file: File,
    header: PlotHeader,
}

impl Plot {
    /// Open a plot and validate its header and size.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(Error::io(path, Stage::Reading))?;
        let len = file
            .metadata()
            .map_err(Error::io(path, Stage::Reading))?
            .len();
        if len < HEADER_SIZE as u64 {
            return Err(Error::corrupt(path, format!("file too short ({len} bytes)")));
        }

        let mut buf = [0u8; HEADER_SIZE];
        read_exact_at(&file, &mut buf, 0).map_err(Error::io(path, Stage::Reading))?;
        let header = PlotHeader::decode(path, &buf)?;

        let expected = plot_file_size(header.k);
        if len != expected {
            return Err(Error::corrupt(
                path,
                format!("file size {len} doesn't match k={} ({expected})", header.k),
            ));
        }
        log::debug!("opened plot {} (k={})", path.display(), header.k);

        Ok(Self {
            path: path.to_owned(),
            file,
            header,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_entries(&self) -> u64 {
        self.header.num_entries()
    }

    /// Read `out.len()` consecutive records starting at entry `index`.
    pub fn read_entries(&self, index: u64, out: &mut [EntryRecord]) -> Result<()> {
        if index + out.len() as u64 > self.num_entries() {
            return Err(Error::corrupt(
                &self.path,
                format!(
                    "entries {index}..{} out of table bounds",
                    index + out.len() as u64
                ),
            ));
        }
        let offset = HEADER_SIZE as u64 + index * ENTRY_SIZE as u64;
        read_exact_at(&self.file, bytemuck::cast_slice_mut(out), offset)
            .map_err(Error::io(&self.path, Stage::Reading))
    }

    fn y_at(&self, index: u64) -> Result<u64> {
        let mut record = [EntryRecord::zeroed()];
        self.read_entries(index, &mut record)?;
        Ok(record[0].y())
    }

    /// Index of the first entry with `y >= target`.
    fn lower_bound(&self, target: u64) -> Result<u64> {
        let (mut lo, mut hi) = (0, self.num_entries());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.y_at(mid)? < target {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }
}

impl PlotTable for Plot {
    fn header(&self) -> &PlotHeader {
        &self.header
    }

    fn range_lookup(&self, prefix: Prefix) -> Result<Vec<Entry>> {
        let (lower, upper) = (prefix.lower(), prefix.upper());
        let mut index = self.lower_bound(lower)?;
        let total = self.num_entries();

        let mut matches = Vec::new();
        let mut chunk = [EntryRecord::zeroed(); SCAN_CHUNK];
        'scan: while index < total {
            let n = SCAN_CHUNK.min((total - index) as usize);
            self.read_entries(index, &mut chunk[..n])?;
            for (offset, record) in chunk[..n].iter().enumerate() {
                let y = record.y();
                if y > upper {
                    break 'scan;
                }
                if y < lower {
                    return Err(Error::corrupt(
                        &self.path,
                        format!("table is not sorted at entry {}", index + offset as u64),
                    ));
                }
                matches.push(record.entry());
            }
            index += n as u64;
        }
        log::trace!(
            "{}: {} entries match prefix {:#x}/{}",
            self.path.display(),
            matches.len(),
            prefix.value(),
            prefix.bits()
        );
        Ok(matches)
    }
}

/// The set of plots kept in one directory.
#[derive(Debug, Default)]
pub struct PlotStore {
    plots: Vec<Plot>,
}

impl PlotStore {
    /// Open every plot file in `dir`.
    ///
    /// Fails with [Error::CorruptPlot] if any of them doesn't validate.
    /// Temporaries of in-progress builds are not plot files and are skipped.
    pub fn open_dir(dir: &Path) -> Result<Self> {
        let plots = plot_files(dir)
            .map_err(Error::io(dir, Stage::Reading))?
            .into_iter()
            .map(|path| Plot::open(&path))
            .collect::<Result<Vec<_>>>()?;
        log::debug!("opened {} plots in {}", plots.len(), dir.display());
        Ok(Self { plots })
    }

    pub fn plots(&self) -> &[Plot] {
        &self.plots
    }

    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }

    /// Delete a plot to reclaim its space.
    pub fn remove(path: &Path) -> Result<()> {
        // Refuse to delete something that isn't a plot.
        drop(Plot::open(path)?);
        std::fs::remove_file(path).map_err(Error::io(path, Stage::Removing))?;
        log::info!("removed plot {}", path.display());
        Ok(())
    }

    /// Delete what interrupted builds left in `dir` and return how many
    /// were removed. Must not run while a build writes to `dir`.
    pub fn remove_leftovers(dir: &Path) -> Result<usize> {
        let paths = leftovers(dir).map_err(Error::io(dir, Stage::Removing))?;
        for path in &paths {
            if path.is_dir() {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            }
            .map_err(Error::io(path, Stage::Removing))?;
            log::info!("removed leftover {}", path.display());
        }
        Ok(paths.len())
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
