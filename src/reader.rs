use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};

use itertools::Itertools;
use regex::Regex;

/// A chunk of a file read by [BatchingReader].
#[derive(Debug, PartialEq, Eq)]
pub struct Batch {
    pub data: Vec<u8>,
    /// Offset of `data` in the file.
    pub pos: u64,
}

/// Reads `total_size` bytes of a reader in batches of `batch_size`.
///
/// Unlike a plain `take`, a source shorter than `total_size` is an error,
/// so a truncated plot table is never mistaken for a complete one.
pub(crate) struct BatchingReader<T>
where
    T: Read,
{
    reader: T,
    starting_pos: u64,
    pos: u64,
    batch_size: usize,
    total_size: u64,
}

impl<T: Read> BatchingReader<T> {
    pub fn new(reader: T, pos: u64, batch_size: usize, total_size: u64) -> BatchingReader<T> {
        BatchingReader::<T> {
            reader,
            starting_pos: pos,
            pos,
            batch_size,
            total_size,
        }
    }
}

impl<T: Read> Iterator for BatchingReader<T> {
    type Item = io::Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let read = self.pos - self.starting_pos;
        if read >= self.total_size {
            return None;
        }
        let remaining = self.total_size - read;
        let batch_size = self.batch_size.min(remaining as usize);
        let mut data = vec![0u8; batch_size];
        if let Err(e) = self.reader.read_exact(&mut data) {
            // Stop after reporting the failure once.
            self.pos = self.starting_pos + self.total_size;
            return Some(Err(e));
        }
        let batch = Batch {
            data,
            pos: self.pos,
        };
        self.pos += batch_size as u64;
        Some(Ok(batch))
    }
}

/// Plot files in `dir`, ordered by name.
///
/// Hidden files are skipped. Those are the temporaries of builds in progress.
pub(crate) fn plot_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let file_re = Regex::new(r"^[^.].*\.plot$").expect("valid plot file regex");
    let files = dir
        .read_dir()?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter(|entry| file_re.is_match(entry.file_name().to_string_lossy().as_ref()))
        .map(|entry| entry.path())
        .sorted()
        .collect();
    Ok(files)
}

/// Temporaries plot builds leave in `dir`: `.plot-*.tmp` tables and
/// `.plot-buckets-*` directories.
pub(crate) fn leftovers(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let leftover_re =
        Regex::new(r"^\.plot-(buckets-.+|.+\.tmp)$").expect("valid leftover regex");
    let paths = dir
        .read_dir()?
        .filter_map(Result::ok)
        .filter(|entry| leftover_re.is_match(entry.file_name().to_string_lossy().as_ref()))
        .map(|entry| entry.path())
        .sorted()
        .collect();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use std::{fs::File, io::Cursor};

    use tempfile::tempdir;

    use super::{leftovers, plot_files, Batch, BatchingReader};

    #[test]
    fn batching_reader() {
        let data = (0..40).collect::<Vec<u8>>();
        let file = Cursor::new(data);
        let mut reader = BatchingReader::new(file, 100, 16, 40);
        assert_eq!(
            Batch {
                data: (0..16).collect(),
                pos: 100,
            },
            reader.next().unwrap().unwrap()
        );
        assert_eq!(
            Batch {
                data: (16..32).collect(),
                pos: 116,
            },
            reader.next().unwrap().unwrap()
        );
        assert_eq!(
            Batch {
                data: (32..40).collect(),
                pos: 132,
            },
            reader.next().unwrap().unwrap()
        );
        assert!(reader.next().is_none());
    }

    #[test]
    fn short_source_is_an_error() {
        let data = (0..20).collect::<Vec<u8>>();
        let mut reader = BatchingReader::new(Cursor::new(data), 0, 16, 40);
        assert!(reader.next().unwrap().is_ok());
        assert_eq!(
            std::io::ErrorKind::UnexpectedEof,
            reader.next().unwrap().unwrap_err().kind()
        );
        assert!(reader.next().is_none());
    }

    #[test]
    fn skip_non_plot_files() {
        let tmp_dir = tempdir().unwrap();
        for name in ["other.bin", ".plot-1234.tmp", ".hidden.plot", "plot"] {
            File::create(tmp_dir.path().join(name)).unwrap();
        }
        std::fs::create_dir(tmp_dir.path().join("dir.plot")).unwrap();

        assert!(plot_files(tmp_dir.path()).unwrap().is_empty());
    }

    #[test]
    fn plot_files_are_sorted() {
        let tmp_dir = tempdir().unwrap();
        let total_files = 20;
        for i in (0..total_files).rev() {
            File::create(tmp_dir.path().join(format!("{i:02}.plot"))).unwrap();
        }

        let files = plot_files(tmp_dir.path()).unwrap();
        assert_eq!(total_files, files.len());
        for (i, file) in files.iter().enumerate() {
            assert_eq!(
                format!("{i:02}.plot"),
                file.file_name().unwrap().to_string_lossy()
            );
        }
    }

    #[test]
    fn finds_build_leftovers() {
        let tmp_dir = tempdir().unwrap();
        for name in [".plot-1234.tmp", "a.plot", ".plot-.tmp", "plot-1.tmp", ".hidden"] {
            File::create(tmp_dir.path().join(name)).unwrap();
        }
        std::fs::create_dir(tmp_dir.path().join(".plot-buckets-xyz")).unwrap();

        let names: Vec<_> = leftovers(tmp_dir.path())
            .unwrap()
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(vec![".plot-1234.tmp", ".plot-buckets-xyz"], names);
    }

    #[test]
    fn missing_dir_is_an_error() {
        let tmp_dir = tempdir().unwrap();
        assert!(plot_files(&tmp_dir.path().join("missing")).is_err());
    }
}
