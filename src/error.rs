use std::{fmt, io, path::PathBuf};

/// Step of plot handling an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Digesting the source file into a plot nonce.
    Seeding,
    /// Hashing entries into temporary bucket files.
    Bucketing,
    /// Sorting buckets into the plot table.
    Sorting,
    /// Writing the header and renaming the plot into place.
    Publishing,
    /// Reading a finished plot.
    Reading,
    /// Deleting a plot.
    Removing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Stage::Seeding => "seeding",
            Stage::Bucketing => "bucketing",
            Stage::Sorting => "sorting",
            Stage::Publishing => "publishing",
            Stage::Reading => "reading",
            Stage::Removing => "removing",
        };
        f.write_str(stage)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("plot {0} already exists")]
    PlotExists(PathBuf),
    #[error("insufficient storage for plot {path} ({stage})")]
    InsufficientStorage { path: PathBuf, stage: Stage },
    #[error("corrupt plot {path}: {reason}")]
    CorruptPlot { path: PathBuf, reason: String },
    #[error("plotting {path} was cancelled ({stage})")]
    Cancelled { path: PathBuf, stage: Stage },
    #[error("plotting {path} timed out ({stage})")]
    TimedOut { path: PathBuf, stage: Stage },
    #[error("IO error on {path} ({stage}): {source}")]
    Io {
        path: PathBuf,
        stage: Stage,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptPlot {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns a mapper turning an IO error into [Error], recognizing a full disk.
    pub(crate) fn io(path: impl Into<PathBuf>, stage: Stage) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| {
            if source.kind() == io::ErrorKind::StorageFull {
                Error::InsufficientStorage { path, stage }
            } else {
                Error::Io {
                    path,
                    stage,
                    source,
                }
            }
        }
    }
}
