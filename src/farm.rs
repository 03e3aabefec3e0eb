//! A storage directory of plots owned by one public key.

use std::path::{Path, PathBuf};

use crate::{
    config::{PlotConfig, ProofConfig},
    error::{Error, Result, Stage},
    interrupt::Interrupt,
    naming::{plot_file_name, plot_identifier, MAX_FILE_NAME_LEN},
    plotting::build_plot,
    prove::{find_proof_with, Proof},
    quality::{score_proof, Quality},
    reader::plot_files,
    store::{Plot, PlotStore},
    verification::Verifier,
    Challenge,
};

/// Folder of the storage directory the plots are kept in.
pub const PLOT_FOLDER: &str = "plots";

#[derive(Debug, Clone)]
pub struct Farm {
    storage_dir: PathBuf,
    public_key: Vec<u8>,
    plot_config: PlotConfig,
    proof_config: ProofConfig,
}

impl Farm {
    pub fn new(storage_dir: impl Into<PathBuf>, public_key: impl Into<Vec<u8>>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            public_key: public_key.into(),
            plot_config: PlotConfig::default(),
            proof_config: ProofConfig::default(),
        }
    }

    pub fn with_plot_config(mut self, config: PlotConfig) -> Self {
        self.plot_config = config;
        self
    }

    pub fn with_proof_config(mut self, config: ProofConfig) -> Self {
        self.proof_config = config;
        self
    }

    pub fn plot_dir(&self) -> PathBuf {
        self.storage_dir.join(PLOT_FOLDER)
    }

    /// Where the plot of `source` is kept.
    pub fn plot_path(&self, source: &Path) -> Result<PathBuf> {
        let name = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::InvalidParameters(format!(
                    "{} has no UTF-8 file name",
                    source.display()
                ))
            })?;
        let file_name = plot_file_name(name);
        if file_name.len() > MAX_FILE_NAME_LEN {
            return Err(Error::InvalidParameters(format!(
                "plot file name for {name} is longer than {MAX_FILE_NAME_LEN} bytes"
            )));
        }
        Ok(self.plot_dir().join(file_name))
    }

    /// Plot the file at `source`.
    pub fn plot_file(&self, source: &Path, interrupt: &Interrupt) -> Result<Plot> {
        let output = self.plot_path(source)?;
        build_plot(
            source,
            &output,
            &self.public_key,
            &self.plot_config,
            interrupt,
        )
    }

    /// Identifiers of the plotted files, ordered by plot file name.
    pub fn plotted(&self) -> Result<Vec<String>> {
        let dir = self.plot_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let files = plot_files(&dir).map_err(Error::io(&dir, Stage::Reading))?;
        Ok(files
            .iter()
            .filter_map(|path| path.file_name()?.to_str())
            .filter_map(plot_identifier)
            .collect())
    }

    /// The best proof the farm holds for `challenge`, if any.
    pub fn generate_proof(&self, challenge: &Challenge) -> Result<Option<Proof>> {
        let dir = self.plot_dir();
        if !dir.exists() {
            return Ok(None);
        }
        find_proof_with(challenge, &dir, self.proof_config)
    }

    pub fn proof_quality(&self, proof: &Proof, challenge: &Challenge) -> Quality {
        score_proof(proof, challenge, &self.public_key)
    }

    pub fn verify_proof(&self, proof: &Proof, challenge: &Challenge) -> bool {
        match Verifier::new(self.proof_config).verify(proof, challenge, &self.public_key) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("rejected proof: {e}");
                false
            }
        }
    }

    /// Delete the plot of `source`.
    pub fn remove_plot(&self, source: &Path) -> Result<()> {
        PlotStore::remove(&self.plot_path(source)?)
    }

    /// Delete temporaries of interrupted builds from the plot folder and the
    /// configured temporary directory. Returns how many were removed.
    ///
    /// Must not run while the farm is plotting.
    pub fn remove_leftovers(&self) -> Result<usize> {
        let mut removed = 0;
        for dir in [Some(self.plot_dir()), self.plot_config.tmp_dir.clone()]
            .into_iter()
            .flatten()
        {
            if dir.exists() {
                removed += PlotStore::remove_leftovers(&dir)?;
            }
        }
        Ok(removed)
    }
}
