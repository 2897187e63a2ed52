use std::path::{Path, PathBuf};

use crate::error::{ContactError, Result};

/// Default contact distance, in the units of the coordinates (Å).
pub const DEFAULT_CUTOFF: f64 = 4.0;

/// A validated contact distance: finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cutoff(f64);

impl Cutoff {
    pub fn new(distance: f64) -> Result<Self> {
        if distance.is_finite() && distance > 0.0 {
            Ok(Cutoff(distance))
        } else {
            Err(ContactError::InvalidCutoff(distance))
        }
    }

    pub fn distance(self) -> f64 {
        self.0
    }

    pub fn squared(self) -> f64 {
        self.0 * self.0
    }
}

impl Default for Cutoff {
    fn default() -> Self {
        Cutoff(DEFAULT_CUTOFF)
    }
}

/// Options that shape the contact definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactConfig {
    /// Contact distance (default 4.0)
    pub cutoff: f64,
    /// Remove hydrogens from the system before the selection is applied
    pub exclude_hydrogens: bool,
    /// Remove backbone atoms from each residue after the residue split
    pub exclude_backbone: bool,
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            cutoff: DEFAULT_CUTOFF,
            exclude_hydrogens: false,
            exclude_backbone: false,
        }
    }
}

impl ContactConfig {
    pub fn validate(&self) -> Result<Cutoff> {
        Cutoff::new(self.cutoff)
    }
}

/// Everything one contact run needs, fixed before any frame is read.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub system_file: PathBuf,
    pub selection: String,
    pub out_file: PathBuf,
    pub traj_files: Vec<PathBuf>,
    pub contact: ContactConfig,
    /// Provenance written at the top of every output file, usually the
    /// command line
    pub header: String,
    /// Where per-trajectory matrices go when there is more than one trajectory
    pub per_trajectory_dir: PathBuf,
    pub show_progress: bool,
}

impl RunConfig {
    pub fn new(
        system_file: impl Into<PathBuf>,
        selection: impl Into<String>,
        out_file: impl Into<PathBuf>,
        traj_files: Vec<PathBuf>,
    ) -> Self {
        Self {
            system_file: system_file.into(),
            selection: selection.into(),
            out_file: out_file.into(),
            traj_files,
            contact: ContactConfig::default(),
            header: String::new(),
            per_trajectory_dir: PathBuf::from("."),
            show_progress: false,
        }
    }

    pub fn with_contact(mut self, contact: ContactConfig) -> Self {
        self.contact = contact;
        self
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    pub fn with_per_trajectory_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.per_trajectory_dir = dir.into();
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Check everything that can be checked without reading trajectories.
    pub fn validate(&self) -> Result<Cutoff> {
        let cutoff = self.contact.validate()?;
        if self.traj_files.is_empty() {
            return Err(ContactError::Configuration(
                "at least one trajectory file is required".to_string(),
            ));
        }
        require_file(&self.system_file, "system file")?;
        for traj in &self.traj_files {
            require_file(traj, "trajectory file")?;
        }
        Ok(cutoff)
    }
}

fn require_file(path: &Path, what: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ContactError::Configuration(format!(
            "{what} {} does not exist or is not a regular file",
            path.display()
        )))
    }
}
