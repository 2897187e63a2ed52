pub mod accumulator;
pub mod config;
pub mod contacts;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod residues;
pub mod selection;
pub mod structure;
pub mod trajectory;

#[cfg(feature = "python")]
pub mod python_bindings;

// Re-export commonly used types and traits
pub use accumulator::{ContactAccumulator, ContactMatrix};
pub use config::{ContactConfig, Cutoff, RunConfig, DEFAULT_CUTOFF};
pub use contacts::{has_contact, within_distance};
pub use error::{ContactError, Result};
pub use output::{read_matrix, write_matrix};
pub use pipeline::{run, ContactReport, TrajectoryResult};
pub use residues::{build_residues, Residue, ResidueId};
pub use selection::Selection;
pub use structure::{load_system, AtomRecord, Coordinate, Frame, PeriodicBox, System};
pub use trajectory::{
    open_trajectory, run_trajectory, FrameSource, InMemoryTrajectory, PdbTrajectory,
    TrajectoryFile, XyzTrajectory,
};
