use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use log::info;

use crate::accumulator::{ContactAccumulator, ContactMatrix};
use crate::config::RunConfig;
use crate::error::{ContactError, Result};
use crate::output::{per_trajectory_path, write_matrix};
use crate::residues::{build_residues, ResidueId};
use crate::structure::load_system;
use crate::trajectory::{frame_progress, open_trajectory, run_trajectory};

/// Outcome for one input trajectory.
#[derive(Debug, Clone)]
pub struct TrajectoryResult {
    pub path: PathBuf,
    /// Per-trajectory matrix file, only written when there are several
    /// trajectories
    pub output: Option<PathBuf>,
    pub frames: usize,
    pub matrix: ContactMatrix,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct ContactReport {
    pub residues: Vec<ResidueId>,
    pub per_trajectory: Vec<TrajectoryResult>,
    pub average: ContactMatrix,
    pub out_file: PathBuf,
}

/// Identity of an output location: the directory resolved through the
/// filesystem when it exists (lexically without `.` components otherwise),
/// joined with the file name. `a.dat`, `./a.dat` and `/cwd/a.dat` compare equal.
fn output_key(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dir = fs::canonicalize(parent).unwrap_or_else(|_| {
        parent
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    });
    match path.file_name() {
        Some(name) => dir.join(name),
        None => dir,
    }
}

/// Per-trajectory output paths, `None` for a single trajectory. Two inputs
/// that would overwrite each other's file are rejected.
fn per_trajectory_outputs(config: &RunConfig) -> Result<Vec<Option<PathBuf>>> {
    if config.traj_files.len() < 2 {
        return Ok(vec![None; config.traj_files.len()]);
    }

    let average_key = output_key(&config.out_file);
    let mut seen: HashMap<PathBuf, &PathBuf> = HashMap::new();
    let mut outputs = Vec::with_capacity(config.traj_files.len());
    for traj in &config.traj_files {
        let out = per_trajectory_path(&config.per_trajectory_dir, traj)?;
        let key = output_key(&out);
        if key == average_key {
            return Err(ContactError::Configuration(format!(
                "per-trajectory output for {} would overwrite {}",
                traj.display(),
                config.out_file.display()
            )));
        }
        if let Some(previous) = seen.insert(key, traj) {
            return Err(ContactError::Configuration(format!(
                "{} and {} would both write {}",
                previous.display(),
                traj.display(),
                out.display()
            )));
        }
        outputs.push(Some(out));
    }
    Ok(outputs)
}

/// Run a whole contact analysis: build residues from the system, count
/// contacts in every trajectory, write the matrices.
///
/// Everything that can be checked up front is checked before the first
/// frame is read. Any error aborts the run; the averaged matrix is written
/// last, so it only exists when every trajectory was processed.
pub fn run(config: &RunConfig) -> Result<ContactReport> {
    let cutoff = config.validate()?;
    let outputs = per_trajectory_outputs(config)?;

    let system = load_system(&config.system_file)?;
    let residues = build_residues(
        &system,
        &config.selection,
        config.contact.exclude_hydrogens,
        config.contact.exclude_backbone,
    )?;
    info!(
        "{} atoms, {} residues selected, cutoff {}",
        system.n_atoms(),
        residues.len(),
        cutoff.distance()
    );

    let mut accumulator =
        ContactAccumulator::new(residues.len(), config.traj_files.len(), cutoff)?;
    let mut per_trajectory = Vec::with_capacity(config.traj_files.len());

    for (k, (traj, output)) in config.traj_files.iter().zip(outputs).enumerate() {
        let mut source = open_trajectory(traj, system.n_atoms())?;
        let progress = frame_progress(&traj.display().to_string(), config.show_progress);
        let frames = run_trajectory(&mut source, &residues, &mut accumulator, k, &progress)?;
        info!("{}: {frames} frames", traj.display());

        let matrix = accumulator.trajectory_matrix(k);
        if let Some(path) = &output {
            write_matrix(path, &matrix, &config.header)?;
            info!("wrote {}", path.display());
        }
        per_trajectory.push(TrajectoryResult {
            path: traj.clone(),
            output,
            frames,
            matrix,
        });
    }

    let average = accumulator.average()?;
    write_matrix(&config.out_file, &average, &config.header)?;
    info!("wrote {}", config.out_file.display());

    Ok(ContactReport {
        residues: residues.into_iter().map(|r| r.id).collect(),
        per_trajectory,
        average,
        out_file: config.out_file.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_trajectory_has_no_side_file() {
        let config = RunConfig::new("s.pdb", "all", "out.dat", vec![PathBuf::from("a.pdb")]);
        assert_eq!(per_trajectory_outputs(&config).unwrap(), vec![None]);
    }

    #[test]
    fn side_files_are_named_after_trajectories() {
        let config = RunConfig::new(
            "s.pdb",
            "all",
            "out.dat",
            vec![PathBuf::from("runs/a.pdb"), PathBuf::from("b.xyz")],
        )
        .with_per_trajectory_dir("res");
        let outputs = per_trajectory_outputs(&config).unwrap();
        assert_eq!(outputs[0].as_deref(), Some(PathBuf::from("res/a.dat").as_path()));
        assert_eq!(outputs[1].as_deref(), Some(PathBuf::from("res/b.dat").as_path()));
    }

    #[test]
    fn colliding_side_files_are_rejected() {
        let config = RunConfig::new(
            "s.pdb",
            "all",
            "out.dat",
            vec![PathBuf::from("one/traj.pdb"), PathBuf::from("two/traj.xyz")],
        );
        let err = per_trajectory_outputs(&config).unwrap_err();
        assert!(matches!(err, ContactError::Configuration(_)));
    }

    #[test]
    fn side_file_may_not_replace_the_average() {
        let config = RunConfig::new(
            "s.pdb",
            "all",
            "out.dat",
            vec![PathBuf::from("out.pdb"), PathBuf::from("other.pdb")],
        )
        .with_per_trajectory_dir("");
        assert!(per_trajectory_outputs(&config).is_err());
    }

    #[test]
    fn side_file_in_default_dir_may_not_replace_the_average() {
        let trajs = vec![PathBuf::from("a.pdb"), PathBuf::from("b.pdb")];
        let relative = RunConfig::new("s.pdb", "all", "a.dat", trajs.clone());
        let err = per_trajectory_outputs(&relative).unwrap_err();
        assert!(err.to_string().contains("would overwrite a.dat"));

        let cwd = std::env::current_dir().unwrap();
        let absolute = RunConfig::new("s.pdb", "all", cwd.join("b.dat"), trajs.clone());
        assert!(per_trajectory_outputs(&absolute).is_err());

        let distinct = RunConfig::new("s.pdb", "all", "average.dat", trajs);
        assert!(per_trajectory_outputs(&distinct).is_ok());
    }

    #[test]
    fn equivalent_spellings_share_an_output_key() {
        assert_eq!(output_key(Path::new("a.dat")), output_key(Path::new("./a.dat")));
        assert_eq!(
            output_key(Path::new("missing/./x.dat")),
            output_key(Path::new("missing/x.dat"))
        );
        assert_ne!(output_key(Path::new("a.dat")), output_key(Path::new("b.dat")));
    }
}
