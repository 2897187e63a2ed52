use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::debug;

use crate::accumulator::ContactAccumulator;
use crate::error::{ContactError, Result};
use crate::residues::Residue;
use crate::structure::{
    is_atom_line, keeps_alt_loc, parse_cryst1, parse_pdb_coordinate, CellRecord, Coordinate,
    Frame, PeriodicBox,
};

/// A lazy sequence of frames.
///
/// Every call hands out a fresh, owned [`Frame`]; nothing a caller holds is
/// modified by advancing the source.
pub trait FrameSource {
    /// Name used in diagnostics, usually the file path
    fn label(&self) -> String;

    /// Read the next frame, `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

fn check_atom_count(path: &Path, frame_index: usize, got: usize, expected: usize) -> Result<()> {
    if got == expected {
        Ok(())
    } else {
        Err(ContactError::Configuration(format!(
            "frame {frame_index} of {} has {got} atoms but the system has {expected}",
            path.display()
        )))
    }
}

/// Multi-model PDB trajectory, streamed one model at a time.
///
/// Models end at `ENDMDL` (or `END`); a file without `MODEL` records is a
/// single frame. A `CRYST1` record applies to its model and every later one.
pub struct PdbTrajectory {
    path: PathBuf,
    reader: BufReader<File>,
    n_atoms: usize,
    line_no: usize,
    frames_read: usize,
    periodic_box: Option<PeriodicBox>,
    warned_cell: bool,
}

impl PdbTrajectory {
    pub fn open(path: impl AsRef<Path>, n_atoms: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| ContactError::io(&path, e))?;
        Ok(Self {
            path,
            reader: BufReader::new(file),
            n_atoms,
            line_no: 0,
            frames_read: 0,
            periodic_box: None,
            warned_cell: false,
        })
    }
}

impl FrameSource for PdbTrajectory {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut positions: Vec<Coordinate> = Vec::with_capacity(self.n_atoms);
        let mut line = String::new();

        loop {
            line.clear();
            let bytes = self
                .reader
                .read_line(&mut line)
                .map_err(|e| ContactError::io(&self.path, e))?;
            if bytes == 0 {
                break;
            }
            self.line_no += 1;

            if line.starts_with("CRYST1") {
                let cell = parse_cryst1(&line, &self.path, self.line_no)?;
                self.periodic_box = cell.resolve(&self.path, &mut self.warned_cell);
            } else if is_atom_line(&line) {
                if keeps_alt_loc(&line) {
                    positions.push(parse_pdb_coordinate(&line, &self.path, self.line_no)?);
                }
            } else if line.starts_with("END") && !positions.is_empty() {
                break;
            }
        }

        if positions.is_empty() {
            return Ok(None);
        }
        check_atom_count(&self.path, self.frames_read, positions.len(), self.n_atoms)?;
        self.frames_read += 1;
        Ok(Some(Frame::new(positions).with_box(self.periodic_box)))
    }
}

/// Plain or extended XYZ trajectory.
///
/// Each frame is an atom-count line, a comment line (which may carry an
/// extended-XYZ `Lattice="..."` entry) and one `symbol x y z` line per atom.
pub struct XyzTrajectory {
    path: PathBuf,
    reader: BufReader<File>,
    n_atoms: usize,
    line_no: usize,
    frames_read: usize,
    warned_cell: bool,
}

impl XyzTrajectory {
    pub fn open(path: impl AsRef<Path>, n_atoms: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| ContactError::io(&path, e))?;
        Ok(Self {
            path,
            reader: BufReader::new(file),
            n_atoms,
            line_no: 0,
            frames_read: 0,
            warned_cell: false,
        })
    }

    /// Returns `false` at end of file.
    fn read_line(&mut self, line: &mut String) -> Result<bool> {
        line.clear();
        let bytes = self
            .reader
            .read_line(line)
            .map_err(|e| ContactError::io(&self.path, e))?;
        if bytes > 0 {
            self.line_no += 1;
        }
        Ok(bytes > 0)
    }

    fn truncated(&self, what: &str) -> ContactError {
        ContactError::parse(
            &self.path,
            self.line_no,
            format!("frame {} ends before its {what}", self.frames_read),
        )
    }
}

/// Interpret the `Lattice="ax ay az bx by bz cx cy cz"` entry of an
/// extended-XYZ comment line.
fn parse_lattice(comment: &str) -> std::result::Result<CellRecord, String> {
    let Some(start) = comment.find("Lattice=\"") else {
        return Ok(CellRecord::Absent);
    };
    let rest = &comment[start + "Lattice=\"".len()..];
    let end = rest.find('"').ok_or("unterminated Lattice value")?;
    let values: Vec<f64> = rest[..end]
        .split_whitespace()
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid Lattice value: {e}"))?;
    if values.len() != 9 {
        return Err(format!("Lattice needs 9 values, got {}", values.len()));
    }

    let off_diagonal = [values[1], values[2], values[3], values[5], values[6], values[7]];
    if off_diagonal.iter().any(|v| v.abs() > 1e-6) {
        return Ok(CellRecord::NonOrthogonal);
    }
    Ok(PeriodicBox::new([values[0], values[4], values[8]])
        .map(CellRecord::Orthorhombic)
        .unwrap_or(CellRecord::Absent))
}

impl FrameSource for XyzTrajectory {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut line = String::new();
        loop {
            if !self.read_line(&mut line)? {
                return Ok(None);
            }
            if !line.trim().is_empty() {
                break;
            }
        }

        let count_str = line.trim().to_string();
        let count: usize = count_str.parse().map_err(|_| {
            ContactError::parse(
                &self.path,
                self.line_no,
                format!("expected an atom count, got '{count_str}'"),
            )
        })?;
        check_atom_count(&self.path, self.frames_read, count, self.n_atoms)?;

        if !self.read_line(&mut line)? {
            return Err(self.truncated("comment line"));
        }
        let cell = parse_lattice(&line)
            .map_err(|reason| ContactError::parse(&self.path, self.line_no, reason))?;
        let periodic_box = cell.resolve(&self.path, &mut self.warned_cell);

        let mut positions = Vec::with_capacity(count);
        for _ in 0..count {
            if !self.read_line(&mut line)? {
                return Err(self.truncated("last atom"));
            }
            let mut tokens = line.split_whitespace().skip(1);
            let mut coordinate = [0.0; 3];
            for value in coordinate.iter_mut() {
                let token = tokens.next().ok_or_else(|| {
                    ContactError::parse(&self.path, self.line_no, "missing coordinate")
                })?;
                *value = token.parse().map_err(|_| {
                    ContactError::parse(
                        &self.path,
                        self.line_no,
                        format!("invalid coordinate '{token}'"),
                    )
                })?;
            }
            positions.push(Coordinate::new(coordinate[0], coordinate[1], coordinate[2]));
        }

        self.frames_read += 1;
        Ok(Some(Frame::new(positions).with_box(periodic_box)))
    }
}

/// A trajectory file of any supported format, chosen from the extension.
pub enum TrajectoryFile {
    Pdb(PdbTrajectory),
    Xyz(XyzTrajectory),
}

/// Open `path` as a trajectory whose frames must hold `n_atoms` atoms.
pub fn open_trajectory(path: impl AsRef<Path>, n_atoms: usize) -> Result<TrajectoryFile> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "pdb" | "ent" => Ok(TrajectoryFile::Pdb(PdbTrajectory::open(path, n_atoms)?)),
        "xyz" => Ok(TrajectoryFile::Xyz(XyzTrajectory::open(path, n_atoms)?)),
        _ => Err(ContactError::Configuration(format!(
            "unknown trajectory format for {} (expected .pdb, .ent or .xyz)",
            path.display()
        ))),
    }
}

impl FrameSource for TrajectoryFile {
    fn label(&self) -> String {
        match self {
            TrajectoryFile::Pdb(t) => t.label(),
            TrajectoryFile::Xyz(t) => t.label(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self {
            TrajectoryFile::Pdb(t) => t.next_frame(),
            TrajectoryFile::Xyz(t) => t.next_frame(),
        }
    }
}

/// Frames that are already in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTrajectory {
    label: String,
    frames: VecDeque<Frame>,
}

impl InMemoryTrajectory {
    pub fn new(label: impl Into<String>, frames: Vec<Frame>) -> Self {
        Self {
            label: label.into(),
            frames: frames.into(),
        }
    }
}

impl FrameSource for InMemoryTrajectory {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}

/// Spinner counting frames; hidden when `visible` is false.
pub fn frame_progress(label: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} frames ({per_sec}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(label.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Count contacts over every frame of `source` into trajectory `k`, then
/// normalize that trajectory. Returns the number of frames seen.
///
/// A source without frames is an [`ContactError::EmptyTrajectory`].
pub fn run_trajectory<S: FrameSource + ?Sized>(
    source: &mut S,
    residues: &[Residue],
    accumulator: &mut ContactAccumulator,
    k: usize,
    progress: &ProgressBar,
) -> Result<usize> {
    let needed = residues
        .iter()
        .flat_map(|r| r.atoms.iter())
        .max()
        .map_or(0, |&m| m + 1);

    let mut frames = 0;
    while let Some(frame) = source.next_frame()? {
        if frame.size() < needed {
            return Err(ContactError::Configuration(format!(
                "frame {frames} of {} has {} atoms, residues need {needed}",
                source.label(),
                frame.size()
            )));
        }
        accumulator.record_frame(residues, &frame, k)?;
        frames += 1;
        progress.inc(1);
    }

    if frames == 0 {
        return Err(ContactError::EmptyTrajectory(source.label()));
    }
    accumulator.finalize_trajectory(k, frames)?;
    progress.finish_and_clear();
    debug!("{}: {frames} frames", source.label());
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::tests::{line_frame, point_residues};
    use crate::config::Cutoff;
    use crate::structure::tests::{atom_line, write_file};
    use assert_approx_eq::assert_approx_eq;

    fn model(serial: usize, xs: &[f64]) -> String {
        let mut lines = vec![format!("MODEL     {serial:>4}")];
        for (i, &x) in xs.iter().enumerate() {
            lines.push(atom_line(i + 1, "CA", "ALA", 'A', i as i32 + 1, [x, 0.0, 0.0], "C"));
        }
        lines.push("ENDMDL".to_string());
        lines.join("\n")
    }

    fn collect(source: &mut dyn FrameSource) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn pdb_models_are_streamed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let content = [
            "CRYST1   20.000   20.000   20.000  90.00  90.00  90.00 P 1           1".to_string(),
            model(1, &[0.0, 1.0]),
            model(2, &[0.0, 2.0]),
            model(3, &[0.0, 3.0]),
            "END".to_string(),
        ]
        .join("\n");
        let path = write_file(dir.path(), "traj.pdb", &content);

        let mut traj = open_trajectory(&path, 2).unwrap();
        let frames = collect(&mut traj);
        assert_eq!(frames.len(), 3);
        assert_approx_eq!(frames[2].positions[1].x, 3.0);
        assert!(frames
            .iter()
            .all(|f| f.periodic_box == PeriodicBox::new([20.0, 20.0, 20.0])));
        assert!(traj.next_frame().unwrap().is_none());
    }

    #[test]
    fn pdb_without_models_is_one_frame() {
        let dir = tempfile::tempdir().unwrap();
        let content = [
            atom_line(1, "CA", "ALA", 'A', 1, [0.0, 0.0, 0.0], "C"),
            atom_line(2, "CA", "ALA", 'A', 2, [1.0, 0.0, 0.0], "C"),
            "END".to_string(),
        ]
        .join("\n");
        let path = write_file(dir.path(), "single.pdb", &content);
        let mut traj = PdbTrajectory::open(&path, 2).unwrap();
        assert_eq!(collect(&mut traj).len(), 1);
    }

    #[test]
    fn pdb_atom_count_must_match_system() {
        let dir = tempfile::tempdir().unwrap();
        let content = [model(1, &[0.0, 1.0]), model(2, &[0.0])].join("\n");
        let path = write_file(dir.path(), "short.pdb", &content);
        let mut traj = PdbTrajectory::open(&path, 2).unwrap();
        assert!(traj.next_frame().unwrap().is_some());
        let err = traj.next_frame().unwrap_err();
        assert!(matches!(err, ContactError::Configuration(_)));
        assert!(err.to_string().contains("frame 1"));
    }

    #[test]
    fn xyz_frames_and_lattice() {
        let dir = tempfile::tempdir().unwrap();
        let content = "2\nLattice=\"10.0 0.0 0.0 0.0 10.0 0.0 0.0 0.0 10.0\" step=1\n\
C 0.5 0.0 0.0\nC 9.5 0.0 0.0\n\
2\nplain comment\nC 0.0 0.0 0.0\nC 5.0 0.0 0.0\n";
        let path = write_file(dir.path(), "traj.xyz", content);
        let mut traj = open_trajectory(&path, 2).unwrap();
        let frames = collect(&mut traj);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].periodic_box, PeriodicBox::new([10.0, 10.0, 10.0]));
        assert_approx_eq!(frames[0].distance2(0, 1), 1.0, 1e-9);
        assert_eq!(frames[1].periodic_box, None);
    }

    #[test]
    fn xyz_truncated_frame_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "cut.xyz", "2\ncomment\nC 0.0 0.0 0.0\n");
        let mut traj = XyzTrajectory::open(&path, 2).unwrap();
        assert!(matches!(
            traj.next_frame(),
            Err(ContactError::Parse { .. })
        ));
    }

    #[test]
    fn skewed_lattice_is_ignored() {
        assert_eq!(
            parse_lattice("Lattice=\"10 0 0 5 10 0 0 0 10\"").unwrap(),
            CellRecord::NonOrthogonal
        );
        assert_eq!(parse_lattice("no cell").unwrap(), CellRecord::Absent);
        assert!(parse_lattice("Lattice=\"1 2 3\"").is_err());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "traj.dcd", "");
        assert!(matches!(
            open_trajectory(&path, 1),
            Err(ContactError::Configuration(_))
        ));
    }

    #[test]
    fn runner_counts_and_normalizes() {
        let residues = point_residues(2);
        let frames = (0..10)
            .map(|n| line_frame(&[0.0, if n < 5 { 3.9 } else { 4.1 }]))
            .collect();
        let mut source = InMemoryTrajectory::new("memory", frames);
        let mut acc = ContactAccumulator::new(2, 1, Cutoff::new(4.0).unwrap()).unwrap();

        let n = run_trajectory(&mut source, &residues, &mut acc, 0, &ProgressBar::hidden()).unwrap();
        assert_eq!(n, 10);
        assert!(acc.is_finalized(0));
        assert_approx_eq!(acc.value(0, 1, 0), 0.5);
    }

    #[test]
    fn runner_rejects_empty_sources() {
        let residues = point_residues(2);
        let mut source = InMemoryTrajectory::new("nothing", vec![]);
        let mut acc = ContactAccumulator::new(2, 1, Cutoff::default()).unwrap();
        let err = run_trajectory(&mut source, &residues, &mut acc, 0, &ProgressBar::hidden())
            .unwrap_err();
        assert!(matches!(err, ContactError::EmptyTrajectory(ref label) if label == "nothing"));
    }

    #[test]
    fn runner_rejects_frames_missing_residue_atoms() {
        let residues = point_residues(3);
        let mut source = InMemoryTrajectory::new("short", vec![line_frame(&[0.0, 1.0])]);
        let mut acc = ContactAccumulator::new(3, 1, Cutoff::default()).unwrap();
        assert!(run_trajectory(&mut source, &residues, &mut acc, 0, &ProgressBar::hidden()).is_err());
    }
}
