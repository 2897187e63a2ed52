use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{ContactError, Result};

/// 3D coordinate vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Calculate Euclidean distance to another coordinate
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        self.distance2_to(other).sqrt()
    }

    pub fn distance2_to(&self, other: &Coordinate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}

/// Orthorhombic periodic box with its origin at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicBox {
    pub lengths: [f64; 3],
}

impl PeriodicBox {
    /// Returns `None` unless all three edge lengths are positive.
    pub fn new(lengths: [f64; 3]) -> Option<Self> {
        if lengths.iter().all(|&l| l.is_finite() && l > 0.0) {
            Some(Self { lengths })
        } else {
            None
        }
    }

    /// Squared minimum-image distance between two points.
    pub fn distance2(&self, a: &Coordinate, b: &Coordinate) -> f64 {
        let mut d = [a.x - b.x, a.y - b.y, a.z - b.z];
        for (delta, length) in d.iter_mut().zip(self.lengths.iter()) {
            *delta -= (*delta / length).round() * length;
        }
        d[0] * d[0] + d[1] * d[1] + d[2] * d[2]
    }
}

/// How a unit-cell record found in an input file should be treated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum CellRecord {
    /// No usable cell, including the conventional `1 1 1` placeholder.
    Absent,
    Orthorhombic(PeriodicBox),
    /// A real cell with non-right angles; distances ignore it.
    NonOrthogonal,
}

impl CellRecord {
    const ANGLE_TOLERANCE: f64 = 1e-3;

    pub(crate) fn from_lengths_angles(lengths: [f64; 3], angles: [f64; 3]) -> Self {
        if lengths.iter().all(|&l| (l - 1.0).abs() < f64::EPSILON) {
            return CellRecord::Absent;
        }
        let Some(pbc) = PeriodicBox::new(lengths) else {
            return CellRecord::Absent;
        };
        if angles
            .iter()
            .all(|&a| (a - 90.0).abs() < Self::ANGLE_TOLERANCE)
        {
            CellRecord::Orthorhombic(pbc)
        } else {
            CellRecord::NonOrthogonal
        }
    }

    /// Resolve to the box used for distances, warning once per source about
    /// cells that are ignored.
    pub(crate) fn resolve(self, source: &Path, warned: &mut bool) -> Option<PeriodicBox> {
        match self {
            CellRecord::Absent => None,
            CellRecord::Orthorhombic(pbc) => Some(pbc),
            CellRecord::NonOrthogonal => {
                if !*warned {
                    warn!(
                        "{}: non-orthogonal unit cell ignored, using plain distances",
                        source.display()
                    );
                    *warned = true;
                }
                None
            }
        }
    }
}

/// One snapshot of every atom in the system, in system atom order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub positions: Vec<Coordinate>,
    pub periodic_box: Option<PeriodicBox>,
}

impl Frame {
    pub fn new(positions: Vec<Coordinate>) -> Self {
        Self {
            positions,
            periodic_box: None,
        }
    }

    pub fn with_box(mut self, periodic_box: Option<PeriodicBox>) -> Self {
        self.periodic_box = periodic_box;
        self
    }

    pub fn size(&self) -> usize {
        self.positions.len()
    }

    /// Squared distance between atoms `i` and `j`, minimum image when the
    /// frame is periodic.
    pub fn distance2(&self, i: usize, j: usize) -> f64 {
        let a = &self.positions[i];
        let b = &self.positions[j];
        match &self.periodic_box {
            Some(pbc) => pbc.distance2(a, b),
            None => a.distance2_to(b),
        }
    }
}

/// Atom names that make up the protein backbone.
pub const BACKBONE_NAMES: &[&str] = &["N", "CA", "C", "O", "OXT"];

/// Static description of one atom, as read from the structure file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomRecord {
    pub serial: i64,
    pub name: String,
    pub resname: String,
    pub chain: char,
    pub resid: i32,
    pub insertion_code: char,
    pub element: String,
    pub is_hetero: bool,
}

impl AtomRecord {
    pub fn is_hydrogen(&self) -> bool {
        self.element.eq_ignore_ascii_case("H") || self.element.eq_ignore_ascii_case("D")
    }

    pub fn is_backbone(&self) -> bool {
        BACKBONE_NAMES.contains(&self.name.as_str())
    }
}

/// Guess an element symbol from a PDB atom name when columns 77-78 are blank.
pub(crate) fn element_from_name(name: &str) -> String {
    name.trim()
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .chars()
        .next()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase().to_string())
        .unwrap_or_default()
}

/// Whole-system description: atom records plus the positions found in the
/// structure file.
#[derive(Debug, Clone)]
pub struct System {
    pub path: PathBuf,
    pub atoms: Vec<AtomRecord>,
    pub reference: Frame,
}

impl System {
    pub fn n_atoms(&self) -> usize {
        self.atoms.len()
    }
}

pub(crate) fn is_atom_line(line: &str) -> bool {
    line.starts_with("ATOM") || line.starts_with("HETATM")
}

/// Only the blank and first alternate locations are kept, so the structure
/// and every trajectory frame agree on atom indices.
pub(crate) fn keeps_alt_loc(line: &str) -> bool {
    matches!(line.chars().nth(16).unwrap_or(' '), ' ' | 'A')
}

fn column(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end).unwrap_or("").trim()
}

fn parse_float(
    line: &str,
    start: usize,
    end: usize,
    label: &str,
    path: &Path,
    line_no: usize,
) -> Result<f64> {
    let token = column(line, start, end);
    token
        .parse::<f64>()
        .map_err(|_| ContactError::parse(path, line_no, format!("invalid {label}: '{token}'")))
}

pub(crate) fn parse_pdb_coordinate(line: &str, path: &Path, line_no: usize) -> Result<Coordinate> {
    let x = parse_float(line, 30, 38, "x coordinate", path, line_no)?;
    let y = parse_float(line, 38, 46, "y coordinate", path, line_no)?;
    let z = parse_float(line, 46, 54, "z coordinate", path, line_no)?;
    Ok(Coordinate::new(x, y, z))
}

pub(crate) fn parse_cryst1(line: &str, path: &Path, line_no: usize) -> Result<CellRecord> {
    if line.len() < 54 {
        return Err(ContactError::parse(path, line_no, "CRYST1 record too short"));
    }
    let a = parse_float(line, 6, 15, "cell length a", path, line_no)?;
    let b = parse_float(line, 15, 24, "cell length b", path, line_no)?;
    let c = parse_float(line, 24, 33, "cell length c", path, line_no)?;
    let alpha = parse_float(line, 33, 40, "cell angle alpha", path, line_no)?;
    let beta = parse_float(line, 40, 47, "cell angle beta", path, line_no)?;
    let gamma = parse_float(line, 47, 54, "cell angle gamma", path, line_no)?;
    Ok(CellRecord::from_lengths_angles([a, b, c], [alpha, beta, gamma]))
}

fn parse_atom_record(line: &str, path: &Path, line_no: usize) -> Result<AtomRecord> {
    if line.len() < 54 {
        return Err(ContactError::parse(path, line_no, "atom record too short"));
    }
    let resid_str = column(line, 22, 26);
    let resid = resid_str.parse::<i32>().map_err(|_| {
        ContactError::parse(path, line_no, format!("invalid residue number: '{resid_str}'"))
    })?;
    let name = column(line, 12, 16).to_string();
    let mut element = column(line, 76, 78).to_string();
    if element.is_empty() {
        element = element_from_name(&name);
    }

    Ok(AtomRecord {
        serial: column(line, 6, 11).parse().unwrap_or(0),
        name,
        resname: column(line, 17, 21).to_string(),
        chain: line.chars().nth(21).unwrap_or(' '),
        resid,
        insertion_code: line.chars().nth(26).unwrap_or(' '),
        element,
        is_hetero: line.starts_with("HETATM"),
    })
}

/// Load the atoms of the first model of a PDB file.
pub fn load_system(path: impl AsRef<Path>) -> Result<System> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ContactError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut atoms = Vec::new();
    let mut positions = Vec::new();
    let mut cell = CellRecord::Absent;

    for (index, line_result) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line_result.map_err(|e| ContactError::io(path, e))?;

        if line.starts_with("CRYST1") {
            cell = parse_cryst1(&line, path, line_no)?;
        } else if is_atom_line(&line) {
            if !keeps_alt_loc(&line) {
                continue;
            }
            atoms.push(parse_atom_record(&line, path, line_no)?);
            positions.push(parse_pdb_coordinate(&line, path, line_no)?);
        } else if line.starts_with("END") && !atoms.is_empty() {
            // ENDMDL or END: only the first model describes the system
            break;
        }
    }

    if atoms.is_empty() {
        return Err(ContactError::parse(path, 0, "no atoms found in structure"));
    }
    debug!("{}: loaded {} atoms", path.display(), atoms.len());

    let mut warned = false;
    let periodic_box = cell.resolve(path, &mut warned);
    Ok(System {
        path: path.to_path_buf(),
        atoms,
        reference: Frame::new(positions).with_box(periodic_box),
    })
}
