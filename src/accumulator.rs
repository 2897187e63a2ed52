use crate::config::Cutoff;
use crate::contacts::has_contact;
use crate::error::{ContactError, Result};
use crate::residues::Residue;
use crate::structure::Frame;

/// Square residue × residue matrix, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactMatrix {
    size: usize,
    values: Vec<f64>,
}

impl ContactMatrix {
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            values: vec![0.0; size * size],
        }
    }

    /// Build from rows; every row must be as long as there are rows.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let size = rows.len();
        let mut values = Vec::with_capacity(size * size);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != size {
                return Err(ContactError::Configuration(format!(
                    "row {i} has {} columns, expected {size}",
                    row.len()
                )));
            }
            values.extend(row);
        }
        Ok(Self { size, values })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.size + j]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks(self.size.max(1))
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.rows().map(<[f64]>::to_vec).collect()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Contact counts for every residue pair in every trajectory.
///
/// The tensor is laid out as `T` consecutive `R × R` slices. Cells are only
/// written for `i != j`, always in symmetric pairs. Once a trajectory is
/// finalized its slice holds frequencies in `[0, 1]` and can no longer be
/// updated.
#[derive(Debug, Clone)]
pub struct ContactAccumulator {
    cutoff: Cutoff,
    n_residues: usize,
    n_trajectories: usize,
    counts: Vec<f64>,
    /// Frame count each trajectory was normalized by
    finalized: Vec<Option<usize>>,
}

impl ContactAccumulator {
    pub fn new(n_residues: usize, n_trajectories: usize, cutoff: Cutoff) -> Result<Self> {
        if n_trajectories == 0 {
            return Err(ContactError::Configuration(
                "contact accumulation needs at least one trajectory".to_string(),
            ));
        }
        Ok(Self {
            cutoff,
            n_residues,
            n_trajectories,
            counts: vec![0.0; n_residues * n_residues * n_trajectories],
            finalized: vec![None; n_trajectories],
        })
    }

    pub fn cutoff(&self) -> Cutoff {
        self.cutoff
    }

    pub fn n_residues(&self) -> usize {
        self.n_residues
    }

    pub fn n_trajectories(&self) -> usize {
        self.n_trajectories
    }

    fn offset(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.n_residues + i) * self.n_residues + j
    }

    fn slice_range(&self, k: usize) -> std::ops::Range<usize> {
        let len = self.n_residues * self.n_residues;
        k * len..(k + 1) * len
    }

    fn check_open(&self, k: usize) -> Result<()> {
        if k >= self.n_trajectories {
            return Err(ContactError::Configuration(format!(
                "trajectory index {k} out of range for {} trajectories",
                self.n_trajectories
            )));
        }
        if self.finalized[k].is_some() {
            return Err(ContactError::Configuration(format!(
                "trajectory {k} has already been finalized"
            )));
        }
        Ok(())
    }

    /// Count contacts of one frame into trajectory `k`.
    ///
    /// Every unordered pair `i < j` is tested exactly once; a contact bumps
    /// both `(i, j)` and `(j, i)`. Returns the number of pairs in contact.
    pub fn record_frame(&mut self, residues: &[Residue], frame: &Frame, k: usize) -> Result<usize> {
        self.check_open(k)?;
        if residues.len() != self.n_residues {
            return Err(ContactError::Configuration(format!(
                "accumulator sized for {} residues, got {}",
                self.n_residues,
                residues.len()
            )));
        }

        let mut in_contact = 0;
        for i in 0..residues.len() {
            for j in (i + 1)..residues.len() {
                if has_contact(self.cutoff, frame, &residues[i], &residues[j]) {
                    let upper = self.offset(i, j, k);
                    let lower = self.offset(j, i, k);
                    self.counts[upper] += 1.0;
                    self.counts[lower] += 1.0;
                    in_contact += 1;
                }
            }
        }
        Ok(in_contact)
    }

    /// Turn the counts of trajectory `k` into frequencies.
    pub fn finalize_trajectory(&mut self, k: usize, frame_count: usize) -> Result<()> {
        self.check_open(k)?;
        if frame_count == 0 {
            return Err(ContactError::EmptyTrajectory(format!("#{k}")));
        }
        let norm = frame_count as f64;
        let range = self.slice_range(k);
        self.counts[range].iter_mut().for_each(|c| *c /= norm);
        self.finalized[k] = Some(frame_count);
        Ok(())
    }

    pub fn is_finalized(&self, k: usize) -> bool {
        self.finalized.get(k).copied().flatten().is_some()
    }

    /// Frame count trajectory `k` was normalized by, once finalized.
    pub fn frame_count(&self, k: usize) -> Option<usize> {
        self.finalized.get(k).copied().flatten()
    }

    /// Raw tensor cell: a count before finalization, a frequency after.
    pub fn value(&self, i: usize, j: usize, k: usize) -> f64 {
        self.counts[self.offset(i, j, k)]
    }

    /// Copy of the slice for trajectory `k`.
    pub fn trajectory_matrix(&self, k: usize) -> ContactMatrix {
        ContactMatrix {
            size: self.n_residues,
            values: self.counts[self.slice_range(k)].to_vec(),
        }
    }

    /// Mean over trajectories of the normalized slices.
    pub fn average(&self) -> Result<ContactMatrix> {
        if let Some(k) = self.finalized.iter().position(Option::is_none) {
            return Err(ContactError::Configuration(format!(
                "cannot average before trajectory {k} is finalized"
            )));
        }

        let mut average = ContactMatrix::zeros(self.n_residues);
        for k in 0..self.n_trajectories {
            let slice = &self.counts[self.slice_range(k)];
            for (acc, value) in average.values.iter_mut().zip(slice) {
                *acc += value;
            }
        }
        let n = self.n_trajectories as f64;
        average.values.iter_mut().for_each(|v| *v /= n);
        Ok(average)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::residues::ResidueId;
    use crate::structure::Coordinate;
    use assert_approx_eq::assert_approx_eq;

    /// One residue per atom, named `RES<n>`.
    pub(crate) fn point_residues(n: usize) -> Vec<Residue> {
        (0..n)
            .map(|i| Residue {
                id: ResidueId {
                    chain: 'A',
                    resid: i as i32 + 1,
                    insertion_code: ' ',
                    resname: "RES".to_string(),
                },
                atoms: vec![i],
            })
            .collect()
    }

    /// Atoms on the x axis at the given positions.
    pub(crate) fn line_frame(xs: &[f64]) -> Frame {
        Frame::new(xs.iter().map(|&x| Coordinate::new(x, 0.0, 0.0)).collect())
    }

    #[test]
    fn always_and_never_in_contact() {
        let residues = point_residues(3);
        let mut acc = ContactAccumulator::new(3, 1, Cutoff::default()).unwrap();
        for _ in 0..7 {
            acc.record_frame(&residues, &line_frame(&[0.0, 3.0, 50.0]), 0)
                .unwrap();
        }
        acc.finalize_trajectory(0, 7).unwrap();

        assert_approx_eq!(acc.value(0, 1, 0), 1.0);
        assert_approx_eq!(acc.value(1, 0, 0), 1.0);
        assert_eq!(acc.value(0, 2, 0), 0.0);
        assert_eq!(acc.value(1, 2, 0), 0.0);
    }

    #[test]
    fn half_of_the_frames() {
        let residues = point_residues(2);
        let mut acc = ContactAccumulator::new(2, 1, Cutoff::new(4.0).unwrap()).unwrap();
        for frame in 0..10 {
            let x = if frame < 5 { 3.5 } else { 4.5 };
            acc.record_frame(&residues, &line_frame(&[0.0, x]), 0).unwrap();
        }
        acc.finalize_trajectory(0, 10).unwrap();
        let average = acc.average().unwrap();
        assert_approx_eq!(average.get(0, 1), 0.5);
        assert_approx_eq!(average.get(1, 0), 0.5);
    }

    #[test]
    fn symmetric_with_zero_diagonal_and_bounded() {
        let residues = point_residues(4);
        let mut acc = ContactAccumulator::new(4, 2, Cutoff::new(2.5).unwrap()).unwrap();
        let frames = [
            line_frame(&[0.0, 2.0, 4.0, 6.0]),
            line_frame(&[0.0, 1.0, 2.0, 30.0]),
            line_frame(&[0.0, 10.0, 11.0, 12.0]),
        ];
        for (n, frame) in frames.iter().enumerate() {
            acc.record_frame(&residues, frame, n % 2).unwrap();
        }
        acc.finalize_trajectory(0, 2).unwrap();
        acc.finalize_trajectory(1, 1).unwrap();

        for k in 0..2 {
            for i in 0..4 {
                assert_eq!(acc.value(i, i, k), 0.0);
                for j in 0..4 {
                    let v = acc.value(i, j, k);
                    assert_eq!(v, acc.value(j, i, k));
                    assert!((0.0..=1.0).contains(&v));
                }
            }
        }
        let average = acc.average().unwrap();
        assert!(average.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn record_frame_reports_pairs_in_contact() {
        let residues = point_residues(3);
        let mut acc = ContactAccumulator::new(3, 1, Cutoff::default()).unwrap();
        let n = acc
            .record_frame(&residues, &line_frame(&[0.0, 1.0, 2.0]), 0)
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(acc.value(0, 2, 0), 1.0);
    }

    #[test]
    fn average_is_mean_over_trajectories() {
        let residues = point_residues(2);
        let mut acc = ContactAccumulator::new(2, 3, Cutoff::default()).unwrap();
        for (k, hits) in [1, 2, 3].into_iter().enumerate() {
            for frame in 0..5 {
                let x = if frame < hits { 1.0 } else { 10.0 };
                acc.record_frame(&residues, &line_frame(&[0.0, x]), k)
                    .unwrap();
            }
            acc.finalize_trajectory(k, 5).unwrap();
        }

        assert_approx_eq!(acc.trajectory_matrix(0).get(0, 1), 0.2);
        assert_approx_eq!(acc.trajectory_matrix(1).get(0, 1), 0.4);
        assert_approx_eq!(acc.trajectory_matrix(2).get(0, 1), 0.6);
        let average = acc.average().unwrap();
        let mean: f64 = (0..3).map(|k| acc.value(0, 1, k)).sum::<f64>() / 3.0;
        assert_approx_eq!(average.get(0, 1), 0.4);
        assert_approx_eq!(average.get(0, 1), mean);
        assert_eq!(acc.frame_count(1), Some(5));
    }

    #[test]
    fn degenerate_residue_counts() {
        for n in [0, 1] {
            let residues = point_residues(n);
            let mut acc = ContactAccumulator::new(n, 1, Cutoff::default()).unwrap();
            let frame = line_frame(&vec![0.0; n]);
            assert_eq!(acc.record_frame(&residues, &frame, 0).unwrap(), 0);
            acc.finalize_trajectory(0, 1).unwrap();
            let average = acc.average().unwrap();
            assert_eq!(average.size(), n);
            assert!(average.values().iter().all(|&v| v == 0.0));
            assert_eq!(average.rows().count(), n);
        }
    }

    #[test]
    fn empty_residue_never_counts() {
        let mut residues = point_residues(2);
        residues[0].atoms.clear();
        let mut acc = ContactAccumulator::new(2, 1, Cutoff::default()).unwrap();
        acc.record_frame(&residues, &line_frame(&[0.0, 0.0]), 0)
            .unwrap();
        acc.finalize_trajectory(0, 1).unwrap();
        assert_eq!(acc.value(0, 1, 0), 0.0);
    }

    #[test]
    fn lifecycle_errors() {
        let residues = point_residues(2);
        assert!(ContactAccumulator::new(2, 0, Cutoff::default()).is_err());

        let mut acc = ContactAccumulator::new(2, 2, Cutoff::default()).unwrap();
        assert!(matches!(
            acc.finalize_trajectory(0, 0),
            Err(ContactError::EmptyTrajectory(_))
        ));
        assert!(acc.record_frame(&residues, &line_frame(&[0.0, 1.0]), 2).is_err());
        assert!(acc
            .record_frame(&point_residues(3), &line_frame(&[0.0, 1.0, 2.0]), 0)
            .is_err());

        acc.finalize_trajectory(0, 1).unwrap();
        assert!(acc.is_finalized(0));
        assert!(acc.finalize_trajectory(0, 1).is_err());
        assert!(acc.record_frame(&residues, &line_frame(&[0.0, 1.0]), 0).is_err());
        assert!(acc.average().is_err());

        acc.finalize_trajectory(1, 3).unwrap();
        assert!(acc.average().is_ok());
    }

    #[test]
    fn matrix_from_rows_checks_shape() {
        let m = ContactMatrix::from_rows(vec![vec![0.0, 0.5], vec![0.5, 0.0]]).unwrap();
        assert_eq!(m.size(), 2);
        assert_eq!(m.to_rows()[1], vec![0.5, 0.0]);
        assert!(ContactMatrix::from_rows(vec![vec![0.0], vec![0.5, 0.0]]).is_err());
        assert_eq!(ContactMatrix::from_rows(vec![]).unwrap(), ContactMatrix::zeros(0));
    }
}
