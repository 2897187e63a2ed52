use crate::config::Cutoff;
use crate::residues::Residue;
use crate::structure::Frame;

/// True when any atom of `a` lies within `cutoff` of any atom of `b` in
/// `frame` (distance <= cutoff, minimum image if the frame is periodic).
///
/// An empty group is never in contact with anything.
pub fn within_distance(cutoff: Cutoff, frame: &Frame, a: &[usize], b: &[usize]) -> bool {
    let limit = cutoff.squared();
    a.iter()
        .any(|&i| b.iter().any(|&j| frame.distance2(i, j) <= limit))
}

/// Whether two residues are in contact in `frame`.
pub fn has_contact(cutoff: Cutoff, frame: &Frame, a: &Residue, b: &Residue) -> bool {
    within_distance(cutoff, frame, &a.atoms, &b.atoms)
}
