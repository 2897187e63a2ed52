use std::collections::HashMap;
use std::fmt;

use log::debug;

use crate::error::Result;
use crate::selection::Selection;
use crate::structure::System;

/// Identity of a residue within the structure file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResidueId {
    pub chain: char,
    pub resid: i32,
    pub insertion_code: char,
    pub resname: String,
}

impl fmt::Display for ResidueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.resname, self.resid)?;
        if self.insertion_code != ' ' {
            write!(f, "{}", self.insertion_code)?;
        }
        if self.chain != ' ' {
            write!(f, ":{}", self.chain)?;
        }
        Ok(())
    }
}

/// One residue of interest: its identity and the indices of its atoms in
/// system (and therefore frame) order.
///
/// Positions are never stored here; they are looked up in whichever frame is
/// current, so a residue can be shared across trajectories unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Residue {
    pub id: ResidueId,
    pub atoms: Vec<usize>,
}

impl Residue {
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

/// Stage 1: the candidate atoms the selection is evaluated against.
///
/// Hydrogens are removed from the whole system here, before the selection
/// runs. Without the filter every atom of the system is a candidate.
pub fn candidate_atoms(system: &System, exclude_hydrogens: bool) -> Vec<usize> {
    (0..system.n_atoms())
        .filter(|&i| !(exclude_hydrogens && system.atoms[i].is_hydrogen()))
        .collect()
}

/// Stage 3: partition atoms into residues, ordered by first appearance.
///
/// Atoms of a residue need not be contiguous; they are gathered under the
/// residue that first claimed their (chain, resid, insertion code, resname).
pub fn split_by_residue(system: &System, atoms: &[usize]) -> Vec<Residue> {
    let mut residues: Vec<Residue> = Vec::new();
    let mut lookup: HashMap<ResidueId, usize> = HashMap::new();

    for &index in atoms {
        let atom = &system.atoms[index];
        let id = ResidueId {
            chain: atom.chain,
            resid: atom.resid,
            insertion_code: atom.insertion_code,
            resname: atom.resname.clone(),
        };
        match lookup.get(&id) {
            Some(&slot) => residues[slot].atoms.push(index),
            None => {
                lookup.insert(id.clone(), residues.len());
                residues.push(Residue {
                    id,
                    atoms: vec![index],
                });
            }
        }
    }

    residues
}

/// Stage 4: drop backbone atoms from each residue after the split.
///
/// Residues are kept even when nothing is left of them (a glycine reduced to
/// its backbone), so residue indices do not depend on this flag.
pub fn strip_backbone(system: &System, residues: Vec<Residue>) -> Vec<Residue> {
    residues
        .into_iter()
        .map(|mut residue| {
            residue.atoms.retain(|&i| !system.atoms[i].is_backbone());
            residue
        })
        .collect()
}

/// Build the ordered residue groups used for contact counting.
///
/// The stages always run in this order:
/// 1. hydrogen filter on the whole system (optional),
/// 2. selection,
/// 3. split by residue,
/// 4. backbone filter on each residue (optional).
///
/// Filtering the backbone before the split would make backbone-only residues
/// disappear, shifting every later residue index.
///
/// A malformed `expression` is reported as
/// [`ContactError::InvalidSelection`](crate::error::ContactError::InvalidSelection).
pub fn build_residues(
    system: &System,
    expression: &str,
    exclude_hydrogens: bool,
    exclude_backbone: bool,
) -> Result<Vec<Residue>> {
    let selection = Selection::parse(expression)?;
    let candidates = candidate_atoms(system, exclude_hydrogens);
    let target = selection.select(system, &candidates);
    debug!(
        "selection '{}' matched {} of {} candidate atoms",
        selection.expression(),
        target.len(),
        candidates.len()
    );

    let mut residues = split_by_residue(system, &target);
    if exclude_backbone {
        residues = strip_backbone(system, residues);
    }

    let empty = residues.iter().filter(|r| r.is_empty()).count();
    if empty > 0 {
        debug!("{empty} residues have no atoms left and will never be in contact");
    }
    Ok(residues)
}
