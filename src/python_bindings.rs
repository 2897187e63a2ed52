use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use std::path::PathBuf;

use crate::accumulator::ContactMatrix;
use crate::config::{ContactConfig, RunConfig};
use crate::error::ContactError;
use crate::output::read_matrix;
use crate::pipeline::run;

fn to_py_err(err: ContactError) -> PyErr {
    match err {
        ContactError::Io { .. } => PyErr::new::<PyIOError, _>(err.to_string()),
        ContactError::Configuration(_)
        | ContactError::InvalidSelection { .. }
        | ContactError::InvalidCutoff(_) => PyErr::new::<PyValueError, _>(err.to_string()),
        _ => PyErr::new::<PyRuntimeError, _>(err.to_string()),
    }
}

fn matrix_to_py(py: Python<'_>, matrix: &ContactMatrix) -> PyResult<PyObject> {
    let rows = PyList::empty_bound(py);
    for row in matrix.rows().filter(|r| !r.is_empty()) {
        rows.append(PyList::new_bound(py, row))?;
    }
    Ok(rows.into())
}

/// Python binding for a full contact run
///
/// Returns a dict with `residues` (labels in matrix order), `average` and
/// `per_trajectory` (one dict per trajectory with `path`, `frames` and
/// `matrix`). Matrices are only written to disk when `out_file` is given.
#[pyfunction]
#[pyo3(signature = (system_file, selection, traj_files, cutoff=4.0, no_hydrogens=false, no_backbone=false, out_file=None))]
#[allow(clippy::too_many_arguments)]
fn contact_frequencies(
    py: Python<'_>,
    system_file: &str,
    selection: &str,
    traj_files: Vec<String>,
    cutoff: f64,
    no_hydrogens: bool,
    no_backbone: bool,
    out_file: Option<&str>,
) -> PyResult<PyObject> {
    // Without an output file everything goes to a scratch directory that is
    // dropped afterwards
    let (scratch, out_path, side_dir) = match out_file {
        Some(path) => (None, PathBuf::from(path), PathBuf::from(".")),
        None => {
            let dir = tempfile::tempdir().map_err(|e| {
                PyErr::new::<PyIOError, _>(format!("Failed to create scratch directory: {}", e))
            })?;
            let out_path = dir.path().join("average.dat");
            let side_dir = dir.path().to_path_buf();
            (Some(dir), out_path, side_dir)
        }
    };

    let config = RunConfig::new(
        system_file,
        selection,
        out_path,
        traj_files.into_iter().map(PathBuf::from).collect(),
    )
    .with_contact(ContactConfig {
        cutoff,
        exclude_hydrogens: no_hydrogens,
        exclude_backbone: no_backbone,
    })
    .with_header(format!(
        "contact_frequencies(system_file={system_file}, selection={selection}, cutoff={cutoff})"
    ))
    .with_per_trajectory_dir(side_dir);

    let report = py.allow_threads(|| run(&config)).map_err(to_py_err)?;

    let py_dict = PyDict::new_bound(py);
    let residues: Vec<String> = report.residues.iter().map(|r| r.to_string()).collect();
    py_dict.set_item("residues", residues)?;
    py_dict.set_item("average", matrix_to_py(py, &report.average)?)?;

    let py_trajectories = PyList::empty_bound(py);
    for result in &report.per_trajectory {
        let entry = PyDict::new_bound(py);
        entry.set_item("path", result.path.display().to_string())?;
        entry.set_item("frames", result.frames)?;
        entry.set_item("matrix", matrix_to_py(py, &result.matrix)?)?;
        if scratch.is_none() {
            if let Some(output) = &result.output {
                entry.set_item("output", output.display().to_string())?;
            }
        }
        py_trajectories.append(entry)?;
    }
    py_dict.set_item("per_trajectory", py_trajectories)?;

    Ok(py_dict.into())
}

/// Python binding for reading a matrix file back as a list of rows
#[pyfunction]
fn load_matrix(py: Python<'_>, path: &str) -> PyResult<PyObject> {
    let matrix = read_matrix(path).map_err(to_py_err)?;
    matrix_to_py(py, &matrix)
}

/// Python module definition
#[pymodule]
fn all_contacts_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(contact_frequencies, m)?)?;
    m.add_function(wrap_pyfunction!(load_matrix, m)?)?;
    m.add("__doc__", "Residue contact frequencies over MD trajectories")?;
    Ok(())
}
