use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::Builder;

use crate::accumulator::ContactMatrix;
use crate::error::{ContactError, Result};

/// Format a value like C's `%.18e`: 18 fractional digits and an exponent
/// with an explicit sign and at least two digits (`5.0e-1` becomes
/// `5.000000000000000000e-01`).
pub fn format_value(value: f64) -> String {
    let formatted = format!("{value:.18e}");
    let Some((mantissa, exponent)) = formatted.split_once('e') else {
        return formatted;
    };
    match exponent.parse::<i32>() {
        Ok(exp) => {
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        Err(_) => formatted,
    }
}

/// Write `matrix` as whitespace-separated text, one row per line, preceded
/// by each line of `header` prefixed with `# `.
///
/// The file is written next to its destination and moved into place only
/// once complete, so a failed run never leaves a partial matrix behind.
pub fn write_matrix(path: impl AsRef<Path>, matrix: &ContactMatrix, header: &str) -> Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    #[cfg_attr(not(unix), allow(unused_mut))]
    let mut builder = Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Same mode as File::create once the umask is applied, not tempfile's 0600
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    let mut tmp = builder
        .tempfile_in(parent)
        .map_err(|e| ContactError::io(path, e))?;
    write_contents(&mut tmp, matrix, header).map_err(|e| ContactError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| ContactError::io(path, e.error))?;
    Ok(())
}

fn write_contents<W: Write>(out: &mut W, matrix: &ContactMatrix, header: &str) -> io::Result<()> {
    if !header.is_empty() {
        for line in header.lines() {
            writeln!(out, "# {line}")?;
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .from_writer(out);
    for row in matrix.rows().filter(|r| !r.is_empty()) {
        writer.write_record(row.iter().map(|&v| format_value(v)))?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a matrix written by [`write_matrix`] (or any whitespace-separated
/// square table); lines starting with `#` are skipped.
pub fn read_matrix(path: impl AsRef<Path>) -> Result<ContactMatrix> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| ContactError::io(path, io::Error::from(e)))?;

    let mut rows = Vec::new();
    for result in reader.deserialize::<Vec<f64>>() {
        let row = result.map_err(|e| {
            let line = e.position().map_or(0, |p| p.line() as usize);
            ContactError::parse(path, line, format!("invalid matrix row: {e}"))
        })?;
        rows.push(row);
    }

    ContactMatrix::from_rows(rows)
}

/// Where the matrix of a single trajectory goes: its file name with the last
/// extension replaced by `.dat`, inside `dir`.
pub fn per_trajectory_path(dir: &Path, traj: &Path) -> Result<PathBuf> {
    let stem = traj.file_stem().ok_or_else(|| {
        ContactError::Configuration(format!("{} has no file name", traj.display()))
    })?;
    let mut name = stem.to_os_string();
    name.push(".dat");
    Ok(dir.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::fs;

    #[test]
    fn values_use_c_style_exponents() {
        assert_eq!(format_value(0.5), "5.000000000000000000e-01");
        assert_eq!(format_value(0.0), "0.000000000000000000e+00");
        assert_eq!(format_value(1.0), "1.000000000000000000e+00");
        assert_eq!(format_value(1024.0), "1.024000000000000000e+03");
        assert_eq!(format_value(-0.25), "-2.500000000000000000e-01");
    }

    #[test]
    fn header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.dat");
        let matrix = ContactMatrix::from_rows(vec![vec![0.0, 0.5], vec![0.5, 0.0]]).unwrap();
        write_matrix(&path, &matrix, "all-contacts sys.pdb all out.dat t.pdb").unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# all-contacts sys.pdb all out.dat t.pdb");
        assert_eq!(
            lines[1],
            "0.000000000000000000e+00 5.000000000000000000e-01"
        );
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn written_matrix_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.dat");
        let matrix =
            ContactMatrix::from_rows(vec![vec![0.0, 0.2, 1.0], vec![0.2, 0.0, 0.4], vec![1.0, 0.4, 0.0]])
                .unwrap();
        write_matrix(&path, &matrix, "line one\nline two").unwrap();

        let back = read_matrix(&path).unwrap();
        assert_eq!(back.size(), 3);
        for (a, b) in back.values().iter().zip(matrix.values()) {
            assert_approx_eq!(a, b);
        }
    }

    #[test]
    fn empty_matrix_is_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.dat");
        write_matrix(&path, &ContactMatrix::zeros(0), "header").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "# header\n");
        assert_eq!(read_matrix(&path).unwrap().size(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn written_files_follow_the_umask() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("reference.dat");
        fs::File::create(&reference).unwrap();
        let path = dir.path().join("m.dat");
        write_matrix(&path, &ContactMatrix::zeros(2), "h").unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&path), mode(&reference));
    }

    #[test]
    fn unwritable_destination_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.dat");
        let err = write_matrix(&path, &ContactMatrix::zeros(1), "").unwrap_err();
        assert!(matches!(err, ContactError::Io { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn ragged_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragged.dat");
        fs::write(&path, "# h\n1.0 0.0\n0.0\n").unwrap();
        assert!(read_matrix(&path).is_err());
    }

    #[test]
    fn per_trajectory_name_drops_last_extension() {
        let path = per_trajectory_path(Path::new("out"), Path::new("/data/run1.prod.pdb")).unwrap();
        assert_eq!(path, Path::new("out").join("run1.prod.dat"));
    }
}
