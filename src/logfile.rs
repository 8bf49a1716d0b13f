//! Benchmark log reading.
//!
//! Logs are plain text, one record per line. Archived logs may be stored
//! zstd-compressed as `{name}.zst`; those are decoded transparently.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Path of the compressed sibling of `path` (`{path}.zst`).
pub fn compressed_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".zst");
    PathBuf::from(name)
}

fn is_compressed(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "zst")
}

/// Pick the file to read for a configured log path.
///
/// The plain path wins when it exists. Otherwise a `.zst` sibling is used if
/// present; failing both, the configured path is returned unchanged so the
/// open error names it.
pub fn resolve(path: &Path) -> PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }
    let sibling = compressed_sibling(path);
    if sibling.exists() {
        tracing::debug!(
            path = %path.display(),
            archive = %sibling.display(),
            "using compressed log archive"
        );
        return sibling;
    }
    path.to_path_buf()
}

/// Read a log file into lines with terminators stripped.
///
/// Invalid UTF-8 is reported as an `InvalidData` I/O error.
pub fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    let resolved = resolve(path);
    let raw = std::fs::read(&resolved)?;
    let bytes = if is_compressed(&resolved) {
        zstd::decode_all(raw.as_slice())?
    } else {
        raw
    };
    let text =
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(text.lines().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_plain_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crimes_full_scan.txt");
        std::fs::write(&path, "number of tuples 5\nquery cost: 1.50ms.\n").unwrap();

        let lines = read_lines(&path).unwrap();
        assert_eq!(lines, vec!["number of tuples 5", "query cost: 1.50ms."]);
    }

    #[test]
    fn test_crlf_terminators_stripped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "a 1\r\nb 2\r\n").unwrap();

        let lines = read_lines(&path).unwrap();
        assert_eq!(lines, vec!["a 1", "b 2"]);
    }

    #[test]
    fn test_read_explicit_zst_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("job_acer.txt.zst");
        let compressed = zstd::encode_all("number of tuples 7\n".as_bytes(), 3).unwrap();
        std::fs::write(&path, compressed).unwrap();

        let lines = read_lines(&path).unwrap();
        assert_eq!(lines, vec!["number of tuples 7"]);
    }

    #[test]
    fn test_falls_back_to_compressed_sibling() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nasdaq_full_scan.txt");
        let compressed = zstd::encode_all("query cost: 3.00ms.\n".as_bytes(), 3).unwrap();
        std::fs::write(compressed_sibling(&path), compressed).unwrap();

        assert_eq!(resolve(&path), dir.path().join("nasdaq_full_scan.txt.zst"));
        let lines = read_lines(&path).unwrap();
        assert_eq!(lines, vec!["query cost: 3.00ms."]);
    }

    #[test]
    fn test_plain_file_preferred_over_archive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "plain\n").unwrap();
        let compressed = zstd::encode_all("archived\n".as_bytes(), 3).unwrap();
        std::fs::write(compressed_sibling(&path), compressed).unwrap();

        assert_eq!(read_lines(&path).unwrap(), vec!["plain"]);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = read_lines(&dir.path().join("absent.txt")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_invalid_utf8_is_invalid_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("binary.txt");
        std::fs::write(&path, [0xff, 0xfe, b'\n']).unwrap();

        let err = read_lines(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_empty_file_has_no_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "").unwrap();
        assert!(read_lines(&path).unwrap().is_empty());
    }
}
