//! Tab-separated text chunks.

use crate::io::compression::{create_writer, open_reader};
use crate::record::Record;
use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Read a (possibly compressed) UTF-8 chunk into one [`Record`] per line.
///
/// # Errors
/// Fails if the file cannot be opened or decoded, or contains invalid UTF-8.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let reader = BufReader::new(open_reader(path)?);
    let mut out = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read line {} in {}", i + 1, path.display()))?;
        out.push(Record::from_line(&line));
    }
    Ok(out)
}

/// Write lines to a chunk file, compressing according to its extension.
/// Returns the number of lines written.
pub fn write_lines<S: AsRef<str>>(path: impl AsRef<Path>, lines: &[S]) -> Result<usize> {
    let path = path.as_ref();
    let mut w = create_writer(path)?;
    for line in lines {
        w.write_all(line.as_ref().as_bytes())?;
        w.write_all(b"\n")?;
    }
    w.flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(lines.len())
}
