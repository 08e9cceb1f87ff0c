// LogTally - platform/fs.rs
//
// File access helpers: opening log files for line reading and reading
// their modification time as a local timestamp.

use chrono::{DateTime, Local, NaiveDateTime};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

/// Modification time of `path` in local time.
pub fn modified_local(path: &Path) -> io::Result<NaiveDateTime> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Local>::from(modified).naive_local())
}

/// Open a log file for buffered line reading, along with its modification
/// time.
pub fn open_log(path: &Path) -> io::Result<(BufReader<File>, NaiveDateTime)> {
    let file = File::open(path)?;
    let modified = file.metadata()?.modified()?;
    let mtime = DateTime::<Local>::from(modified).naive_local();
    Ok((BufReader::new(file), mtime))
}

/// Read a definition file, refusing files larger than `max_size` bytes.
///
/// Returns `Ok(Err(size))` for an oversized file. Invalid UTF-8 is
/// replaced rather than rejected.
pub fn read_limited(path: &Path, max_size: u64) -> io::Result<Result<String, u64>> {
    let size = std::fs::metadata(path)?.len();
    if size > max_size {
        return Ok(Err(size));
    }
    let bytes = std::fs::read(path)?;
    Ok(Ok(String::from_utf8_lossy(&bytes).into_owned()))
}
