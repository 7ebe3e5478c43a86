//! Zip payload helpers.
//!
//! Errors are plain strings; importers wrap them with their provider name.

use std::io::{self, Cursor, Read, Seek};

use zip::ZipArchive;

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_PREALLOC: usize = 64 << 20;

fn initial_capacity(declared: u64) -> usize {
    usize::try_from(declared).map_or(MAX_PREALLOC, |n| n.min(MAX_PREALLOC))
}

/// Read a zip entry to the end. The declared size only sizes the first
/// allocation, capped, since headers are untrusted.
pub fn read_to_vec(mut reader: impl Read, declared: u64) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(initial_capacity(declared));
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

fn open<R: Read + Seek>(reader: R) -> Result<ZipArchive<R>, String> {
    ZipArchive::new(reader).map_err(|e| format!("invalid zip archive: {e}"))
}

/// Entry names in archive order, directories excluded.
pub fn entry_names<R: Read + Seek>(reader: R) -> Result<Vec<String>, String> {
    let archive = open(reader)?;
    Ok(archive
        .file_names()
        .filter(|n| !n.ends_with('/'))
        .map(str::to_string)
        .collect())
}

/// Read one entry fully into memory.
pub fn read_entry<R: Read + Seek>(reader: R, name: &str) -> Result<Vec<u8>, String> {
    let mut archive = open(reader)?;
    let entry = archive
        .by_name(name)
        .map_err(|e| format!("entry '{name}': {e}"))?;
    let declared = entry.size();
    read_to_vec(entry, declared).map_err(|e| format!("entry '{name}': {e}"))
}

/// Names of in-memory archive entries with the given extension (case-insensitive).
pub fn entries_with_extension(bytes: &[u8], extension: &str) -> Result<Vec<String>, String> {
    let suffix = format!(".{}", extension.trim_start_matches('.').to_ascii_lowercase());
    Ok(entry_names(Cursor::new(bytes))?
        .into_iter()
        .filter(|n| n.to_ascii_lowercase().ends_with(&suffix))
        .collect())
}
