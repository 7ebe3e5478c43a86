//! On-disk Parquet cache for large sources.
//!
//! Entries are directories of Parquet files named after a blake3 hash of the
//! cache key. With [`DiskCache::temporary`] the directory belongs to one
//! importer and disappears when it is dropped. With [`DiskCache::at`] the
//! cache is shared by path: instances pointing at the same directory are not
//! coordinated and may race on writes.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use tempfile::TempDir;

use crate::error::Result;

const ZSTD_LEVEL: i32 = 3;
const READ_BATCH_SIZE: usize = 64 * 1024;

/// Buffered parquet writer with atomic tmp→rename
pub struct ParquetSink {
    writer: ArrowWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_count: usize,
}

impl std::fmt::Debug for ParquetSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetSink")
            .field("final_path", &self.final_path)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl ParquetSink {
    /// Create a sink writing to `<final_path>.tmp`
    pub fn create(final_path: &Path, schema: &SchemaRef) -> io::Result<Self> {
        let tmp_path = final_path.with_extension("parquet.tmp");

        // Clean up stale tmp file
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let file = File::create(&tmp_path)?;
        let level = ZstdLevel::try_new(ZSTD_LEVEL)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(level))
            .set_max_row_group_size(1024 * 1024)
            .build();

        let writer =
            ArrowWriter::try_new(file, schema.clone(), Some(props)).map_err(io::Error::other)?;

        Ok(Self {
            writer,
            tmp_path,
            final_path: final_path.to_path_buf(),
            row_count: 0,
        })
    }

    pub fn write_batch(&mut self, batch: &RecordBatch) -> io::Result<()> {
        self.row_count += batch.num_rows();
        self.writer.write(batch).map_err(io::Error::other)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Finalize: flush footer and atomically rename tmp → final
    pub fn finalize(self) -> io::Result<usize> {
        let row_count = self.row_count;
        self.writer.close().map_err(io::Error::other)?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(row_count)
    }
}

/// Check if a completed parquet file exists and has a valid footer
pub fn is_valid_parquet(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    parquet::file::reader::SerializedFileReader::new(file).is_ok()
}

/// Remove stale .tmp files left by an interrupted write
pub fn cleanup_tmp_files(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            cleanup_tmp_files(&path)?;
        } else if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Read every batch of a Parquet file.
pub fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
        .with_batch_size(READ_BATCH_SIZE)
        .build()?;
    Ok(reader.collect::<std::result::Result<Vec<_>, _>>()?)
}

#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    // Held for its Drop: removes the directory with the owning importer
    _temp: Option<TempDir>,
}

impl DiskCache {
    /// Private cache in a fresh temporary directory.
    pub fn temporary(prefix: &str) -> io::Result<Self> {
        let temp = tempfile::Builder::new().prefix(prefix).tempdir()?;
        Ok(Self {
            dir: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    /// Cache shared by path. Stale `.tmp` files from interrupted writes are removed.
    pub fn at(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        cleanup_tmp_files(&dir)?;
        Ok(Self { dir, _temp: None })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory holding the files of one cache entry.
    pub fn entry_dir(&self, key: &str) -> PathBuf {
        let hash = blake3::hash(key.as_bytes()).to_hex();
        self.dir.join(&hash.as_str()[..16])
    }

    /// Start writing `name.parquet` inside the entry for `key`.
    pub fn writer(&self, key: &str, name: &str, schema: &SchemaRef) -> io::Result<ParquetSink> {
        let dir = self.entry_dir(key);
        fs::create_dir_all(&dir)?;
        ParquetSink::create(&dir.join(format!("{name}.parquet")), schema)
    }

    /// Completed Parquet files of an entry, sorted by name.
    pub fn files(&self, key: &str) -> Vec<PathBuf> {
        let pattern = self.entry_dir(key).join("*.parquet");
        let Some(pattern) = pattern.to_str() else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = glob::glob(pattern)
            .map(|paths| paths.filter_map(|p| p.ok()).collect())
            .unwrap_or_default();
        files.sort();
        files.retain(|p| is_valid_parquet(p));
        files
    }

    pub fn contains(&self, key: &str) -> bool {
        !self.files(key).is_empty()
    }

    /// Delete one entry; missing entries are fine.
    pub fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_dir_all(self.entry_dir(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Delete every entry, keeping the cache directory itself.
    pub fn clear(&self) -> io::Result<()> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}
