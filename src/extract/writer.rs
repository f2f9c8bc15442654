//! Append-only CSV output for harvested rows.
//!
//! The header goes out once per file. Each batch is serialized in memory and
//! handed to the file in a single write, so rows already on disk are never
//! interleaved with a half-written batch.

use std::{
    fs::{self, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};

use crate::models::TABLE_COLUMNS;
use crate::NormalizedRecord;

// ---

/// Single writer for the harvested table.
#[derive(Debug)]
pub struct TableWriter {
    path: PathBuf,
    header_written: bool,
}

impl TableWriter {
    /// Prepare to append to `path`.
    ///
    /// An existing non-empty file already has its header, so later appends
    /// add rows only. Its header must match the table layout. A partial last
    /// line left by an interrupted write is cut off first.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        // ---
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating output dir {}", parent.display()))?;
        }
        let header_written = path.exists() && drop_torn_tail(&path)? > 0;
        if header_written {
            check_header(&path)?;
            tracing::info!(file = %path.display(), "appending to existing table");
        }
        Ok(Self {
            path,
            header_written,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `batch`; returns the number of rows written.
    pub fn append(&mut self, batch: &[NormalizedRecord]) -> Result<usize> {
        // ---
        if batch.is_empty() {
            return Ok(0);
        }

        let mut csv = csv::WriterBuilder::new()
            .has_headers(!self.header_written)
            .from_writer(Vec::new());
        for row in batch {
            csv.serialize(row)?;
        }
        let bytes = csv
            .into_inner()
            .map_err(|e| anyhow::anyhow!("serializing batch: {}", e))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        file.write_all(&bytes)
            .with_context(|| format!("appending to {}", self.path.display()))?;
        file.sync_data()
            .with_context(|| format!("syncing {}", self.path.display()))?;

        self.header_written = true;
        Ok(batch.len())
    }
}

/// Truncate `path` back to its last newline; returns the length kept.
fn drop_torn_tail(path: &Path) -> Result<u64> {
    // ---
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let len = file.metadata()?.len();

    let mut keep = 0;
    let mut end = len;
    let mut buf = [0u8; 8192];
    while end > 0 {
        let start = end.saturating_sub(buf.len() as u64);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|b| *b == b'\n') {
            keep = start + pos as u64 + 1;
            break;
        }
        end = start;
    }

    if keep < len {
        let mut tail = Vec::new();
        file.seek(SeekFrom::Start(keep))?;
        file.read_to_end(&mut tail)?;
        tracing::warn!(
            file = %path.display(),
            dropped_bytes = len - keep,
            tail = %String::from_utf8_lossy(&tail),
            "dropping partial row left by an interrupted write"
        );
        file.set_len(keep)
            .with_context(|| format!("truncating {}", path.display()))?;
        file.sync_data()?;
    }
    Ok(keep)
}

fn check_header(path: &Path) -> Result<()> {
    // ---
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("reading header of {}", path.display()))?;
    let header = reader.headers()?;
    if !header.iter().eq(TABLE_COLUMNS) {
        bail!(
            "{} exists but is not a harvest table (header: {:?})",
            path.display(),
            header
        );
    }
    Ok(())
}
