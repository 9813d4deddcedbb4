//! Order-preserving output writer.
//!
//! Line *n* of the output file always holds the result for `work_id = n`.
//! Results arriving out of order are buffered in memory until the gap
//! before them closes; each drained line is flushed and fsynced before the
//! write position advances, so the resume count observed at the next
//! startup never exceeds what is actually on disk.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::DispatcherError;

pub struct OutputWriter {
    path: PathBuf,
    file: File,
    next_write_id: u64,
    buffered: BTreeMap<u64, String>,
}

impl OutputWriter {
    /// Open the output file (creating it if absent), count the complete
    /// lines already present, truncate any trailing partial line, and
    /// position the handle at the end. The complete-line count becomes the
    /// resume position: the next `work_id` this writer expects.
    pub async fn open(path: &Path) -> Result<Self, DispatcherError> {
        let io = |e| DispatcherError::output_io(path, e);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await
            .map_err(io)?;

        let mut complete_lines = 0u64;
        let mut complete_end = 0u64;
        let mut offset = 0u64;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).await.map_err(io)?;
            if n == 0 {
                break;
            }
            for &byte in &buf[..n] {
                offset += 1;
                if byte == b'\n' {
                    complete_lines += 1;
                    complete_end = offset;
                }
            }
        }

        if offset > complete_end {
            // A crash mid-write left a half-line; resume must start clean.
            tracing::warn!(
                bytes = offset - complete_end,
                "truncating partial trailing line in output file"
            );
            file.set_len(complete_end).await.map_err(io)?;
        }
        file.seek(SeekFrom::Start(complete_end)).await.map_err(io)?;

        if complete_lines > 0 {
            tracing::info!(lines = complete_lines, path = %path.display(), "resuming output file");
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_write_id: complete_lines,
            buffered: BTreeMap::new(),
        })
    }

    /// Buffer a result, then drain every contiguous result starting at
    /// `next_write_id` to disk. Results below the write position are stale
    /// duplicates and are dropped without error.
    pub async fn accept(&mut self, work_id: u64, result: String) -> Result<(), DispatcherError> {
        if work_id < self.next_write_id {
            tracing::debug!(work_id, "discarding result below write position");
            return Ok(());
        }
        self.buffered.insert(work_id, result);

        while let Some(result) = self.buffered.remove(&self.next_write_id) {
            self.write_line(&result).await?;
            self.next_write_id += 1;
        }
        Ok(())
    }

    async fn write_line(&mut self, result: &str) -> Result<(), DispatcherError> {
        let io = |e| DispatcherError::output_io(&self.path, e);
        self.file.write_all(result.as_bytes()).await.map_err(io)?;
        self.file.write_all(b"\n").await.map_err(io)?;
        self.file.flush().await.map_err(io)?;
        self.file.sync_data().await.map_err(io)?;
        Ok(())
    }

    /// The next `work_id` expected to be written. Equals the number of
    /// complete lines on disk.
    pub fn position(&self) -> u64 {
        self.next_write_id
    }

    /// Number of out-of-order results currently held in memory.
    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    /// True when no out-of-order results are waiting to be written.
    pub fn is_drained(&self) -> bool {
        self.buffered.is_empty()
    }
}
