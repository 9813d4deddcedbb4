use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use crate::error::DispatcherError;

/// Streams the input file line by line, assigning each line its zero-based
/// index as `work_id`. The reader is the sole line-number authority.
pub struct InputReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    cursor: u64,
    eof: bool,
}

impl InputReader {
    pub async fn open(path: &Path) -> Result<Self, DispatcherError> {
        let file = File::open(path)
            .await
            .map_err(|e| DispatcherError::input_io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            cursor: 0,
            eof: false,
        })
    }

    /// Read up to `n` further lines, paired with their line indices.
    /// Returns a short (possibly empty) batch once the file is exhausted.
    /// Trailing `\n` / `\r\n` is stripped; empty lines are preserved and
    /// still consume a `work_id`.
    pub async fn next_batch(&mut self, n: u64) -> Result<Vec<(u64, String)>, DispatcherError> {
        let mut batch = Vec::new();
        while !self.eof && (batch.len() as u64) < n {
            match self.next_line().await? {
                Some(content) => {
                    batch.push((self.cursor, content));
                    self.cursor += 1;
                }
                None => self.eof = true,
            }
        }
        Ok(batch)
    }

    /// Discard the first `k` lines without materializing them. Called once
    /// at startup with the writer's resume position.
    pub async fn skip(&mut self, k: u64) -> Result<(), DispatcherError> {
        for skipped in 0..k {
            match self.next_line().await? {
                Some(_) => self.cursor += 1,
                None => {
                    // The output file claims more lines than the input has.
                    tracing::warn!(
                        requested = k,
                        skipped,
                        "input ended while skipping resumed lines"
                    );
                    self.eof = true;
                    break;
                }
            }
        }
        Ok(())
    }

    async fn next_line(&mut self) -> Result<Option<String>, DispatcherError> {
        self.lines
            .next_line()
            .await
            .map_err(|e| DispatcherError::input_io(&self.path, e))
    }

    /// Number of lines emitted (or skipped) so far.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// True once the reader has observed end of file.
    pub fn eof(&self) -> bool {
        self.eof
    }
}
