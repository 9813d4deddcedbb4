//! The work-queue state machine.
//!
//! Tracks every line that has been read from the input but not yet
//! persisted to the output: pending lines wait in a strict FIFO, issued
//! lines carry the timestamp of their most recent issuance, and the
//! periodic sweep either re-queues or tombstones issuances that outlive
//! the work timeout. This is the single authoritative copy of dispatcher
//! state; the HTTP layer serializes all access through one lock.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::DispatcherError;
use crate::protocol::{StatusResponse, WorkItem, WorkResult, tombstone_line};
use crate::reader::InputReader;
use crate::writer::OutputWriter;

/// A line that has been read from the input but not yet retired.
/// `retry_count` is the number of issuances that have timed out so far.
struct LiveItem {
    content: String,
    retry_count: u32,
}

/// Outcome of a `get_work` issuance attempt.
#[derive(Debug)]
pub enum Issue {
    /// Work to hand to the caller, in FIFO order.
    Batch(Vec<WorkItem>),
    /// Nothing issuable right now; retry after the given number of seconds.
    Retry { retry_in: u64 },
    /// Input exhausted and every line persisted.
    AllWorkComplete,
}

pub struct WorkQueue {
    reader: InputReader,
    writer: OutputWriter,
    /// All live (pending or issued) items, keyed by `work_id`.
    items: HashMap<u64, LiveItem>,
    /// FIFO of ids awaiting issuance. Timed-out ids re-enter at the tail,
    /// so a chronically slow item cannot starve fresh work.
    pending: VecDeque<u64>,
    /// Time of the most recent issuance per outstanding id.
    issued: HashMap<u64, Instant>,
    input_exhausted: bool,
    work_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    tombstoned: u64,
}

impl WorkQueue {
    pub fn new(reader: InputReader, writer: OutputWriter, config: &Config) -> Self {
        Self {
            reader,
            writer,
            items: HashMap::new(),
            pending: VecDeque::new(),
            issued: HashMap::new(),
            input_exhausted: false,
            work_timeout: config.work_timeout,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
            tombstoned: 0,
        }
    }

    /// Issue up to `batch_size` items, pulling new lines from the reader
    /// only when the pending FIFO is empty (timed-out work is served before
    /// fresh lines). Performs at most one batch read; never blocks waiting
    /// for more input.
    pub async fn issue(
        &mut self,
        batch_size: u64,
        now: Instant,
    ) -> Result<Issue, DispatcherError> {
        if self.all_drained() {
            return Ok(Issue::AllWorkComplete);
        }

        if self.pending.is_empty() {
            let batch = self.reader.next_batch(batch_size).await?;
            if self.reader.eof() && !self.input_exhausted {
                self.input_exhausted = true;
                tracing::info!(lines = self.reader.cursor(), "input exhausted");
            }
            if batch.is_empty() {
                if self.all_drained() {
                    return Ok(Issue::AllWorkComplete);
                }
                return Ok(Issue::Retry {
                    retry_in: self.retry_backoff.as_secs(),
                });
            }
            for (work_id, content) in batch {
                self.items.insert(
                    work_id,
                    LiveItem {
                        content,
                        retry_count: 0,
                    },
                );
                self.pending.push_back(work_id);
            }
        }

        let mut out = Vec::new();
        while (out.len() as u64) < batch_size {
            let Some(work_id) = self.pending.pop_front() else {
                break;
            };
            let Some(item) = self.items.get(&work_id) else {
                continue;
            };
            self.issued.insert(work_id, now);
            out.push(WorkItem {
                work_id,
                content: item.content.clone(),
            });
        }
        tracing::debug!(count = out.len(), "issued work batch");
        Ok(Issue::Batch(out))
    }

    /// Accept submitted results. A result is accepted only when its id is
    /// currently issued; everything else (already completed, re-queued
    /// after timeout, never heard of) is silently discarded. Within one
    /// batch the first submission for an id wins. Returns the number of
    /// results accepted.
    pub async fn submit(&mut self, results: Vec<WorkResult>) -> Result<u64, DispatcherError> {
        let mut accepted = 0u64;
        for WorkResult { work_id, result } in results {
            if self.issued.remove(&work_id).is_none() {
                tracing::debug!(work_id, "discarding result for work not currently issued");
                continue;
            }
            self.items.remove(&work_id);
            self.writer.accept(work_id, result).await?;
            accepted += 1;
        }
        Ok(accepted)
    }

    /// Expire every issuance older than the work timeout. Expired items
    /// rejoin the FIFO at the tail with `retry_count` incremented; an item
    /// whose count exceeds `max_retries` is written out as a tombstone
    /// instead and never issued again. Safe to run at any cadence.
    pub async fn sweep_timeouts(&mut self, now: Instant) -> Result<(), DispatcherError> {
        let expired: Vec<u64> = self
            .issued
            .iter()
            .filter(|(_, issued_at)| now.duration_since(**issued_at) >= self.work_timeout)
            .map(|(work_id, _)| *work_id)
            .collect();

        for work_id in expired {
            self.issued.remove(&work_id);
            let Some(item) = self.items.get_mut(&work_id) else {
                continue;
            };
            item.retry_count += 1;
            let retry_count = item.retry_count;
            if retry_count > self.max_retries {
                if let Some(item) = self.items.remove(&work_id) {
                    tracing::warn!(work_id, retry_count, "retry budget exhausted, tombstoning");
                    self.tombstoned += 1;
                    self.writer
                        .accept(work_id, tombstone_line(work_id, &item.content))
                        .await?;
                }
            } else {
                tracing::info!(work_id, retry_count, "issuance timed out, re-queueing");
                self.pending.push_back(work_id);
            }
        }
        Ok(())
    }

    /// Update the work timeout. Outstanding issuances keep their original
    /// `issued_at`, so shortening the timeout can expire them on the very
    /// next sweep.
    pub fn set_work_timeout(&mut self, timeout: Duration) {
        tracing::info!(seconds = timeout.as_secs(), "work timeout updated");
        self.work_timeout = timeout;
    }

    pub fn work_timeout(&self) -> Duration {
        self.work_timeout
    }

    /// True once the input is exhausted and no pending, issued, or buffered
    /// work remains: everything has been persisted.
    pub fn all_drained(&self) -> bool {
        self.input_exhausted
            && self.pending.is_empty()
            && self.issued.is_empty()
            && self.writer.is_drained()
    }

    pub fn snapshot(&self) -> StatusResponse {
        StatusResponse {
            pending: self.pending.len() as u64,
            issued: self.issued.len() as u64,
            completed: self.writer.position(),
            tombstoned: self.tombstoned,
            input_exhausted: self.input_exhausted,
        }
    }
}
