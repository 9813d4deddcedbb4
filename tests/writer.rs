//! Tests for the order-preserving output writer: resume counting, partial
//! line truncation, out-of-order buffering, and stale-result handling.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use dispatcher::writer::OutputWriter;

fn temp_output(tag: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "dispatcher-writer-{tag}-{}-{n}.txt",
        std::process::id()
    ))
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

// ---------------------------------------------------------------------------
// startup / resume position
// ---------------------------------------------------------------------------

#[tokio::test]
async fn open_missing_file_starts_at_zero() {
    let path = temp_output("missing");
    let writer = OutputWriter::open(&path).await.unwrap();
    assert_eq!(writer.position(), 0);
    assert!(writer.is_drained());
}

#[tokio::test]
async fn open_counts_complete_lines() {
    let path = temp_output("count");
    std::fs::write(&path, "one\ntwo\nthree\n").unwrap();

    let writer = OutputWriter::open(&path).await.unwrap();
    assert_eq!(writer.position(), 3);
}

#[tokio::test]
async fn open_truncates_trailing_partial_line() {
    let path = temp_output("truncate");
    std::fs::write(&path, "one\ntwo\npartia").unwrap();

    let writer = OutputWriter::open(&path).await.unwrap();
    assert_eq!(writer.position(), 2);
    assert_eq!(read(&path), "one\ntwo\n");
}

#[tokio::test]
async fn open_empty_lines_count_as_complete() {
    let path = temp_output("empty-lines");
    std::fs::write(&path, "\n\n").unwrap();

    let writer = OutputWriter::open(&path).await.unwrap();
    assert_eq!(writer.position(), 2);
}

#[tokio::test]
async fn writes_after_truncated_resume_continue_cleanly() {
    let path = temp_output("resume-write");
    std::fs::write(&path, "one\nhalf").unwrap();

    let mut writer = OutputWriter::open(&path).await.unwrap();
    assert_eq!(writer.position(), 1);
    writer.accept(1, "two".to_string()).await.unwrap();

    assert_eq!(read(&path), "one\ntwo\n");
    assert_eq!(writer.position(), 2);
}

// ---------------------------------------------------------------------------
// ordered draining
// ---------------------------------------------------------------------------

#[tokio::test]
async fn in_order_results_write_immediately() {
    let path = temp_output("in-order");
    let mut writer = OutputWriter::open(&path).await.unwrap();

    writer.accept(0, "zero".to_string()).await.unwrap();
    assert_eq!(writer.position(), 1);
    assert_eq!(read(&path), "zero\n");

    writer.accept(1, "one".to_string()).await.unwrap();
    assert_eq!(writer.position(), 2);
    assert_eq!(read(&path), "zero\none\n");
}

#[tokio::test]
async fn out_of_order_results_buffer_until_gap_closes() {
    let path = temp_output("out-of-order");
    let mut writer = OutputWriter::open(&path).await.unwrap();

    writer.accept(2, "two".to_string()).await.unwrap();
    writer.accept(1, "one".to_string()).await.unwrap();
    assert_eq!(writer.position(), 0);
    assert_eq!(writer.buffered_len(), 2);
    assert_eq!(read(&path), "");

    writer.accept(0, "zero".to_string()).await.unwrap();
    assert_eq!(writer.position(), 3);
    assert!(writer.is_drained());
    assert_eq!(read(&path), "zero\none\ntwo\n");
}

#[tokio::test]
async fn stale_result_is_discarded() {
    let path = temp_output("stale");
    let mut writer = OutputWriter::open(&path).await.unwrap();

    writer.accept(0, "zero".to_string()).await.unwrap();
    writer.accept(0, "duplicate".to_string()).await.unwrap();

    assert_eq!(writer.position(), 1);
    assert_eq!(read(&path), "zero\n");
}

#[tokio::test]
async fn position_is_monotonic() {
    let path = temp_output("monotonic");
    let mut writer = OutputWriter::open(&path).await.unwrap();

    let mut last = writer.position();
    for (work_id, result) in [(3, "d"), (0, "a"), (2, "c"), (0, "stale"), (1, "b")] {
        writer.accept(work_id, result.to_string()).await.unwrap();
        assert!(writer.position() >= last);
        last = writer.position();
    }
    assert_eq!(writer.position(), 4);
    assert_eq!(read(&path), "a\nb\nc\nd\n");
}

// ---------------------------------------------------------------------------
// restart round trip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reopen_resumes_at_written_line_count() {
    let path = temp_output("reopen");
    {
        let mut writer = OutputWriter::open(&path).await.unwrap();
        writer.accept(0, "zero".to_string()).await.unwrap();
        writer.accept(1, "one".to_string()).await.unwrap();
        // id 3 stays buffered, simulating a crash with an open gap
        writer.accept(3, "three".to_string()).await.unwrap();
        assert_eq!(writer.buffered_len(), 1);
    }

    let writer = OutputWriter::open(&path).await.unwrap();
    assert_eq!(writer.position(), 2);
    assert!(writer.is_drained());
    assert_eq!(read(&path), "zero\none\n");
}

#[tokio::test]
async fn unicode_results_round_trip() {
    let path = temp_output("unicode");
    let mut writer = OutputWriter::open(&path).await.unwrap();

    writer.accept(0, "héllo wörld ☃".to_string()).await.unwrap();
    assert_eq!(read(&path), "héllo wörld ☃\n");

    let reopened = OutputWriter::open(&path).await.unwrap();
    assert_eq!(reopened.position(), 1);
}
