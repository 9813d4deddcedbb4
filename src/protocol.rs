//! Wire types for the dispatcher control plane.
//!
//! Every endpoint consumes and produces JSON. Responses that can take more
//! than one shape are modelled as a tagged enum on the `status` field, so
//! the serialized form matches what workers dispatch on.

use serde::{Deserialize, Serialize};

/// One unit of work: a line of the input file and its zero-based line index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub work_id: u64,
    pub content: String,
}

/// One completed result, keyed by the line index it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkResult {
    pub work_id: u64,
    pub result: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetWorkRequest {
    pub batch_size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum GetWorkResponse {
    #[serde(rename = "OK")]
    Ok { items: Vec<WorkItem> },
    /// No work is issuable right now but more may appear (in-flight items
    /// can still time out). Workers should retry after `retry_in` seconds.
    #[serde(rename = "RETRY")]
    Retry { retry_in: u64 },
    /// Every input line has been persisted. Workers should exit.
    #[serde(rename = "ALL_WORK_COMPLETE")]
    AllWorkComplete,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResultRequest {
    pub items: Vec<WorkResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResultResponse {
    pub status: String,
    /// Number of results newly accepted; duplicates and stale ids are not
    /// counted.
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkTimeoutRequest {
    pub timeout: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkTimeoutResponse {
    pub status: String,
    pub timeout: u64,
}

/// Queue counters reported by `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub pending: u64,
    pub issued: u64,
    pub completed: u64,
    pub tombstoned: u64,
    pub input_exhausted: bool,
}

#[derive(Serialize)]
struct TombstoneDetail<'a> {
    error: &'static str,
    work_id: u64,
    original_content: &'a str,
}

#[derive(Serialize)]
struct Tombstone<'a> {
    #[serde(rename = "__ERROR__")]
    error: TombstoneDetail<'a>,
}

/// Render the synthetic result written in place of a real one when a line
/// exhausts its retry budget. Single-line JSON; `original_content` is the
/// verbatim input line.
pub fn tombstone_line(work_id: u64, original_content: &str) -> String {
    let tombstone = Tombstone {
        error: TombstoneDetail {
            error: "max_retries_exceeded",
            work_id,
            original_content,
        },
    };
    // Serialization of a string/int struct cannot fail.
    serde_json::to_string(&tombstone).unwrap_or_default()
}
