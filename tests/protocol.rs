//! Wire-shape tests: the JSON bodies workers parse must keep their exact
//! field names, status tags, and tombstone format.

use dispatcher::protocol::{
    GetWorkRequest, GetWorkResponse, StatusResponse, SubmitResultRequest, SubmitResultResponse,
    WorkItem, WorkTimeoutRequest, tombstone_line,
};

// ---------------------------------------------------------------------------
// tagged get_work responses
// ---------------------------------------------------------------------------

#[test]
fn get_work_ok_serializes_with_status_tag() {
    let response = GetWorkResponse::Ok {
        items: vec![WorkItem {
            work_id: 7,
            content: "line seven".to_string(),
        }],
    };

    let value: serde_json::Value =
        serde_json::from_str(&serde_json::to_string(&response).unwrap()).unwrap();
    assert_eq!(value["status"], "OK");
    assert_eq!(value["items"][0]["work_id"], 7);
    assert_eq!(value["items"][0]["content"], "line seven");
}

#[test]
fn get_work_retry_carries_hint_seconds() {
    let response = GetWorkResponse::Retry { retry_in: 30 };

    let value: serde_json::Value =
        serde_json::from_str(&serde_json::to_string(&response).unwrap()).unwrap();
    assert_eq!(value["status"], "RETRY");
    assert_eq!(value["retry_in"], 30);
}

#[test]
fn get_work_complete_is_bare_status() {
    let json = serde_json::to_string(&GetWorkResponse::AllWorkComplete).unwrap();
    assert_eq!(json, r#"{"status":"ALL_WORK_COMPLETE"}"#);
}

#[test]
fn get_work_responses_deserialize_by_tag() {
    match serde_json::from_str(r#"{"status":"OK","items":[]}"#).unwrap() {
        GetWorkResponse::Ok { items } => assert!(items.is_empty()),
        other => panic!("expected Ok, got {other:?}"),
    }
    match serde_json::from_str(r#"{"status":"RETRY","retry_in":5}"#).unwrap() {
        GetWorkResponse::Retry { retry_in } => assert_eq!(retry_in, 5),
        other => panic!("expected Retry, got {other:?}"),
    }
    match serde_json::from_str(r#"{"status":"ALL_WORK_COMPLETE"}"#).unwrap() {
        GetWorkResponse::AllWorkComplete => {}
        other => panic!("expected AllWorkComplete, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// requests
// ---------------------------------------------------------------------------

#[test]
fn requests_deserialize_from_documented_shapes() {
    let get: GetWorkRequest = serde_json::from_str(r#"{"batch_size":16}"#).unwrap();
    assert_eq!(get.batch_size, 16);

    let submit: SubmitResultRequest =
        serde_json::from_str(r#"{"items":[{"work_id":0,"result":"done"}]}"#).unwrap();
    assert_eq!(submit.items.len(), 1);
    assert_eq!(submit.items[0].work_id, 0);
    assert_eq!(submit.items[0].result, "done");

    let timeout: WorkTimeoutRequest = serde_json::from_str(r#"{"timeout":120}"#).unwrap();
    assert_eq!(timeout.timeout, 120);
}

#[test]
fn submit_response_shape() {
    let json = serde_json::to_string(&SubmitResultResponse {
        status: "OK".to_string(),
        count: 3,
    })
    .unwrap();
    assert_eq!(json, r#"{"status":"OK","count":3}"#);
}

#[test]
fn status_response_round_trips() {
    let status = StatusResponse {
        pending: 1,
        issued: 2,
        completed: 3,
        tombstoned: 4,
        input_exhausted: true,
    };
    let parsed: StatusResponse =
        serde_json::from_str(&serde_json::to_string(&status).unwrap()).unwrap();
    assert_eq!(parsed.pending, 1);
    assert_eq!(parsed.issued, 2);
    assert_eq!(parsed.completed, 3);
    assert_eq!(parsed.tombstoned, 4);
    assert!(parsed.input_exhausted);
}

// ---------------------------------------------------------------------------
// tombstones
// ---------------------------------------------------------------------------

#[test]
fn tombstone_line_has_exact_format() {
    assert_eq!(
        tombstone_line(0, "bad"),
        r#"{"__ERROR__":{"error":"max_retries_exceeded","work_id":0,"original_content":"bad"}}"#
    );
}

#[test]
fn tombstone_escapes_embedded_quotes() {
    let line = tombstone_line(3, r#"say "hi" \ bye"#);
    assert!(!line.contains('\n'));

    let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(parsed["__ERROR__"]["work_id"], 3);
    assert_eq!(parsed["__ERROR__"]["original_content"], r#"say "hi" \ bye"#);
}

#[test]
fn tombstone_preserves_unicode_content() {
    let line = tombstone_line(9, "déjà vu ☃");
    let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(parsed["__ERROR__"]["original_content"], "déjà vu ☃");
}
