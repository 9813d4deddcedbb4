//! HTTP control plane: the axum router, request handlers, the periodic
//! timeout sweeper, and end-of-work shutdown.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::DispatcherError;
use crate::protocol::{
    GetWorkRequest, GetWorkResponse, StatusResponse, SubmitResultRequest, SubmitResultResponse,
    WorkTimeoutRequest, WorkTimeoutResponse,
};
use crate::queue::{Issue, WorkQueue};
use crate::reader::InputReader;
use crate::writer::OutputWriter;

/// Interval between timeout sweeps. A fixed one-second tick satisfies the
/// required cadence of `max(1, work_timeout / 10)` for every timeout value.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Shared handler state: the queue core behind its single exclusive lock,
/// plus shutdown plumbing. One value, threaded explicitly into every
/// handler.
pub struct AppState {
    pub queue: Mutex<WorkQueue>,
    grace: Duration,
    shutdown: CancellationToken,
    draining: AtomicBool,
    fatal: std::sync::Mutex<Option<DispatcherError>>,
}

impl AppState {
    pub fn new(queue: WorkQueue, grace: Duration) -> Self {
        Self {
            queue: Mutex::new(queue),
            grace,
            shutdown: CancellationToken::new(),
            draining: AtomicBool::new(false),
            fatal: std::sync::Mutex::new(None),
        }
    }

    /// Token cancelled when the server should stop accepting requests.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start the end-of-work grace timer; idempotent. Late workers keep
    /// getting clean `ALL_WORK_COMPLETE` responses until it fires.
    fn begin_drain(self: &Arc<Self>) {
        if self.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(
            grace_secs = self.grace.as_secs(),
            "all work complete, draining"
        );
        let state = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(state.grace).await;
            state.shutdown.cancel();
        });
    }

    /// Record an error and, if it is fatal, stop the server immediately.
    /// The stored error becomes the process exit cause.
    fn record_fatal(&self, error: DispatcherError) {
        if !error.is_fatal() {
            return;
        }
        tracing::error!("fatal: {error}");
        if let Ok(mut slot) = self.fatal.lock()
            && slot.is_none()
        {
            *slot = Some(error);
        }
        self.shutdown.cancel();
    }

    fn fail(&self, error: DispatcherError) -> ApiError {
        let message = error.to_string();
        self.record_fatal(error);
        ApiError::internal(message)
    }

    fn take_fatal(&self) -> Option<DispatcherError> {
        self.fatal.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Error response carrying the HTTP status the contract requires: 400 for
/// malformed requests, 500 for internal failures.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/get_work", post(get_work))
        .route("/submit_result", post(submit_result))
        .route("/work_timeout", post(work_timeout))
        .route("/status", get(status))
        .with_state(state)
}

/// Run a state-mutating section on its own task so a client disconnect
/// cannot cancel it halfway through: ids popped from the pending FIFO must
/// land in `issued`, and a result line must be written in full, even when
/// nobody is left to read the response.
async fn shielded<F, T>(section: F) -> Result<T, ApiError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(section)
        .await
        .map_err(|e| ApiError::internal(format!("handler task failed: {e}")))
}

async fn get_work(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GetWorkRequest>, JsonRejection>,
) -> Result<Json<GetWorkResponse>, ApiError> {
    let Json(req) = payload?;
    if req.batch_size == 0 {
        return Err(ApiError::bad_request("batch_size must be at least 1"));
    }

    let core = Arc::clone(&state);
    let issued = shielded(async move {
        let mut queue = core.queue.lock().await;
        queue.issue(req.batch_size, Instant::now()).await
    })
    .await?;

    match issued {
        Ok(Issue::Batch(items)) => Ok(Json(GetWorkResponse::Ok { items })),
        Ok(Issue::Retry { retry_in }) => Ok(Json(GetWorkResponse::Retry { retry_in })),
        Ok(Issue::AllWorkComplete) => {
            state.begin_drain();
            Ok(Json(GetWorkResponse::AllWorkComplete))
        }
        Err(e) => Err(state.fail(e)),
    }
}

async fn submit_result(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitResultRequest>, JsonRejection>,
) -> Result<Json<SubmitResultResponse>, ApiError> {
    let Json(req) = payload?;

    let core = Arc::clone(&state);
    let submitted = shielded(async move {
        let mut queue = core.queue.lock().await;
        queue.submit(req.items).await
    })
    .await?;

    match submitted {
        Ok(count) => Ok(Json(SubmitResultResponse {
            status: "OK".to_string(),
            count,
        })),
        Err(e) => Err(state.fail(e)),
    }
}

async fn work_timeout(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WorkTimeoutRequest>, JsonRejection>,
) -> Result<Json<WorkTimeoutResponse>, ApiError> {
    let Json(req) = payload?;
    if req.timeout == 0 {
        return Err(ApiError::bad_request("timeout must be at least 1 second"));
    }

    let mut queue = state.queue.lock().await;
    queue.set_work_timeout(Duration::from_secs(req.timeout));
    Ok(Json(WorkTimeoutResponse {
        status: "OK".to_string(),
        timeout: req.timeout,
    }))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let queue = state.queue.lock().await;
    Json(queue.snapshot())
}

/// Periodically expire stale issuances. Competes with the handlers for the
/// core lock; also the path that notices completion when no worker asks for
/// more work after the last submit.
async fn sweep_loop(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let mut queue = state.queue.lock().await;
        if let Err(e) = queue.sweep_timeouts(Instant::now()).await {
            drop(queue);
            state.record_fatal(e);
            break;
        }
        if queue.all_drained() {
            drop(queue);
            state.begin_drain();
        }
    }
}

/// Serve the control plane on an already-bound listener until all work is
/// persisted (exit `Ok`) or a fatal I/O error occurs (exit `Err`).
pub async fn serve(state: Arc<AppState>, listener: TcpListener) -> Result<(), DispatcherError> {
    let app = router(Arc::clone(&state));
    let sweeper = tokio::spawn(sweep_loop(Arc::clone(&state)));

    let shutdown = state.shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(DispatcherError::Serve)?;

    let _ = sweeper.await;

    match state.take_fatal() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Open the input and output files, resume from the output's complete-line
/// count, and assemble the shared state.
pub async fn init(config: &Config) -> Result<Arc<AppState>, DispatcherError> {
    let writer = OutputWriter::open(&config.outfile).await?;
    let resume = writer.position();

    let mut reader = InputReader::open(&config.infile).await?;
    if resume > 0 {
        reader.skip(resume).await?;
    }

    let queue = WorkQueue::new(reader, writer, config);
    Ok(Arc::new(AppState::new(queue, config.grace)))
}

/// Open the files, bind, and serve until done.
pub async fn run(config: &Config) -> Result<(), DispatcherError> {
    let state = init(config).await?;

    let addr = (config.host, config.port);
    let listener = TcpListener::bind(addr).await.map_err(|e| DispatcherError::Bind {
        addr: format!("{}:{}", config.host, config.port),
        source: e,
    })?;
    let local = listener.local_addr().map_err(DispatcherError::Serve)?;
    tracing::info!(addr = %local, "dispatcher listening");

    serve(state, listener).await
}
