//! Streaming delivery: wraps the orchestrator to emit typed run events over
//! a push channel with a periodic heartbeat and cooperative cancellation.
//!
//! The channel is transport-agnostic — an SSE writer, a WebSocket bridge,
//! and a test harness collecting events into a list are equally valid
//! consumers. `RunEvent::to_sse` renders the conventional text framing for
//! chunked HTTP transports.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::model::test_run::{RunStatus, TestResult, TestRun};
use crate::runner::{self, RunRequest};

/// Idle keep-alive cadence, independent of execution pace.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

// =============================================================================
// RunEvent
// =============================================================================

/// One event on the streaming channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RunEvent {
    /// Sent once at start, after preconditions pass.
    Connected { run_id: String, total: usize },
    /// Sent per completed unit, before its `result` event.
    Progress {
        completed: usize,
        total: usize,
        test_case_id: String,
        test_case_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        iteration: Option<u32>,
    },
    Result { result: TestResult },
    /// Case-level fault (non-fatal to the run), or — with no
    /// `test_case_id` — a top-level precondition failure that ends the
    /// stream.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        test_case_id: Option<String>,
    },
    /// Terminal event; fires exactly once on every successfully started run,
    /// including cancelled ones, so consumers always close cleanly.
    Complete {
        run_id: String,
        status: RunStatus,
        test_run: TestRun,
    },
    Heartbeat,
}

impl RunEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::Connected { .. } => "connected",
            RunEvent::Progress { .. } => "progress",
            RunEvent::Result { .. } => "result",
            RunEvent::Error { .. } => "error",
            RunEvent::Complete { .. } => "complete",
            RunEvent::Heartbeat => "heartbeat",
        }
    }

    /// Render as a server-sent-events frame. Heartbeats become comment
    /// pings, which intermediaries pass through without buffering.
    pub fn to_sse(&self) -> String {
        match self {
            RunEvent::Heartbeat => ": ping\n\n".to_string(),
            event => {
                let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
                format!("event: {}\ndata: {}\n\n", event.name(), data)
            }
        }
    }
}

// =============================================================================
// stream_run
// =============================================================================

/// Launch a run and return the event channel. Must be called within a Tokio
/// runtime.
///
/// On cancellation the orchestrator stops dispatching new work, flushes the
/// results that already completed, and the terminal `complete` event still
/// fires. A precondition failure surfaces as a single top-level `error`
/// event instead, after which the channel closes.
pub fn stream_run(request: RunRequest, cancel: CancellationToken) -> mpsc::UnboundedReceiver<RunEvent> {
    let (tx, rx) = mpsc::unbounded_channel();

    let heartbeat_tx = tx.clone();
    let heartbeat = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        // The first tick fires immediately; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if heartbeat_tx.send(RunEvent::Heartbeat).is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        match runner::run_streaming(request, cancel, tx.clone()).await {
            Ok(run) => {
                let _ = tx.send(RunEvent::Complete {
                    run_id: run.id.clone(),
                    status: run.status,
                    test_run: run,
                });
            }
            Err(e) => {
                tracing::warn!("Streaming run aborted before execution: {e}");
                let _ = tx.send(RunEvent::Error {
                    message: e.to_string(),
                    test_case_id: None,
                });
            }
        }
        heartbeat.abort();
    });

    rx
}
