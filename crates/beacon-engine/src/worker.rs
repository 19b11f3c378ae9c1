//! Blocking side of the engine: one request in, one response out.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

use tracing::{debug, warn};

use crate::errors::ProcessingError;
use crate::ops;
use crate::types::{WorkRequest, WorkResponse};

/// Run `request` on the current thread.
///
/// Never fails and never unwinds: bad options and panics become a response
/// with `success: false`.
pub fn execute(request: WorkRequest) -> WorkResponse {
    let started = Instant::now();
    let WorkRequest {
        id,
        operation,
        data,
        options,
    } = request;
    let rows = data.len();

    let outcome = catch_unwind(AssertUnwindSafe(|| ops::run(operation, data, &options)))
        .unwrap_or_else(|payload| Err(ProcessingError::Panicked(panic_message(payload.as_ref()))));
    let elapsed = started.elapsed();

    match outcome {
        Ok(result) => {
            let response = WorkResponse::success(id, result, elapsed);
            debug!(request_id = %response.id, %operation, rows, processing_ms = response.processing_time, "work done");
            response
        }
        Err(err) => {
            warn!(request_id = %id, %operation, code = err.code(), error = %err, "work failed");
            WorkResponse::failure(id, &err, elapsed)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-text panic payload".to_owned()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
