//! Axum handler for the generation stream.
//!
//! POST /api/v1/cache/generate validates the request, claims the run key,
//! builds the provider client, then hands the run to a background task and
//! returns the SSE stream. Everything that can fail structurally fails here
//! as a plain HTTP error; once the stream is open, only `error` events
//! abort it.

use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};

use crate::errors::AppError;
use crate::generation::orchestrator::{self, GenerationRequest};
use crate::generation::run::run_key;
use crate::providers::LlmProvider;
use crate::state::AppState;

/// POST /api/v1/cache/generate
///
/// Streams `start`/`progress`/`item-complete`/`item-error` events and
/// terminates with `complete` (or a fatal `error`). Dropping the connection
/// cancels the run; artifacts already written persist in the draft version.
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let plan = orchestrator::plan(&state.db, &state.catalog, &request).await?;

    let guard = state
        .runs
        .try_acquire(run_key(plan.family, &plan.languages))
        .ok_or_else(|| {
            AppError::Conflict(format!(
                "A generation run is already in progress for {} {:?}",
                plan.family, plan.languages
            ))
        })?;

    // Build the provider before the stream opens so structural failures —
    // notably inference-profile resolution — surface as an HTTP error
    let provider = LlmProvider::from_config(request.provider).await?;

    let delay = Duration::from_millis(state.config.generation_delay_ms);
    let (tx, rx) = mpsc::channel(64);
    let pool = state.db.clone();

    tokio::spawn(async move {
        let _guard = guard; // released when the run ends, however it ends
        orchestrator::run_generation(&pool, &provider, &plan, delay, &tx).await;
    });

    let stream = ReceiverStream::new(rx).map(|event| event.to_sse_event());
    Ok(Sse::new(stream).keep_alive(KeepAlive::new()))
}
