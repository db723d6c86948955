// SPDX-License-Identifier: MIT

//! Server-sent event stream of committed snapshots.

use crate::error::Result;
use crate::models::LiveActivitySnapshot;
use crate::routes::validate_user_id;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Router,
};
use futures_util::{stream, Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/users/{user_id}/live/stream", get(stream_live))
}

/// Current snapshot first, then every committed change.
async fn stream_live(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Response> {
    validate_user_id(&user_id)?;

    // Subscribe before reading so no commit falls between the two.
    let rx = state.hub.subscribe(&user_id);
    let current = state.engine.snapshot(&user_id).await?;
    tracing::debug!(user_id = %user_id, revision = current.revision, "Live stream opened");

    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    let initial = stream::iter(snapshot_event(&current).map(Ok));
    let events = initial.chain(snapshots_to_sse(rx, current.revision));

    Ok((headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response())
}

fn snapshot_event(snapshot: &LiveActivitySnapshot) -> Option<Event> {
    let data = serde_json::to_string(snapshot).ok()?;
    Some(
        Event::default()
            .event("snapshot")
            .id(snapshot.revision.to_string())
            .data(data),
    )
}

fn snapshots_to_sse(
    rx: broadcast::Receiver<LiveActivitySnapshot>,
    initial_revision: u64,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(move |msg| async move {
        match msg {
            // Commits that raced the initial read are already included in it.
            Ok(snapshot) if snapshot.revision <= initial_revision => None,
            Ok(snapshot) => snapshot_event(&snapshot).map(Ok),
            Err(_) => None, // lagged; the next snapshot is complete anyway
        }
    })
}
