//! Event streaming handler

use crate::api::rest::state::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Stream agent events via SSE
pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();

    let stream = stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Ok(envelope) => {
                let json = serde_json::to_string(&envelope).unwrap_or_default();
                Some((Ok(Event::default().data(json)), rx))
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Event stream subscriber lagged");
                Some((Ok(Event::default().comment("lagged")), rx))
            }
            Err(RecvError::Closed) => None,
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
