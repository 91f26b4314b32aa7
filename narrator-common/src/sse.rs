//! Server-Sent Events (SSE) utilities
//!
//! Converts an EventBus subscription into an axum SSE response.

use crate::events::NarrationEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Create an SSE stream that forwards narration events to one client
///
/// Each event is sent with its variant name as the SSE `event:` field and its
/// JSON serialization as `data:`. Lagging clients skip the missed events
/// rather than disconnecting.
///
/// # Example
/// ```rust,ignore
/// pub async fn event_stream(
///     State(ctx): State<AppContext>,
/// ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
///     narrator_common::sse::event_sse_stream(ctx.events.subscribe())
/// }
/// ```
pub fn event_sse_stream(
    mut rx: broadcast::Receiver<NarrationEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected");

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => {
                        debug!("SSE: sending {}", event.event_type());
                        yield Ok(Event::default().event(event.event_type()).data(json));
                    }
                    Err(e) => warn!("Failed to serialize event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE client lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("SSE: event bus closed");
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
