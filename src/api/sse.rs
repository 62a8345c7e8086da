//! Bridges an [`AgentEvent`] channel onto an axum SSE response.
//!
//! Grounded in the original's `event_generator` async generator
//! (`api/routes.py`) that wraps each dict as `event: <type>\ndata: <json>`;
//! the teacher's equivalent (`api::sse::sse_stream`) bridges a
//! `broadcast::Receiver` the same way, so this keeps its shape but reads
//! from the unbounded `mpsc` channel `AgentLoop::run` writes into.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use crate::agent::AgentEvent;

/// Turn the receiving half of an agent run's event channel into an SSE
/// response. Each `AgentEvent` becomes one `event: <type>\ndata: <json>\n\n`
/// frame; the stream ends when the sender is dropped (i.e. after `run`
/// returns).
pub fn agent_event_stream(rx: UnboundedReceiver<AgentEvent>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = UnboundedReceiverStream::new(rx).map(|event| Ok(to_axum_event(event)));

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}

fn to_axum_event(event: AgentEvent) -> Event {
    Event::default().event(event.event_type()).data(event.data().to_string())
}
