use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tracing::{debug, info};

use crate::{
    dto::{session::SessionPatch, sse::ServerEvent},
    error::ServiceError,
    services::{session_service, sse_events},
    state::{SessionHandle, SharedState, session::SessionId},
};

/// Open an SSE stream of the committed patches of session `id`.
pub async fn session_stream(
    state: &SharedState,
    id: SessionId,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + use<>>, ServiceError> {
    let handle = session_service::load_session(state, id).await?;
    let receiver = handle.subscribe();
    let snapshot = handle.patch().await;
    info!(session_id = %id, observers = handle.subscriber_count(), "session SSE stream connected");
    Ok(to_sse_stream(Arc::clone(state), handle, receiver, snapshot))
}

/// Convert a patch subscription into an SSE response, forwarding events and
/// releasing the session once the client disconnects.
fn to_sse_stream(
    state: SharedState,
    handle: Arc<SessionHandle>,
    receiver: broadcast::Receiver<SessionPatch>,
    snapshot: SessionPatch,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let (tx, rx) = mpsc::channel::<ServerEvent>(8);

    tokio::spawn(async move {
        let session_id = handle.id();
        forward(&state, &handle, receiver, snapshot, tx).await;
        info!(session_id = %session_id, "session SSE stream disconnected");
        session_service::release_session(&state, handle).await;
    });

    // axum drops this stream when the client disconnects, which closes `tx`.
    let stream = ReceiverStream::new(rx).map(|frame| Ok(Event::from(frame)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn forward(
    state: &SharedState,
    handle: &SessionHandle,
    mut receiver: broadcast::Receiver<SessionPatch>,
    snapshot: SessionPatch,
    tx: mpsc::Sender<ServerEvent>,
) {
    let mut degraded = state.degraded_watcher();
    let greeting = [
        sse_events::handshake(&snapshot, state.is_degraded()),
        sse_events::session_patch(&snapshot),
    ];
    for event in greeting.into_iter().flatten() {
        if tx.send(event).await.is_err() {
            return;
        }
    }

    loop {
        let next = tokio::select! {
            _ = tx.closed() => return,
            received = receiver.recv() => match received {
                Ok(patch) => sse_events::session_patch(&patch),
                Err(RecvError::Closed) => return,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(session_id = %handle.id(), skipped, "SSE observer lagged; resending snapshot");
                    sse_events::session_patch(&handle.patch().await)
                }
            },
            changed = degraded.changed() => match changed {
                Ok(()) => {
                    let value = *degraded.borrow_and_update();
                    sse_events::system_status(value)
                }
                Err(_) => return,
            },
        };

        if let Some(event) = next {
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }
}
