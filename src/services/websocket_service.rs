use std::{sync::Arc, time::Duration};

use axum::extract::ws::{Message, WebSocket};
use futures::{
    SinkExt, StreamExt,
    stream::SplitStream,
};
use thiserror::Error;
use tokio::{
    sync::{
        Mutex,
        broadcast::{self, error::RecvError},
        mpsc,
    },
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    dto::{
        session::SessionPatch,
        ws::{PlayerInboundMessage, PlayerOutboundMessage},
    },
    services::session_service,
    state::{
        SessionHandle, SharedState,
        board::CardId,
        session::PlayerId,
        view::{Reconciliation, SessionView},
    },
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

type Outbound = mpsc::UnboundedSender<Message>;

/// The writer task is gone; the connection must be torn down.
#[derive(Debug, Error)]
#[error("connection closed")]
struct ConnectionClosed;

/// Handle the full lifecycle of one player connection to a session.
pub async fn handle_socket(state: SharedState, handle: Arc<SessionHandle>, socket: WebSocket) {
    let session_id = handle.id();
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing while inbound frames are awaited.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let Some(player_id) = identify(&handle, &mut receiver, &outbound_tx).await else {
        finalize(writer_task, outbound_tx).await;
        session_service::release_session(&state, handle).await;
        return;
    };

    let view = Arc::new(Mutex::new(SessionView::new(player_id)));
    let patches = handle.subscribe();
    let snapshot = handle.patch().await;
    view.lock().await.reconcile(&snapshot);

    let greeting = [
        PlayerOutboundMessage::Welcome {
            session_id,
            player_id,
        },
        PlayerOutboundMessage::Patch { patch: snapshot },
    ];
    if greeting.iter().any(|message| send(&outbound_tx, message).is_err()) {
        finalize(writer_task, outbound_tx).await;
        session_service::release_session(&state, handle).await;
        return;
    }
    info!(session_id = %session_id, %player_id, "player connected");

    let forwarder = tokio::spawn(forward_patches(
        Arc::clone(&state),
        Arc::clone(&handle),
        patches,
        Arc::clone(&view),
        outbound_tx.clone(),
    ));

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match PlayerInboundMessage::from_json_str(&text) {
                Ok(PlayerInboundMessage::Flip { card_id }) => {
                    let flipped =
                        handle_flip(&state, &handle, &view, player_id, card_id, &outbound_tx).await;
                    if flipped.is_err() {
                        info!(session_id = %session_id, %player_id, "connection closed during flip, terminating");
                        break;
                    }
                }
                Ok(PlayerInboundMessage::Identification { .. }) => {
                    warn!(session_id = %session_id, %player_id, "ignoring duplicate identification message");
                }
                Ok(PlayerInboundMessage::Unknown) => {
                    warn!(session_id = %session_id, %player_id, payload = %text, "ignoring unknown message");
                }
                Err(err) => {
                    warn!(session_id = %session_id, %player_id, error = %err, "failed to parse player message");
                    let rejection = PlayerOutboundMessage::Rejected {
                        card_id: None,
                        reason: err.to_string(),
                    };
                    if send(&outbound_tx, &rejection).is_err() {
                        break;
                    }
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(session_id = %session_id, %player_id, error = %err, "websocket error");
                break;
            }
        }
    }

    forwarder.abort();
    let _ = forwarder.await;
    info!(session_id = %session_id, %player_id, "player disconnected");

    finalize(writer_task, outbound_tx).await;
    session_service::release_session(&state, handle).await;
}

/// Wait for the identification frame and check the player takes part in the session.
async fn identify(
    handle: &SessionHandle,
    receiver: &mut SplitStream<WebSocket>,
    outbound_tx: &Outbound,
) -> Option<PlayerId> {
    let session_id = handle.id();
    let text = match timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => return None,
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            return None;
        }
        Ok(Some(Err(err))) => {
            warn!(session_id = %session_id, error = %err, "websocket receive error");
            return None;
        }
        Ok(None) | Err(_) => {
            warn!(session_id = %session_id, "websocket identification timed out");
            return None;
        }
    };

    let reason = match PlayerInboundMessage::from_json_str(&text) {
        Ok(PlayerInboundMessage::Identification { player_id }) => {
            if handle.session().await.has_player(player_id) {
                return Some(player_id);
            }
            format!("player `{player_id}` does not take part in session `{session_id}`")
        }
        Ok(_) => "first message must be an identification".to_string(),
        Err(err) => err.to_string(),
    };

    warn!(session_id = %session_id, %reason, "refusing websocket connection");
    let _ = send(
        outbound_tx,
        &PlayerOutboundMessage::Rejected {
            card_id: None,
            reason,
        },
    );
    let _ = outbound_tx.send(Message::Close(None));
    None
}

/// Flip a card optimistically, then submit it; a rejection rolls the view back to
/// the durable state and tells the player why.
async fn handle_flip(
    state: &SharedState,
    handle: &SessionHandle,
    view: &Mutex<SessionView>,
    player_id: PlayerId,
    card_id: CardId,
    outbound_tx: &Outbound,
) -> Result<(), ConnectionClosed> {
    let predicted = view.lock().await.apply_optimistic(card_id);
    debug!(session_id = %handle.id(), %player_id, card_id, predicted, "flip received");

    match session_service::apply_move(state, handle.id(), player_id, card_id).await {
        Ok(_) => Ok(()),
        Err(err) => {
            let durable = handle.patch().await;
            view.lock().await.rollback(durable.clone());
            info!(session_id = %handle.id(), %player_id, card_id, error = %err, "flip rejected");

            send(
                outbound_tx,
                &PlayerOutboundMessage::Rejected {
                    card_id: Some(card_id),
                    reason: err.to_string(),
                },
            )?;
            send(outbound_tx, &PlayerOutboundMessage::Patch { patch: durable })
        }
    }
}

/// Push committed patches and storage status changes to one player.
async fn forward_patches(
    state: SharedState,
    handle: Arc<SessionHandle>,
    mut patches: broadcast::Receiver<SessionPatch>,
    view: Arc<Mutex<SessionView>>,
    outbound_tx: Outbound,
) {
    let mut degraded = state.degraded_watcher();
    loop {
        let message = tokio::select! {
            received = patches.recv() => match received {
                Ok(patch) => reconcile(&view, patch).await,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(session_id = %handle.id(), skipped, "player lagged; resynchronizing");
                    reconcile(&view, handle.patch().await).await
                }
                Err(RecvError::Closed) => break,
            },
            changed = degraded.changed() => match changed {
                Ok(()) => Some(PlayerOutboundMessage::SystemStatus {
                    degraded: *degraded.borrow_and_update(),
                }),
                Err(_) => break,
            },
        };

        if let Some(message) = message {
            if send(&outbound_tx, &message).is_err() {
                break;
            }
        }
    }
}

async fn reconcile(view: &Mutex<SessionView>, patch: SessionPatch) -> Option<PlayerOutboundMessage> {
    match view.lock().await.reconcile(&patch) {
        Reconciliation::Adopted => Some(PlayerOutboundMessage::Patch { patch }),
        Reconciliation::Confirmed => Some(PlayerOutboundMessage::Ack {
            version: patch.version,
        }),
        Reconciliation::IgnoredStale => None,
    }
}

/// Serialize a message and queue it on the writer channel.
///
/// Serialization failures are logged and swallowed; only a closed writer is an error.
fn send(outbound_tx: &Outbound, message: &PlayerOutboundMessage) -> Result<(), ConnectionClosed> {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{message:?}`");
            return Ok(());
        }
    };
    outbound_tx
        .send(Message::Text(payload.into()))
        .map_err(|_| ConnectionClosed)
}

/// Ensure the writer task winds down before the socket handler returns.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: Outbound) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
