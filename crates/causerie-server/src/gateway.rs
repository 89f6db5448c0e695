//! The WebSocket connection layer.
//!
//! One task per connection reads client events in arrival order and
//! dispatches them to the delivery components; a paired writer task drains
//! the connection's outbound channel.  The first `announce_online` binds the
//! connection to a user; everything else is rejected or ignored until then.
//!
//! Malformed frames are logged and skipped -- one confused client must not
//! tear down its own connection, let alone anyone else's.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use causerie_shared::protocol::{ClientEvent, PresenceStatus, ServerEvent};
use causerie_shared::types::UserId;

use crate::api::AppState;
use crate::presence::{AnnounceOutcome, ConnectionHandle};

/// `GET /ws` upgrade entry point.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ServerEvent>();
    let handle = ConnectionHandle::new(tx);
    let connection_id = handle.id();

    debug!(conn = %connection_id, "websocket connected");

    // Writer task: serialize and forward everything queued for this
    // connection.  Exits when every handle clone is gone or the peer
    // disappears.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "failed to serialize outbound event");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut identity: Option<UserId> = None;

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(conn = %connection_id, error = %e, "websocket read error");
                break;
            }
        };

        match frame {
            WsMessage::Text(text) => match ClientEvent::from_json(&text) {
                Ok(event) => handle_event(&state, &handle, &mut identity, event).await,
                Err(e) => {
                    warn!(conn = %connection_id, error = %e, "ignoring malformed client frame");
                }
            },
            WsMessage::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of the
            // contract.
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            WsMessage::Binary(_) => {
                warn!(conn = %connection_id, "ignoring binary frame");
            }
        }
    }

    // Release presence and tell everyone else, unless a newer connection
    // for the same user already took over.
    if let Some((user_id, last_seen_at)) = state.presence.release(connection_id).await {
        info!(user = %user_id, conn = %connection_id, "user went offline");
        state
            .presence
            .broadcast_except(
                connection_id,
                ServerEvent::PresenceChanged {
                    user_id,
                    status: PresenceStatus::Offline,
                    last_seen_at: Some(last_seen_at),
                },
            )
            .await;
    }

    drop(handle);
    let _ = writer.await;
    debug!(conn = %connection_id, "websocket closed");
}

async fn handle_event(
    state: &AppState,
    handle: &ConnectionHandle,
    identity: &mut Option<UserId>,
    event: ClientEvent,
) {
    match event {
        ClientEvent::AnnounceOnline { user_id } => {
            if let Some(bound) = identity {
                if *bound != user_id {
                    warn!(
                        conn = %handle.id(),
                        bound = %bound,
                        requested = %user_id,
                        "connection tried to re-announce as a different user"
                    );
                    return;
                }
            }
            *identity = Some(user_id);

            let outcome = state.presence.announce(user_id, handle.clone()).await;
            let online_count = state.presence.online_count().await;
            info!(
                user = %user_id,
                conn = %handle.id(),
                ?outcome,
                online = online_count,
                "user announced online"
            );

            if outcome == AnnounceOutcome::Registered {
                state
                    .presence
                    .broadcast_except(
                        handle.id(),
                        ServerEvent::PresenceChanged {
                            user_id,
                            status: PresenceStatus::Online,
                            last_seen_at: None,
                        },
                    )
                    .await;
            }

            // Fresh snapshot so the client can seed its online set.
            let user_ids = state.presence.online_users().await;
            handle.push(ServerEvent::OnlineUsers { user_ids });
        }

        ClientEvent::SendMessage {
            receiver_id,
            content,
            attachments,
        } => {
            let Some(sender_id) = *identity else {
                handle.push(ServerEvent::SendFailed {
                    reason: "announce before sending".to_string(),
                });
                return;
            };

            if !state.flood.check(sender_id).await {
                handle.push(ServerEvent::SendFailed {
                    reason: "rate limited".to_string(),
                });
                return;
            }

            if let Err(e) = state
                .router
                .send(sender_id, receiver_id, content, attachments, handle)
                .await
            {
                warn!(sender = %sender_id, error = %e, "send failed");
                handle.push(ServerEvent::SendFailed {
                    reason: e.to_string(),
                });
            }
        }

        ClientEvent::MarkRead { message_id } => {
            let Some(reader) = *identity else {
                return;
            };
            if let Err(e) = state.receipts.mark_read(message_id, reader).await {
                warn!(reader = %reader, message_id = %message_id, error = %e, "mark_read failed");
            }
        }

        ClientEvent::MarkAllRead { sender_id } => {
            let Some(reader) = *identity else {
                return;
            };
            if let Err(e) = state.receipts.mark_all_read(reader, sender_id).await {
                warn!(reader = %reader, sender = %sender_id, error = %e, "mark_all_read failed");
            }
        }

        ClientEvent::Typing { receiver_id } => {
            let Some(sender_id) = *identity else {
                return;
            };
            // A throttled typing signal is dropped without feedback.
            if !state.flood.check(sender_id).await {
                return;
            }
            state.typing.relay(sender_id, receiver_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use causerie_store::{Database, UserRecord};

    use crate::api::AppState;
    use crate::auth::{InsecureTokenResolver, StoreUserDirectory};
    use crate::config::ServerConfig;
    use crate::flood::FloodControl;
    use crate::presence::PresenceRegistry;
    use crate::receipts::ReadReceiptReconciler;
    use crate::router::DeliveryRouter;
    use crate::storage::MessageService;
    use crate::typing::TypingRelay;

    fn test_state() -> (AppState, UserId, UserId) {
        let db = Database::open_in_memory().unwrap();
        let alice = UserRecord::new("alice");
        let bob = UserRecord::new("bob");
        db.insert_user(&alice).unwrap();
        db.insert_user(&bob).unwrap();

        let store = MessageService::new(db, Duration::from_secs(5));
        let presence = Arc::new(PresenceRegistry::new());
        let directory = Arc::new(StoreUserDirectory::new(store.clone()));

        let state = AppState {
            config: Arc::new(ServerConfig::default()),
            store: store.clone(),
            presence: presence.clone(),
            router: Arc::new(DeliveryRouter::new(
                store.clone(),
                presence.clone(),
                directory,
            )),
            receipts: Arc::new(ReadReceiptReconciler::new(store.clone(), presence.clone())),
            typing: Arc::new(TypingRelay::new(presence.clone())),
            flood: FloodControl::new(100.0, 100.0),
            identity: Arc::new(InsecureTokenResolver),
        };
        (state, alice.id, bob.id)
    }

    fn connection() -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(tx), rx)
    }

    #[tokio::test]
    async fn test_announce_binds_identity_and_sends_snapshot() {
        let (state, alice, _) = test_state();
        let (handle, mut rx) = connection();
        let mut identity = None;

        handle_event(
            &state,
            &handle,
            &mut identity,
            ClientEvent::AnnounceOnline { user_id: alice },
        )
        .await;

        assert_eq!(identity, Some(alice));
        match rx.try_recv() {
            Ok(ServerEvent::OnlineUsers { user_ids }) => {
                assert_eq!(user_ids, vec![alice]);
            }
            other => panic!("expected online snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_announce_broadcasts_to_other_connections() {
        let (state, alice, bob) = test_state();
        let (bob_handle, mut bob_rx) = connection();
        let mut bob_identity = None;
        handle_event(
            &state,
            &bob_handle,
            &mut bob_identity,
            ClientEvent::AnnounceOnline { user_id: bob },
        )
        .await;
        let _ = bob_rx.try_recv(); // drain bob's own snapshot

        let (alice_handle, _alice_rx) = connection();
        let mut alice_identity = None;
        handle_event(
            &state,
            &alice_handle,
            &mut alice_identity,
            ClientEvent::AnnounceOnline { user_id: alice },
        )
        .await;

        match bob_rx.try_recv() {
            Ok(ServerEvent::PresenceChanged {
                user_id, status, ..
            }) => {
                assert_eq!(user_id, alice);
                assert_eq!(status, PresenceStatus::Online);
            }
            other => panic!("expected presence broadcast, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_before_announce_fails() {
        let (state, _, bob) = test_state();
        let (handle, mut rx) = connection();
        let mut identity = None;

        handle_event(
            &state,
            &handle,
            &mut identity,
            ClientEvent::SendMessage {
                receiver_id: bob,
                content: "hi".to_string(),
                attachments: Vec::new(),
            },
        )
        .await;

        assert!(matches!(rx.try_recv(), Ok(ServerEvent::SendFailed { .. })));
    }

    #[tokio::test]
    async fn test_invalid_send_surfaces_send_failed() {
        let (state, alice, _) = test_state();
        let (handle, mut rx) = connection();
        let mut identity = Some(alice);

        // Self-send is rejected by the router and reported on the socket.
        handle_event(
            &state,
            &handle,
            &mut identity,
            ClientEvent::SendMessage {
                receiver_id: alice,
                content: "hi".to_string(),
                attachments: Vec::new(),
            },
        )
        .await;

        match rx.try_recv() {
            Ok(ServerEvent::SendFailed { reason }) => {
                assert!(reason.contains("yourself"), "reason: {reason}");
            }
            other => panic!("expected send failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limited_send_fails_without_persisting() {
        let (mut state, alice, bob) = test_state();
        state.flood = FloodControl::new(1.0, 1.0);
        let (handle, mut rx) = connection();
        let mut identity = Some(alice);

        let send = ClientEvent::SendMessage {
            receiver_id: bob,
            content: "spam".to_string(),
            attachments: Vec::new(),
        };

        handle_event(&state, &handle, &mut identity, send.clone()).await;
        assert!(matches!(
            rx.try_recv(),
            Ok(ServerEvent::MessageSentAck { .. })
        ));

        handle_event(&state, &handle, &mut identity, send).await;
        match rx.try_recv() {
            Ok(ServerEvent::SendFailed { reason }) => {
                assert_eq!(reason, "rate limited");
            }
            other => panic!("expected throttle, got {other:?}"),
        }

        // Only the first message was stored.
        assert_eq!(state.store.unread_total(bob).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_full_send_and_read_flow_over_socket_events() {
        let (state, alice, bob) = test_state();

        let (alice_handle, mut alice_rx) = connection();
        let mut alice_identity = None;
        handle_event(
            &state,
            &alice_handle,
            &mut alice_identity,
            ClientEvent::AnnounceOnline { user_id: alice },
        )
        .await;
        let _ = alice_rx.try_recv(); // snapshot

        let (bob_handle, mut bob_rx) = connection();
        let mut bob_identity = None;
        handle_event(
            &state,
            &bob_handle,
            &mut bob_identity,
            ClientEvent::AnnounceOnline { user_id: bob },
        )
        .await;
        let _ = bob_rx.try_recv(); // snapshot
        let _ = alice_rx.try_recv(); // bob's online broadcast

        handle_event(
            &state,
            &alice_handle,
            &mut alice_identity,
            ClientEvent::SendMessage {
                receiver_id: bob,
                content: "hi".to_string(),
                attachments: Vec::new(),
            },
        )
        .await;

        let message_id = match bob_rx.try_recv() {
            Ok(ServerEvent::MessageReceived { message }) => message.id,
            other => panic!("expected live delivery, got {other:?}"),
        };
        assert!(matches!(
            alice_rx.try_recv(),
            Ok(ServerEvent::MessageSentAck { .. })
        ));

        handle_event(
            &state,
            &bob_handle,
            &mut bob_identity,
            ClientEvent::MarkRead { message_id },
        )
        .await;

        match alice_rx.try_recv() {
            Ok(ServerEvent::MessageRead { message_id: id }) => assert_eq!(id, message_id),
            other => panic!("expected read receipt, got {other:?}"),
        }
        assert_eq!(state.store.unread_from(bob, alice).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_typing_forwarded_only_when_online() {
        let (state, alice, bob) = test_state();
        let (alice_handle, _alice_rx) = connection();
        let mut alice_identity = Some(alice);

        // Bob offline: dropped silently.
        handle_event(
            &state,
            &alice_handle,
            &mut alice_identity,
            ClientEvent::Typing { receiver_id: bob },
        )
        .await;

        let (bob_handle, mut bob_rx) = connection();
        state.presence.announce(bob, bob_handle).await;

        handle_event(
            &state,
            &alice_handle,
            &mut alice_identity,
            ClientEvent::Typing { receiver_id: bob },
        )
        .await;

        match bob_rx.try_recv() {
            Ok(ServerEvent::PeerTyping { user_id }) => assert_eq!(user_id, alice),
            other => panic!("expected typing signal, got {other:?}"),
        }
    }
}
