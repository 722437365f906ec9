//! The streaming channel: `GET /duels/ws/{duelId}?token=...` (§6).
//!
//! One axum task per connection, split into an outbound half that drains
//! the duel's `EventFabric` session and an inbound half that turns client
//! messages into calls against the duel engine / fabric. Close-code
//! mapping follows §6's table; `4429` (too many concurrent connections)
//! has no occurrence in this gateway because `EventFabric::attach` always
//! evicts rather than rejects a second connection for the same
//! `(duel, user)` pair, so the race that code exists for cannot arise here
//! — recorded as a deliberate scope decision rather than an omission.

use super::AppState;
use crate::domain::{DuelId, UserId};
use crate::fabric::Envelope;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Incoming client messages. Anything else (unknown `type`, malformed
/// JSON) is ignored rather than closing the connection — a stray message
/// from a client running a slightly different protocol version shouldn't
/// kill an otherwise-healthy session.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    CodeUpdate { code: String, language: String, cursor_position: Option<serde_json::Value> },
    TypingStatus { is_typing: bool },
    TestCode { code: String, language: String },
    Ping,
}

pub async fn handle_upgrade(
    State(state): State<AppState>,
    Path(duel_id): Path<DuelId>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = query.token.as_deref().and_then(|t| t.parse::<UserId>().ok());

    let Some(user) = user else {
        return ws.on_upgrade(|socket| close_immediately(socket, 4001, "missing or invalid token"));
    };

    let duel = match state.repo.require_duel(duel_id) {
        Ok(d) => d,
        Err(_) => {
            return ws.on_upgrade(move |socket| close_immediately(socket, 4004, "duel not found"));
        }
    };
    if !duel.has_participant(user) {
        return ws.on_upgrade(move |socket| close_immediately(socket, 4003, "not a participant in this duel"));
    }

    ws.on_upgrade(move |socket| run_session(socket, state, duel_id, user))
}

async fn close_immediately(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame { code, reason: Cow::Borrowed(reason) })))
        .await;
}

async fn run_session(socket: WebSocket, state: AppState, duel_id: DuelId, user: UserId) {
    let mut rx = state.fabric.attach(duel_id, user);
    let (mut sink, mut stream) = socket.split();

    if let Err(e) = send_duel_state(&mut sink, &state, duel_id).await {
        warn!(duel = %duel_id, %user, error = %e, "failed to send initial duel_state");
    }

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                match outgoing {
                    Some(Envelope::Replaced) => {
                        let _ = sink
                            .send(Message::Close(Some(CloseFrame {
                                code: 4000,
                                reason: Cow::Borrowed("replaced by a newer connection"),
                            })))
                            .await;
                        return;
                    }
                    Some(envelope) => {
                        if send_envelope(&mut sink, &envelope).await.is_err() {
                            break;
                        }
                    }
                    // The fabric closed this duel's sessions (completion/timeout
                    // grace period elapsed); end the connection cleanly.
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state, duel_id, user, &text, &mut sink).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(duel = %duel_id, %user, error = %e, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    state.fabric.detach(duel_id, user);
    info!(duel = %duel_id, %user, "websocket session closed");
}

async fn handle_client_message(
    state: &AppState,
    duel_id: DuelId,
    user: UserId,
    text: &str,
    sink: &mut (impl futures_util::Sink<Message> + Unpin),
) {
    let Ok(message) = serde_json::from_str::<ClientMessage>(text) else {
        return;
    };

    match message {
        ClientMessage::CodeUpdate { code, language, cursor_position } => {
            state.fabric.send_code_update(duel_id, user, code, language, cursor_position);
        }
        ClientMessage::TypingStatus { is_typing } => {
            state.fabric.broadcast(
                duel_id,
                Envelope::TypingStatus { user_id: user, is_typing, timestamp: chrono::Utc::now().timestamp_millis() },
                Some(user),
            );
        }
        ClientMessage::TestCode { code, language } => {
            // A passing/failing verdict is broadcast by the engine itself
            // as a `test_result` envelope; a hard failure (judge error) is
            // just logged here since there's no error envelope in the wire
            // taxonomy to carry it to the client.
            if let Err(e) = state.engine.test_code(duel_id, user, code, language).await {
                warn!(duel = %duel_id, %user, error = %e, "test_code failed over websocket");
            }
        }
        ClientMessage::Ping => {
            let _ = send_envelope(sink, &Envelope::Pong { timestamp: chrono::Utc::now().timestamp_millis() }).await;
        }
    }
}

async fn send_envelope(
    sink: &mut (impl futures_util::Sink<Message> + Unpin),
    envelope: &Envelope,
) -> Result<(), ()> {
    let text = serde_json::to_string(envelope).map_err(|_| ())?;
    sink.send(Message::Text(text)).await.map_err(|_| ())
}

async fn send_duel_state(
    sink: &mut (impl futures_util::Sink<Message> + Unpin),
    state: &AppState,
    duel_id: DuelId,
) -> Result<(), ()> {
    let duel = state.repo.require_duel(duel_id).map_err(|_| ())?;
    let snapshots = state.repo.snapshots_for_duel(duel_id).map_err(|_| ())?;

    let mut code_by_user: BTreeMap<UserId, String> = BTreeMap::new();
    for snapshot in snapshots {
        code_by_user.insert(snapshot.user_ref, snapshot.code);
    }

    let status = match duel.status {
        crate::domain::DuelStatus::Waiting => "waiting",
        crate::domain::DuelStatus::InProgress => "in_progress",
        crate::domain::DuelStatus::Completed => "completed",
        crate::domain::DuelStatus::Cancelled => "cancelled",
        crate::domain::DuelStatus::TimedOut => "timed_out",
    };

    send_envelope(
        sink,
        &Envelope::DuelState {
            duel_id,
            status: status.to_string(),
            difficulty: duel.difficulty,
            problem_type: duel.problem_type,
            code_by_user,
        },
    )
    .await
}
