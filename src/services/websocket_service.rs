use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, timeout_at},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        events::{self, ErrorEvent},
        game::team_summaries,
        validation::validate_device_id,
        ws::{ActivityCompletePayload, AdminActionPayload, ClientMessage, ClientRole, IdentifyPayload},
    },
    error::ServiceError,
    services::{admin_service, game_service, progress_service, sse_events, sse_service::EventFeed},
    state::{ClientConnection, SharedState},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

type Outbound = mpsc::UnboundedSender<Message>;

/// Errors raised while serving one socket message.
///
/// Everything except a closed writer is reported back to the client as an
/// `error` event and the connection stays open.
#[derive(Debug, Error)]
enum SocketError {
    /// Writer channel closed; the connection is gone.
    #[error("connection closed")]
    ConnectionClosed,
    /// Frame was not a valid client message.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Message is not allowed for this client.
    #[error("{0}")]
    Forbidden(&'static str),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Identity established by the `identify` handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    client_id: Uuid,
    role: ClientRole,
    team_id: Option<Uuid>,
    device_id: Option<String>,
}

/// Handle the full lifecycle of a client socket.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let deadline = Instant::now() + IDENT_TIMEOUT;
    let session = loop {
        let text = match timeout_at(deadline, receiver.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => text,
            Ok(Some(Ok(Message::Ping(payload)))) => {
                let _ = outbound_tx.send(Message::Pong(payload));
                continue;
            }
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                finalize(writer_task, outbound_tx).await;
                return;
            }
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(err))) => {
                warn!(error = %err, "websocket receive error");
                finalize(writer_task, outbound_tx).await;
                return;
            }
            Err(_) => {
                warn!("websocket identification timed out");
                let _ = outbound_tx.send(Message::Close(None));
                finalize(writer_task, outbound_tx).await;
                return;
            }
        };

        let result = match ClientMessage::parse(text.as_str()) {
            Ok(ClientMessage::Identify(payload)) => identify(&state, payload).await,
            Ok(other) => {
                debug!(event = other.name(), "message received before identification");
                Err(SocketError::Forbidden("identify first"))
            }
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(session) => break session,
            Err(err) => {
                if report_error(&outbound_tx, &err).is_err() {
                    finalize(writer_task, outbound_tx).await;
                    return;
                }
            }
        }
    };

    let forwarder = attach(&state, &session, outbound_tx.clone()).await;
    info!(client_id = %session.client_id, role = ?session.role, team_id = ?session.team_id, "client identified");

    if send_initial_state(&state, &session, &outbound_tx).await.is_ok() {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let outcome = match ClientMessage::parse(text.as_str()) {
                        Ok(message) => handle_message(&state, &session, message, &outbound_tx).await,
                        Err(err) => Err(err.into()),
                    };
                    if let Err(err) = outcome {
                        if matches!(err, SocketError::ConnectionClosed)
                            || report_error(&outbound_tx, &err).is_err()
                        {
                            break;
                        }
                    }
                }
                Ok(Message::Ping(payload)) => {
                    let _ = outbound_tx.send(Message::Pong(payload));
                }
                Ok(Message::Close(frame)) => {
                    let _ = outbound_tx.send(Message::Close(frame));
                    break;
                }
                Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
                Err(err) => {
                    warn!(client_id = %session.client_id, error = %err, "websocket error");
                    break;
                }
            }
        }
    }

    forwarder.abort();
    detach(&state, &session).await;
    info!(client_id = %session.client_id, "client disconnected");
    finalize(writer_task, outbound_tx).await;
}

/// Validate an `identify` payload and build the session it opens.
async fn identify(state: &SharedState, payload: IdentifyPayload) -> Result<Session, SocketError> {
    let IdentifyPayload {
        role,
        team_id,
        team_token,
        device_id,
        admin_key,
    } = payload;

    if let Some(device_id) = device_id.as_deref() {
        validate_device_id(device_id).map_err(|_| {
            SocketError::Service(ServiceError::InvalidInput("invalid device id".into()))
        })?;
    }

    let team_id = match (role, team_id) {
        (ClientRole::Admin, _) => {
            admin_service::check_admin_key(state, admin_key.as_deref())?;
            None
        }
        (ClientRole::Player, Some(team_id)) => {
            let token = team_token.unwrap_or_default();
            let known = state
                .read_match(|game| game.verify_token(team_id, &token))
                .await;
            if !known {
                return Err(SocketError::Service(ServiceError::Unauthorized(
                    "unknown team or wrong team token".into(),
                )));
            }
            Some(team_id)
        }
        _ => None,
    };

    Ok(Session {
        client_id: Uuid::new_v4(),
        role,
        team_id,
        device_id,
    })
}

/// Register the client and start forwarding broadcast events to it.
async fn attach(state: &SharedState, session: &Session, tx: Outbound) -> JoinHandle<()> {
    let mut feed = match session.role {
        ClientRole::Admin => EventFeed::admin(state),
        _ => EventFeed::public(state),
    };

    let connection = ClientConnection {
        role: session.role,
        team_id: session.team_id,
        device_id: session.device_id.clone(),
        tx: tx.clone(),
    };
    match session.team_id {
        Some(team_id) => {
            update_presence(state, team_id, |clients| {
                clients.insert(session.client_id, connection);
            })
            .await
        }
        None => {
            state.clients().insert(session.client_id, connection);
        }
    }

    tokio::spawn(async move {
        while let Some(event) = feed.next().await {
            if tx.send(Message::Text(event.to_ws_text().into())).is_err() {
                break;
            }
        }
    })
}

/// Forget the client; the team goes offline with its last socket.
async fn detach(state: &SharedState, session: &Session) {
    match session.team_id {
        Some(team_id) => {
            update_presence(state, team_id, |clients| {
                clients.remove(&session.client_id);
            })
            .await
        }
        None => {
            state.clients().remove(&session.client_id);
        }
    }
}

/// Apply `change` to the client registry and derive the team's flag from it.
///
/// Both run under the match write lock, so attaches and detaches of one team
/// cannot publish their flags out of order.
async fn update_presence(
    state: &SharedState,
    team_id: Uuid,
    change: impl FnOnce(&DashMap<Uuid, ClientConnection>),
) {
    let teams = state
        .with_match_mut(|game| {
            change(state.clients());
            let online = state
                .clients()
                .iter()
                .any(|client| client.team_id == Some(team_id));
            game.set_connected(team_id, online)
                .then(|| team_summaries(game))
        })
        .await;
    if let Some(teams) = teams {
        debug!(team_id = %team_id, "team presence changed");
        sse_events::broadcast_teams(state, teams);
    }
}

async fn send_initial_state(
    state: &SharedState,
    session: &Session,
    tx: &Outbound,
) -> Result<(), SocketError> {
    send_full_state(state, session, tx).await?;
    send_progress(state, session, tx).await
}

async fn send_full_state(
    state: &SharedState,
    session: &Session,
    tx: &Outbound,
) -> Result<(), SocketError> {
    match session.role {
        ClientRole::Admin => send_event(tx, events::FULL_STATE, &game_service::admin_state(state).await),
        _ => send_event(tx, events::FULL_STATE, &game_service::public_state(state).await),
    }
}

async fn send_progress(
    state: &SharedState,
    session: &Session,
    tx: &Outbound,
) -> Result<(), SocketError> {
    let Some(device_id) = session.device_id.as_deref() else {
        return Ok(());
    };
    match progress_service::load_progress(state, device_id).await {
        Ok(progress) => send_event(tx, events::PROGRESS_STATE, &progress),
        Err(err) => {
            warn!(device_id, error = %err, "could not load device progress");
            Ok(())
        }
    }
}

async fn handle_message(
    state: &SharedState,
    session: &Session,
    message: ClientMessage,
    tx: &Outbound,
) -> Result<(), SocketError> {
    match message {
        ClientMessage::Identify(_) => {
            debug!(client_id = %session.client_id, "ignoring duplicate identification");
            Ok(())
        }
        ClientMessage::ActivityComplete(payload) => {
            handle_activity_complete(state, session, payload, tx).await
        }
        ClientMessage::AdminAction(payload) => handle_admin_action(state, payload).await,
        ClientMessage::StateRequest => send_initial_state(state, session, tx).await,
        ClientMessage::Unknown(event) => {
            debug!(client_id = %session.client_id, event = %event, "ignoring unknown event");
            Ok(())
        }
    }
}

async fn handle_activity_complete(
    state: &SharedState,
    session: &Session,
    payload: ActivityCompletePayload,
    tx: &Outbound,
) -> Result<(), SocketError> {
    let (ClientRole::Player, Some(team_id)) = (session.role, session.team_id) else {
        return Err(SocketError::Forbidden(
            "only players identified with a team can complete activities",
        ));
    };

    let outcome =
        game_service::complete_activity(state, team_id, session.device_id.as_deref(), payload)
            .await?;
    match outcome.progress {
        Some(progress) => send_event(tx, events::PROGRESS_STATE, &progress),
        None => Ok(()),
    }
}

async fn handle_admin_action(
    state: &SharedState,
    payload: AdminActionPayload,
) -> Result<(), SocketError> {
    admin_service::check_admin_key(state, Some(&payload.admin_key))?;
    let response = admin_service::apply_action(state, payload.action).await?;
    debug!(message = %response.message, "admin action applied");
    Ok(())
}

fn send_event<T: Serialize>(tx: &Outbound, event: &str, payload: &T) -> Result<(), SocketError> {
    let data = match serde_json::to_value(payload) {
        Ok(data) => data,
        Err(err) => {
            warn!(event, error = %err, "failed to serialise socket event");
            return Ok(());
        }
    };
    let frame = serde_json::json!({ "event": event, "data": data });
    tx.send(Message::Text(frame.to_string().into()))
        .map_err(|_| SocketError::ConnectionClosed)
}

fn report_error(tx: &Outbound, err: &SocketError) -> Result<(), SocketError> {
    debug!(error = %err, "rejecting socket message");
    send_event(
        tx,
        events::ERROR,
        &ErrorEvent {
            message: err.to_string(),
        },
    )
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: Outbound) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dto::game::CreateTeamRequest,
        state::{AppState, state_machine::GameStatus},
    };

    fn frames(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let Message::Text(text) = message {
                out.push(serde_json::from_str(text.as_str()).unwrap());
            }
        }
        out
    }

    async fn team(state: &SharedState, name: &str) -> (Uuid, String) {
        let created = game_service::register_team(
            state,
            CreateTeamRequest {
                name: name.into(),
                avatar_style: None,
            },
        )
        .await
        .unwrap();
        (created.team.id, created.team_token)
    }

    fn player(team_id: Uuid, token: &str) -> IdentifyPayload {
        IdentifyPayload {
            role: ClientRole::Player,
            team_id: Some(team_id),
            team_token: Some(token.into()),
            device_id: Some("phone-1".into()),
            admin_key: None,
        }
    }

    #[tokio::test]
    async fn players_need_the_team_token() {
        let state = AppState::new(AppConfig::default());
        let (team_id, token) = team(&state, "Alpha").await;

        assert!(identify(&state, player(team_id, "wrong")).await.is_err());
        let session = identify(&state, player(team_id, &token)).await.unwrap();
        assert_eq!(session.team_id, Some(team_id));
    }

    #[tokio::test]
    async fn admin_role_requires_the_admin_key() {
        let state = AppState::new(AppConfig::default().with_admin_key("secret"));
        let mut payload = IdentifyPayload {
            role: ClientRole::Admin,
            team_id: None,
            team_token: None,
            device_id: None,
            admin_key: Some("nope".into()),
        };
        assert!(identify(&state, payload.clone()).await.is_err());
        payload.admin_key = Some("secret".into());
        assert_eq!(identify(&state, payload).await.unwrap().role, ClientRole::Admin);
    }

    #[tokio::test]
    async fn presence_follows_the_last_socket_of_a_team() {
        let state = AppState::new(AppConfig::default());
        let (team_id, token) = team(&state, "Alpha").await;
        let (tx, _rx) = mpsc::unbounded_channel();

        let first = identify(&state, player(team_id, &token)).await.unwrap();
        let second = identify(&state, player(team_id, &token)).await.unwrap();
        let first_task = attach(&state, &first, tx.clone()).await;
        let second_task = attach(&state, &second, tx.clone()).await;
        assert!(state.game_snapshot().await.teams[0].connected);

        first_task.abort();
        detach(&state, &first).await;
        assert!(state.game_snapshot().await.teams[0].connected);

        second_task.abort();
        detach(&state, &second).await;
        assert!(!state.game_snapshot().await.teams[0].connected);
        assert!(state.clients().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn presence_survives_a_socket_handover() {
        let state = AppState::new(AppConfig::default());
        let (team_id, token) = team(&state, "Alpha").await;
        let (tx, _rx) = mpsc::unbounded_channel();

        for _ in 0..100 {
            let leaving = identify(&state, player(team_id, &token)).await.unwrap();
            let joining = identify(&state, player(team_id, &token)).await.unwrap();
            attach(&state, &leaving, tx.clone()).await.abort();

            let detach_task = {
                let state = state.clone();
                tokio::spawn(async move { detach(&state, &leaving).await })
            };
            let attach_task = {
                let (state, joining, tx) = (state.clone(), joining.clone(), tx.clone());
                tokio::spawn(async move { attach(&state, &joining, tx).await.abort() })
            };
            detach_task.await.unwrap();
            attach_task.await.unwrap();
            assert!(state.game_snapshot().await.teams[0].connected);

            detach(&state, &joining).await;
            assert!(!state.game_snapshot().await.teams[0].connected);
        }
        assert!(state.clients().is_empty());
    }

    #[tokio::test]
    async fn errors_are_reported_without_closing() {
        let state = AppState::new(AppConfig::default());
        let (team_id, token) = team(&state, "Alpha").await;
        let session = identify(&state, player(team_id, &token)).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let message = ClientMessage::ActivityComplete(ActivityCompletePayload {
            activity_id: "unknown".into(),
            universe_id: None,
            kind: None,
            points: Some(10),
            metrics: None,
        });
        let err = handle_message(&state, &session, message, &tx)
            .await
            .unwrap_err();
        report_error(&tx, &err).unwrap();

        let sent = frames(&mut rx);
        assert_eq!(sent[0]["event"], "error");
        assert_eq!(state.status().await, GameStatus::Lobby);
    }

    #[tokio::test]
    async fn state_request_sends_the_full_state_and_progress() {
        let state = AppState::new(AppConfig::default());
        let (team_id, token) = team(&state, "Alpha").await;
        let session = identify(&state, player(team_id, &token)).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_message(&state, &session, ClientMessage::StateRequest, &tx)
            .await
            .unwrap();
        let sent = frames(&mut rx);
        assert_eq!(sent[0]["event"], "game:fullState");
        assert_eq!(sent[0]["data"]["teams"][0]["name"], "Alpha");
        assert!(sent[0]["data"].get("teamTokens").is_none());
        assert_eq!(sent[1]["event"], "progress:state");
    }

    #[tokio::test]
    async fn admin_actions_over_the_socket_check_the_key() {
        let state = AppState::new(AppConfig::default().with_admin_key("secret"));
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Session {
            client_id: Uuid::new_v4(),
            role: ClientRole::Dashboard,
            team_id: None,
            device_id: None,
        };
        let action = |key: &str| {
            ClientMessage::AdminAction(AdminActionPayload {
                admin_key: key.into(),
                action: crate::dto::ws::AdminAction::Start,
            })
        };

        assert!(handle_message(&state, &session, action("guess"), &tx).await.is_err());
        handle_message(&state, &session, action("secret"), &tx)
            .await
            .unwrap();
        assert_eq!(state.status().await, GameStatus::Playing);
    }
}
