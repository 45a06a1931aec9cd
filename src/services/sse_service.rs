use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::{
    dto::sse::{Handshake, ServerEvent},
    error::ServiceError,
    services::admin_service::check_admin_key,
    state::AppState,
};

const HANDSHAKE_EVENT: &str = "handshake";

/// Receivers feeding one client: public events, plus admin ones when authorised.
pub struct EventFeed {
    public: broadcast::Receiver<ServerEvent>,
    admin: Option<broadcast::Receiver<ServerEvent>>,
}

impl EventFeed {
    /// Public events only.
    pub fn public(state: &AppState) -> Self {
        Self {
            public: state.public_sse().subscribe(),
            admin: None,
        }
    }

    /// Public and admin events.
    pub fn admin(state: &AppState) -> Self {
        Self {
            public: state.public_sse().subscribe(),
            admin: Some(state.admin_sse().subscribe()),
        }
    }

    /// Next event from either hub; `None` once the hubs are gone.
    ///
    /// Lagging receivers skip what they missed; clients resync with a full state request.
    pub async fn next(&mut self) -> Option<ServerEvent> {
        loop {
            let received = match &mut self.admin {
                Some(admin) => tokio::select! {
                    received = self.public.recv() => received,
                    received = admin.recv() => received,
                },
                None => self.public.recv().await,
            };
            match received {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event feed lagged behind");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Subscribe to the public stream.
pub async fn subscribe_public(state: &AppState) -> (EventFeed, ServerEvent) {
    let feed = EventFeed::public(state);
    let handshake = handshake(state, "public").await;
    (feed, handshake)
}

/// Subscribe to the admin stream after checking `key`.
pub async fn subscribe_admin(
    state: &AppState,
    key: Option<&str>,
) -> Result<(EventFeed, ServerEvent), ServiceError> {
    check_admin_key(state, key)?;
    let feed = EventFeed::admin(state);
    let handshake = handshake(state, "admin").await;
    Ok((feed, handshake))
}

/// Identifies the target SSE stream for logging once the connection is torn down.
#[derive(Clone, Copy, Debug)]
pub enum StreamKind {
    Public,
    Admin,
}

/// Convert an event feed into an SSE response, starting with `first`.
pub fn to_sse_stream(
    mut feed: EventFeed,
    first: ServerEvent,
    kind: StreamKind,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from the hubs and pushes into mpsc
    tokio::spawn(async move {
        if tx.send(Ok(to_event(first))).await.is_err() {
            return;
        }
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                next = feed.next() => {
                    let Some(payload) = next else { break };
                    if tx.send(Ok(to_event(payload))).await.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(stream = ?kind, "SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

async fn handshake(state: &AppState, stream: &str) -> ServerEvent {
    let payload = Handshake {
        stream: stream.to_string(),
        message: format!("{stream} stream connected"),
        degraded: state.is_degraded().await,
    };
    ServerEvent::json(Some(HANDSHAKE_EVENT.to_string()), &payload)
        .unwrap_or_else(|_| ServerEvent::new(Some(HANDSHAKE_EVENT.to_string()), "{}".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, services::sse_events};

    #[tokio::test]
    async fn admin_feed_merges_both_hubs() {
        let state = AppState::new(AppConfig::default().with_admin_key("k"));
        assert!(matches!(
            subscribe_admin(&state, Some("wrong")).await,
            Err(ServiceError::Unauthorized(_))
        ));

        let (mut feed, handshake) = subscribe_admin(&state, Some("k")).await.unwrap();
        assert_eq!(handshake.event.as_deref(), Some(HANDSHAKE_EVENT));

        sse_events::broadcast_system_status(&state, false);
        sse_events::broadcast_timer(&state, 3);
        let mut names = vec![
            feed.next().await.unwrap().event.unwrap(),
            feed.next().await.unwrap().event.unwrap(),
        ];
        names.sort();
        assert_eq!(names, vec!["system:status", "timer:update"]);
    }

    #[tokio::test]
    async fn lagging_feeds_skip_ahead() {
        let state = AppState::new(AppConfig::default());
        let mut feed = EventFeed::public(&state);
        for second in 0..200 {
            sse_events::broadcast_timer(&state, second);
        }
        let event = feed.next().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("timer:update"));
        assert!(!event.data.contains("\"globalTimer\":0}"));
    }
}
