use tracing::info;

use crate::{
    error::ServiceError,
    services::sse_events,
    state::{
        SharedState,
        game::{HistoryEntry, HistoryKind},
        state_machine::{EndReason, GameEvent, GameStatus},
    },
};

/// Execute a planned state-machine transition, then broadcast the resulting status change.
///
/// Lifecycle changes other than a reset are also written to the timeline, and
/// reaching `ENDED` broadcasts the final ranking.
pub async fn run_transition_with_broadcast<F, Fut, T>(
    state: &SharedState,
    event: GameEvent,
    work: F,
) -> Result<T, ServiceError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, ServiceError>>,
{
    let (res, next) = state.run_transition(event, work).await?;
    info!(?event, status = ?next, "game status changed");
    sse_events::broadcast_status(state, next);

    if let Some(message) = timeline_message(event) {
        let entry = HistoryEntry::new(HistoryKind::Status, None, message, None);
        state.with_match_mut(|game| game.push_history(entry.clone())).await;
        sse_events::broadcast_history(state, &entry);
    }

    if let (GameStatus::Ended, GameEvent::End(reason)) = (next, event) {
        let ranking = state.read_match(|game| game.ranking()).await;
        sse_events::broadcast_game_ended(state, ranking, reason);
    }

    Ok(res)
}

fn timeline_message(event: GameEvent) -> Option<&'static str> {
    match event {
        GameEvent::Start => Some("Game started"),
        GameEvent::Pause => Some("Game paused"),
        GameEvent::Resume => Some("Game resumed"),
        GameEvent::End(EndReason::Manual) => Some("Game ended by the game master"),
        GameEvent::End(EndReason::TimerElapsed) => Some("Time is up"),
        GameEvent::Reset => None,
    }
}
