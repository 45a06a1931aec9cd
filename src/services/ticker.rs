//! One-second heartbeat driving the countdown and effect expiry.

use std::time::{Duration, SystemTime};

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    services::sse_events,
    state::{
        SharedState,
        state_machine::{EndReason, GameEvent},
        transitions::run_transition_with_broadcast,
    },
};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Tick forever.
pub async fn run(state: SharedState) {
    let mut ticker = interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        tick_once(&state, SystemTime::now()).await;
    }
}

/// Advance the match by one second and broadcast what changed.
pub async fn tick_once(state: &SharedState, now: SystemTime) {
    let outcome = state.tick(now).await;

    if let Some(timer) = outcome.timer {
        sse_events::broadcast_timer(state, timer);
    }

    for effect in &outcome.expired_effects {
        debug!(effect = %effect.effect, "scenario effect expired");
        sse_events::broadcast_effect_end(state, &effect.effect);
    }

    if outcome.timer_elapsed {
        info!("match timer elapsed; ending the game");
        if let Err(err) = run_transition_with_broadcast(
            state,
            GameEvent::End(EndReason::TimerElapsed),
            || async { Ok(()) },
        )
        .await
        {
            warn!(error = %err, "failed to end the game after the timer elapsed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        state::{AppState, state_machine::GameStatus},
    };

    #[tokio::test]
    async fn timer_only_runs_while_playing_and_ends_the_game() {
        let state = AppState::new(AppConfig::default().with_game_duration_secs(2));
        let mut events = state.public_sse().subscribe();
        let now = SystemTime::now();

        tick_once(&state, now).await;
        assert_eq!(state.game_snapshot().await.global_timer, 2);

        run_transition_with_broadcast(&state, GameEvent::Start, || async { Ok(()) })
            .await
            .unwrap();
        tick_once(&state, now).await;
        tick_once(&state, now).await;

        assert_eq!(state.status().await, GameStatus::Ended);
        assert_eq!(state.game_snapshot().await.global_timer, 0);

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.extend(event.event);
        }
        assert!(names.iter().filter(|name| *name == "timer:update").count() == 2);
        assert_eq!(names.last().map(String::as_str), Some("game:ended"));
    }

    #[tokio::test]
    async fn expired_effects_are_announced() {
        let state = AppState::new(AppConfig::default());
        let start = SystemTime::now();
        state
            .with_match_mut(|game| game.add_effect("glitch", Duration::from_secs(3), start))
            .await
            .unwrap();
        let mut events = state.public_sse().subscribe();

        tick_once(&state, start + Duration::from_secs(1)).await;
        assert!(events.try_recv().is_err());

        tick_once(&state, start + Duration::from_secs(3)).await;
        let event = events.try_recv().unwrap();
        assert_eq!(event.event.as_deref(), Some("scenario:effectEnd"));
        assert!(state.game_snapshot().await.active_effects.is_empty());
    }
}
