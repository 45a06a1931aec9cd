pub mod avatar_cache;
pub mod catalogue;
pub mod game;
pub mod mirror;
pub mod progress;
pub mod scoring;
mod sse;
pub mod state_machine;
pub mod transitions;

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{Mutex, Notify, RwLock, mpsc, watch};
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{game_store::GameStore, models::MatchStateEntity},
    dto::{game::GameSnapshot, ws::ClientRole},
    error::ServiceError,
    services::sse_events,
    state::{
        avatar_cache::AvatarCache,
        game::{MatchState, TickOutcome}, progress::PlayerProgress,
        state_machine::GameStatus,
    },
};

pub use self::sse::SseHub;
pub use self::state_machine::{AbortError, ApplyError, Plan, PlanError, PlanId, Snapshot};
use self::{
    sse::SseState,
    state_machine::{GameEvent, GameStateMachine},
};

pub type SharedState = Arc<AppState>;
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
/// Handle used to push messages to an identified WebSocket client.
pub struct ClientConnection {
    pub role: ClientRole,
    pub team_id: Option<Uuid>,
    pub device_id: Option<String>,
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state: match data, connections, caches and the storage handle.
pub struct AppState {
    config: Arc<AppConfig>,
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    sse: SseState,
    clients: DashMap<Uuid, ClientConnection>,
    progress: DashMap<String, PlayerProgress>,
    avatars: Mutex<AvatarCache>,
    game: RwLock<GameStateMachine>,
    match_state: RwLock<MatchState>,
    degraded: watch::Sender<bool>,
    dirty: Notify,
    transition_gate: Mutex<()>,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let avatar = config.avatar();
        let avatars = AvatarCache::new(avatar.cache_capacity, avatar.cache_ttl);
        let match_state = MatchState::new(config.history_limit(), config.game_duration_secs());
        Arc::new(Self {
            config: Arc::new(config),
            game_store: RwLock::new(None),
            sse: SseState::new(64, 16),
            clients: DashMap::new(),
            progress: DashMap::new(),
            avatars: Mutex::new(avatars),
            game: RwLock::new(GameStateMachine::new()),
            match_state: RwLock::new(match_state),
            degraded: degraded_tx,
            dirty: Notify::new(),
            transition_gate: Mutex::new(()),
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
        })
    }

    /// Loaded configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current game store, or [`ServiceError::Degraded`] while running without one.
    pub async fn require_game_store(&self) -> Result<Arc<dyn GameStore>, ServiceError> {
        if self.is_degraded().await {
            return Err(ServiceError::Degraded);
        }
        self.game_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn set_game_store(&self, store: Arc<dyn GameStore>) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current game store and enter degraded mode.
    pub async fn clear_game_store(&self) {
        {
            let mut guard = self.game_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update the degraded flag, notifying admins when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        let changed = self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
        if changed {
            info!(degraded = value, "degraded mode changed");
            sse_events::broadcast_system_status(self, value);
        }
    }

    /// Broadcast hub used for the public SSE stream and every socket.
    pub fn public_sse(&self) -> &SseHub {
        self.sse.public()
    }

    /// Broadcast hub used for the admin SSE stream and admin sockets.
    pub fn admin_sse(&self) -> &SseHub {
        self.sse.admin()
    }

    /// Registry of identified sockets keyed by connection id.
    pub fn clients(&self) -> &DashMap<Uuid, ClientConnection> {
        &self.clients
    }

    /// Progress of devices seen since startup, keyed by device id.
    pub fn progress_cache(&self) -> &DashMap<String, PlayerProgress> {
        &self.progress
    }

    /// Generated avatar URLs.
    pub fn avatars(&self) -> &Mutex<AvatarCache> {
        &self.avatars
    }

    /// Current status of the shared state machine.
    pub async fn status(&self) -> GameStatus {
        self.game.read().await.status()
    }

    /// Snapshot the state machine, pending plan included.
    pub async fn snapshot(&self) -> Snapshot {
        let sm = self.game.read().await;
        sm.snapshot()
    }

    /// Consistent projection of status and match state.
    pub async fn game_snapshot(&self) -> GameSnapshot {
        let sm = self.game.read().await;
        let game = self.match_state.read().await;
        GameSnapshot::build(&game, sm.status())
    }

    /// Run `f` against the match state without mutating it.
    pub async fn read_match<R>(&self, f: impl FnOnce(&MatchState) -> R) -> R {
        let guard = self.match_state.read().await;
        f(&guard)
    }

    /// Mutate the match state and schedule a snapshot write.
    pub async fn with_match_mut<R>(&self, f: impl FnOnce(&mut MatchState) -> R) -> R {
        let mut guard = self.match_state.write().await;
        let result = f(&mut guard);
        drop(guard);
        self.mark_dirty();
        result
    }

    /// Mutate the match state only while the status is `expected`.
    ///
    /// The status is held for the whole mutation so no transition interleaves.
    pub async fn with_match_while<R>(
        &self,
        expected: GameStatus,
        f: impl FnOnce(&mut MatchState) -> Result<R, ServiceError>,
    ) -> Result<R, ServiceError> {
        let sm = self.game.read().await;
        if sm.status() != expected {
            return Err(ServiceError::InvalidState(format!(
                "game is {:?}, expected {:?}",
                sm.status(),
                expected
            )));
        }
        let mut guard = self.match_state.write().await;
        let result = f(&mut guard);
        drop(guard);
        drop(sm);
        self.mark_dirty();
        result
    }

    /// Advance the match by one second at `now`.
    ///
    /// The timer only runs while PLAYING; effects expire in every status.
    pub async fn tick(&self, now: SystemTime) -> TickOutcome {
        let sm = self.game.read().await;
        let running = sm.status() == GameStatus::Playing;
        let mut game = self.match_state.write().await;
        if !running && game.active_effects.is_empty() {
            return TickOutcome::default();
        }
        let outcome = game.tick(running, now);
        drop(game);
        drop(sm);
        self.mark_dirty();
        outcome
    }

    /// Persisted form of the match.
    pub async fn match_entity(&self) -> MatchStateEntity {
        let sm = self.game.read().await;
        let game = self.match_state.read().await;
        game.to_entity(sm.status())
    }

    /// Replace the match with a persisted snapshot.
    ///
    /// A match saved while running comes back paused; the timer did not run
    /// while the server was down.
    pub async fn restore_match(&self, entity: MatchStateEntity) -> Result<GameStatus, ServiceError> {
        let _gate = self.transition_gate.lock().await;
        let mut sm = self.game.write().await;
        let mut game = self.match_state.write().await;
        let status = match game.restore(entity) {
            GameStatus::Playing => GameStatus::Paused,
            other => other,
        };
        sm.restore(status)?;
        Ok(status)
    }

    /// Flag the match as modified.
    pub fn mark_dirty(&self) {
        self.dirty.notify_one();
    }

    /// Signal raised by [`mark_dirty`](Self::mark_dirty).
    pub fn dirty(&self) -> &Notify {
        &self.dirty
    }

    /// Plan a transition to the shared game state machine, returning the plan.
    async fn plan_transition(&self, event: GameEvent) -> Result<Plan, PlanError> {
        let mut sm = self.game.write().await;
        sm.plan(event)
    }

    /// Apply the planned transition to the shared game state machine, returning the next status.
    async fn apply_planned_transition(&self, plan_id: PlanId) -> Result<GameStatus, ApplyError> {
        let mut sm = self.game.write().await;
        sm.apply(plan_id)
    }

    /// Abort a planned transition of the shared game state machine
    async fn abort_transition(&self, plan_id: PlanId) -> Result<(), AbortError> {
        let mut sm = self.game.write().await;
        sm.abort(plan_id)
    }

    /// Plan `event`, run `work`, then apply the plan or abort it on error or timeout.
    pub async fn run_transition<F, Fut, T>(
        &self,
        event: GameEvent,
        work: F,
    ) -> Result<(T, GameStatus), ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ServiceError>>,
    {
        let gate = self.transition_gate.lock().await;
        let Plan { id: plan_id, .. } = self.plan_transition(event).await?;

        let work_future = work();
        let outcome = if let Some(limit) = self.transition_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    if let Err(abort_err) = self.abort_transition(plan_id).await {
                        warn!(
                            event = ?event,
                            plan_id = %plan_id,
                            error = ?abort_err,
                            "failed to abort transition after timeout"
                        );
                    }
                    drop(gate);
                    return Err(ServiceError::Timeout);
                }
            }
        } else {
            work_future.await
        };

        match outcome {
            Ok(value) => {
                let next = self.apply_planned_transition(plan_id).await?;
                drop(gate);
                self.mark_dirty();
                Ok((value, next))
            }
            Err(err) => {
                if let Err(abort_err) = self.abort_transition(plan_id).await {
                    warn!(
                        event = ?event,
                        plan_id = %plan_id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                drop(gate);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game::MatchError;

    fn state() -> SharedState {
        AppState::new(AppConfig::default().with_game_duration_secs(120))
    }

    #[tokio::test]
    async fn failed_work_leaves_the_status_unchanged() {
        let state = state();
        let result: Result<((), GameStatus), _> = state
            .run_transition(GameEvent::Start, || async {
                Err(ServiceError::InvalidState("nope".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(state.status().await, GameStatus::Lobby);
        assert!(state.snapshot().await.pending.is_none());
    }

    #[tokio::test]
    async fn invalid_transitions_are_rejected() {
        let state = state();
        let result = state
            .run_transition(GameEvent::Pause, || async { Ok(()) })
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));
        assert_eq!(state.status().await, GameStatus::Lobby);
    }

    #[tokio::test]
    async fn mutations_are_gated_on_status() {
        let state = state();
        let result = state
            .with_match_while(GameStatus::Playing, |game| {
                game.add_team("A", None).map_err(ServiceError::from)
            })
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));
        assert!(state.read_match(|game| game.teams.is_empty()).await);

        state
            .run_transition(GameEvent::Start, || async { Ok(()) })
            .await
            .unwrap();
        let (id, _) = state
            .with_match_while(GameStatus::Playing, |game| {
                game.add_team("A", None).map_err(ServiceError::from)
            })
            .await
            .unwrap();
        let duplicate = state
            .with_match_mut(|game| game.add_team("a", None))
            .await;
        assert!(matches!(duplicate, Err(MatchError::DuplicateTeamName(_))));
        assert!(state.read_match(|game| game.teams.contains_key(&id)).await);
    }

    #[tokio::test]
    async fn restored_running_match_comes_back_paused() {
        let state = state();
        let mut saved = MatchState::new(50, 120);
        saved.add_team("A", None).unwrap();
        saved.global_timer = 42;
        let entity = saved.to_entity(GameStatus::Playing);

        let status = state.restore_match(entity).await.unwrap();
        assert_eq!(status, GameStatus::Paused);
        assert_eq!(state.status().await, GameStatus::Paused);
        assert_eq!(state.game_snapshot().await.global_timer, 42);
    }

    #[tokio::test]
    async fn degraded_flag_tracks_the_store() {
        let state = state();
        assert!(state.is_degraded().await);
        assert!(matches!(
            state.require_game_store().await,
            Err(ServiceError::Degraded)
        ));
        state
            .set_game_store(Arc::new(crate::dao::game_store::MemoryGameStore::new()))
            .await;
        assert!(!state.is_degraded().await);
        assert!(state.require_game_store().await.is_ok());
    }
}
