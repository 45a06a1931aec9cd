use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for MultiversQuest Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::sse::admin_stream,
        crate::routes::websocket::ws_handler,
        crate::routes::game::register_team,
        crate::routes::game::list_teams,
        crate::routes::game::ranking,
        crate::routes::game::generate_avatar,
        crate::routes::admin::get_state,
        crate::routes::admin::delete_team,
        crate::routes::admin::reset_game,
        crate::routes::admin::start_game,
        crate::routes::admin::pause_game,
        crate::routes::admin::resume_game,
        crate::routes::admin::end_game,
        crate::routes::admin::set_phase,
        crate::routes::admin::adjust_score,
        crate::routes::admin::trigger_scenario,
        crate::routes::admin::warroom_command,
        crate::routes::progress::get_progress,
        crate::routes::progress::apply_action,
        crate::routes::progress::export_progress,
        crate::routes::progress::import_progress,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::game::CreateTeamRequest,
            crate::dto::game::CreateTeamResponse,
            crate::dto::game::AvatarRequest,
            crate::dto::game::AvatarResponse,
            crate::dto::game::TeamSummary,
            crate::dto::game::StandingSummary,
            crate::dto::game::GameSnapshot,
            crate::dto::game::AdminGameSnapshot,
            crate::dto::admin::PhaseRequest,
            crate::dto::admin::ScoreAdjustmentRequest,
            crate::dto::admin::ScenarioRequest,
            crate::dto::admin::WarroomRequest,
            crate::dto::admin::ActionResponse,
            crate::dto::admin::ScoreUpdateResponse,
            crate::dto::admin::StatusResponse,
            crate::dto::progress::ProgressActionResponse,
            crate::dto::progress::ExportResponse,
            crate::dto::progress::ImportRequest,
            crate::dto::events::ScoreUpdate,
            crate::dto::events::TimerUpdate,
            crate::dto::events::ScenarioEvent,
            crate::dto::events::GameEnded,
            crate::dto::events::WarroomCommand,
            crate::dto::events::ErrorEvent,
            crate::dto::events::TeamTokenIssued,
            crate::dto::ws::IdentifyPayload,
            crate::dto::ws::ActivityCompletePayload,
            crate::dto::ws::AdminActionPayload,
            crate::state::progress::PlayerProgress,
            crate::state::progress::ProgressAction,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "realtime", description = "WebSocket envelope protocol"),
        (name = "game", description = "Team registration and standings"),
        (name = "admin", description = "Game master controls, gated by `x-admin-key`"),
        (name = "progress", description = "Per-device progression and QR saves"),
    )
)]
pub struct ApiDoc;
