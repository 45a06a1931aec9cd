//! Avatar URL generation backed by the bounded cache in [`AppState`].

use std::time::Instant;

use rand::{rng, seq::IndexedRandom};
use tracing::debug;
use url::Url;

use crate::{
    config::AvatarSettings,
    dto::game::{AvatarRequest, AvatarResponse},
    error::ServiceError,
    state::AppState,
};

/// Handle `POST /api/generate-avatar`.
pub async fn generate_avatar(
    state: &AppState,
    request: AvatarRequest,
) -> Result<AvatarResponse, ServiceError> {
    let url = avatar_url(state, &request.team_name, request.style.as_deref()).await?;
    Ok(AvatarResponse { url })
}

/// Cached avatar URL for `name`, picking a random configured style when `style` is `None`.
pub async fn avatar_url(
    state: &AppState,
    name: &str,
    style: Option<&str>,
) -> Result<String, ServiceError> {
    let config = state.config();
    let settings = config.avatar();
    let style = resolve_style(settings, style)?;
    let seed = name.trim();

    let mut cache = state.avatars().lock().await;
    cache.get_or_try_insert_with(&style, seed, Instant::now(), || {
        debug!(style = %style, seed, "generating avatar url");
        build_url(&settings.base_url, &style, seed)
    })
}

fn resolve_style(settings: &AvatarSettings, style: Option<&str>) -> Result<String, ServiceError> {
    match style.map(str::trim).filter(|style| !style.is_empty()) {
        Some(style) if settings.styles.iter().any(|known| known == style) => Ok(style.to_string()),
        Some(style) => Err(ServiceError::InvalidInput(format!(
            "unknown avatar style `{style}`"
        ))),
        None => settings
            .styles
            .choose(&mut rng())
            .cloned()
            .ok_or_else(|| ServiceError::InvalidInput("no avatar style configured".into())),
    }
}

fn build_url(base_url: &str, style: &str, seed: &str) -> Result<String, ServiceError> {
    let mut url = Url::parse(base_url).map_err(|err| {
        ServiceError::Misconfigured(format!("avatar base url `{base_url}`: {err}"))
    })?;
    if url.cannot_be_a_base() {
        return Err(ServiceError::Misconfigured(format!(
            "avatar base url `{base_url}` cannot carry a path"
        )));
    }

    let path = format!("{}/{style}/svg", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut().clear().append_pair("seed", seed);
    Ok(url.into())
}
