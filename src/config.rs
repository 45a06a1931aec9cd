//! Application-level configuration loading, including the universe catalogue.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::state::{
    catalogue::{ActivityDef, Catalogue, UniverseDef},
    scoring::ActivityKind,
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "MULTIVERS_QUEST_CONFIG_PATH";
/// Environment variable overriding the admin key from the file.
const ADMIN_KEY_ENV: &str = "ADMIN_KEY";

const DEFAULT_GAME_DURATION_SECS: u32 = 60 * 60;
const DEFAULT_HISTORY_LIMIT: usize = 50;
const DEFAULT_ADMIN_KEY: &str = "multivers-admin";
const DEFAULT_SCENARIO_DURATION_SECS: u64 = 30;
const DEFAULT_AVATAR_BASE_URL: &str = "https://api.dicebear.com/7.x";
const DEFAULT_AVATAR_STYLES: [&str; 5] = ["bottts", "adventurer", "pixel-art", "fun-emoji", "lorelei"];
const DEFAULT_AVATAR_CACHE_CAPACITY: usize = 256;
const DEFAULT_AVATAR_CACHE_TTL_SECS: u64 = 60 * 60;

/// Avatar generation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarSettings {
    /// Base URL of the avatar service; `/{style}/svg?seed=...` is appended.
    pub base_url: String,
    /// Styles offered to teams; one is picked at random when none is given.
    pub styles: Vec<String>,
    /// Maximum number of cached URLs.
    pub cache_capacity: usize,
    /// Lifetime of a cached URL.
    pub cache_ttl: Duration,
}

/// Environment variable selecting the storage backend.
const STORAGE_BACKEND_ENV: &str = "STORAGE_BACKEND";

/// Where match snapshots and device progress are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// Process memory; lost on restart.
    #[default]
    Memory,
    /// CouchDB over HTTP.
    Couch,
    /// MongoDB.
    Mongo,
}

impl StorageBackend {
    /// Read `STORAGE_BACKEND`; unset or unknown values fall back to memory.
    pub fn from_env() -> Self {
        match env::var(STORAGE_BACKEND_ENV) {
            Ok(value) => Self::parse(&value).unwrap_or_else(|| {
                warn!(value = %value, "unknown storage backend; using memory");
                Self::Memory
            }),
            Err(_) => Self::Memory,
        }
    }

    /// Parse a backend name, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Some(Self::Memory),
            "couch" | "couchdb" => Some(Self::Couch),
            "mongo" | "mongodb" => Some(Self::Mongo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    catalogue: Catalogue,
    game_duration_secs: u32,
    history_limit: usize,
    admin_key: String,
    scenario_duration: Duration,
    avatar: AvatarSettings,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to the built-in catalogue.
    ///
    /// `ADMIN_KEY` always wins over the file.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        universes = app_config.catalogue.universes().len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        match env::var(ADMIN_KEY_ENV).ok().filter(|key| !key.is_empty()) {
            Some(key) => config.with_admin_key(key),
            None => {
                if config.admin_key == DEFAULT_ADMIN_KEY {
                    warn!("ADMIN_KEY not set; using the built-in admin key");
                }
                config
            }
        }
    }

    /// Parse a JSON configuration document; missing fields take their defaults.
    pub fn from_json_str(contents: &str) -> serde_json::Result<Self> {
        let raw: RawConfig = serde_json::from_str(contents)?;
        Ok(raw.into())
    }

    /// Replace the admin key.
    pub fn with_admin_key(mut self, key: impl Into<String>) -> Self {
        self.admin_key = key.into();
        self
    }

    /// Replace the catalogue.
    pub fn with_catalogue(mut self, catalogue: Catalogue) -> Self {
        self.catalogue = catalogue;
        self
    }

    /// Replace the match duration.
    pub fn with_game_duration_secs(mut self, secs: u32) -> Self {
        self.game_duration_secs = secs;
        self
    }

    /// Universes and activities, in unlock order.
    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    /// Countdown start in seconds.
    pub fn game_duration_secs(&self) -> u32 {
        self.game_duration_secs
    }

    /// Maximum number of history entries kept.
    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Secret required by admin operations.
    pub fn admin_key(&self) -> &str {
        &self.admin_key
    }

    /// Duration of a scenario effect when the admin does not give one.
    pub fn scenario_duration(&self) -> Duration {
        self.scenario_duration
    }

    /// Avatar generation settings.
    pub fn avatar(&self) -> &AvatarSettings {
        &self.avatar
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalogue: default_catalogue(),
            game_duration_secs: DEFAULT_GAME_DURATION_SECS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            admin_key: DEFAULT_ADMIN_KEY.to_string(),
            scenario_duration: Duration::from_secs(DEFAULT_SCENARIO_DURATION_SECS),
            avatar: AvatarSettings {
                base_url: DEFAULT_AVATAR_BASE_URL.to_string(),
                styles: DEFAULT_AVATAR_STYLES.iter().map(|s| s.to_string()).collect(),
                cache_capacity: DEFAULT_AVATAR_CACHE_CAPACITY,
                cache_ttl: Duration::from_secs(DEFAULT_AVATAR_CACHE_TTL_SECS),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    universes: Vec<UniverseDef>,
    game_duration_secs: Option<u32>,
    history_limit: Option<usize>,
    admin_key: Option<String>,
    scenario_duration_secs: Option<u64>,
    #[serde(default)]
    avatar: RawAvatar,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAvatar {
    base_url: Option<String>,
    #[serde(default)]
    styles: Vec<String>,
    cache_capacity: Option<usize>,
    cache_ttl_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();

        let universes: Vec<UniverseDef> = value
            .universes
            .into_iter()
            .filter(|universe| !universe.activities.is_empty())
            .collect();
        let catalogue = if universes.is_empty() {
            defaults.catalogue
        } else {
            Catalogue::new(universes)
        };

        let styles = if value.avatar.styles.is_empty() {
            defaults.avatar.styles
        } else {
            value.avatar.styles
        };

        Self {
            catalogue,
            game_duration_secs: value
                .game_duration_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.game_duration_secs),
            history_limit: value
                .history_limit
                .filter(|limit| *limit > 0)
                .unwrap_or(defaults.history_limit),
            admin_key: value
                .admin_key
                .filter(|key| !key.is_empty())
                .unwrap_or(defaults.admin_key),
            scenario_duration: value
                .scenario_duration_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.scenario_duration),
            avatar: AvatarSettings {
                base_url: value
                    .avatar
                    .base_url
                    .map(|url| url.trim_end_matches('/').to_string())
                    .filter(|url| match Url::parse(url) {
                        Ok(parsed) if !parsed.cannot_be_a_base() => true,
                        Ok(_) => {
                            warn!(base_url = %url, "avatar base url cannot carry a path, using default");
                            false
                        }
                        Err(err) => {
                            warn!(base_url = %url, error = %err, "invalid avatar base url, using default");
                            false
                        }
                    })
                    .unwrap_or(defaults.avatar.base_url),
                styles,
                cache_capacity: value
                    .avatar
                    .cache_capacity
                    .filter(|capacity| *capacity > 0)
                    .unwrap_or(defaults.avatar.cache_capacity),
                cache_ttl: value
                    .avatar
                    .cache_ttl_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.avatar.cache_ttl),
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn activity(id: &str, name: &str, kind: ActivityKind, max_points: u32) -> ActivityDef {
    ActivityDef {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        max_points,
    }
}

/// Built-in universes shipped with the binary, in unlock order.
fn default_catalogue() -> Catalogue {
    Catalogue::new(vec![
        UniverseDef {
            id: "odyssee-spatiale".into(),
            name: "Odyssée Spatiale".into(),
            reward: Some("carte-stellaire".into()),
            activities: vec![
                activity("orbit-sequence", "Séquence orbitale", ActivityKind::Sequence, 1000),
                activity("signal-decode", "Signal extraterrestre", ActivityKind::Decode, 800),
                activity("constellation-drawing", "Constellations", ActivityKind::Drawing, 600),
            ],
        },
        UniverseDef {
            id: "cite-cyberpunk".into(),
            name: "Cité Cyberpunk".into(),
            reward: Some("puce-neurale".into()),
            activities: vec![
                activity("neon-hack", "Piratage néon", ActivityKind::Decode, 900),
                activity("circuit-sequence", "Circuit imprimé", ActivityKind::Sequence, 1000),
                activity("netrunner-quiz", "Quiz netrunner", ActivityKind::Quiz, 500),
            ],
        },
        UniverseDef {
            id: "royaume-medieval".into(),
            name: "Royaume Médiéval".into(),
            reward: Some("blason".into()),
            activities: vec![
                activity("rune-drawing", "Runes anciennes", ActivityKind::Drawing, 700),
                activity("chevalier-quiz", "Quiz du chevalier", ActivityKind::Quiz, 600),
                activity("blason-sequence", "Blasons", ActivityKind::Sequence, 900),
            ],
        },
        UniverseDef {
            id: "ocean-abyssal".into(),
            name: "Océan Abyssal".into(),
            reward: Some("perle-abyssale".into()),
            activities: vec![
                activity("sonar-decode", "Sonar", ActivityKind::Decode, 900),
                activity("creature-drawing", "Créatures des abysses", ActivityKind::Drawing, 700),
                activity("abysses-quiz", "Quiz des profondeurs", ActivityKind::Quiz, 800),
            ],
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = AppConfig::from_json_str("{}").unwrap();
        assert_eq!(config.history_limit(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(config.catalogue().universes().len(), 4);
        assert_eq!(
            config.catalogue().order().next(),
            Some("odyssee-spatiale")
        );
        assert_eq!(config.avatar().styles.len(), DEFAULT_AVATAR_STYLES.len());
    }

    #[test]
    fn file_values_override_defaults() {
        let config = AppConfig::from_json_str(
            r#"{
                "universes": [
                    {"id": "desert", "name": "Desert", "activities": [
                        {"id": "dune-quiz", "name": "Dunes", "kind": "quiz", "maxPoints": 400}
                    ]}
                ],
                "gameDurationSecs": 900,
                "historyLimit": 10,
                "adminKey": "s3cret",
                "avatar": {"baseUrl": "https://avatars.test/", "styles": ["pixel"], "cacheTtlSecs": 5}
            }"#,
        )
        .unwrap();

        assert_eq!(config.game_duration_secs(), 900);
        assert_eq!(config.history_limit(), 10);
        assert_eq!(config.admin_key(), "s3cret");
        assert_eq!(config.avatar().base_url, "https://avatars.test");
        assert_eq!(config.avatar().cache_ttl, Duration::from_secs(5));
        let (universe, activity) = config.catalogue().find_activity("dune-quiz").unwrap();
        assert_eq!(universe.id, "desert");
        assert_eq!(activity.kind, ActivityKind::Quiz);
    }

    #[test]
    fn unusable_avatar_base_urls_fall_back_to_default() {
        for base_url in ["avatars.test/7.x", "mailto:avatars@test", ""] {
            let document = serde_json::json!({ "avatar": { "baseUrl": base_url } });
            let config = AppConfig::from_json_str(&document.to_string()).unwrap();
            assert_eq!(config.avatar().base_url, DEFAULT_AVATAR_BASE_URL, "{base_url}");
        }
    }

    #[test]
    fn default_catalogue_save_fits_in_a_qr_code() {
        use crate::state::progress::{MAX_SAVE_PAYLOAD_LEN, PlayerProgress};

        let config = AppConfig::default();
        let mut progress = PlayerProgress::new(config.catalogue());
        progress.team_name = "Une équipe au nom plutôt long".into();
        progress.inventory = config
            .catalogue()
            .universes()
            .iter()
            .filter_map(|universe| universe.reward.clone())
            .collect();
        let payload = progress.export_save(1_700_000_000_000).unwrap();
        assert!(payload.len() <= MAX_SAVE_PAYLOAD_LEN);
    }

    #[test]
    fn storage_backend_names() {
        assert_eq!(StorageBackend::parse("Couch"), Some(StorageBackend::Couch));
        assert_eq!(StorageBackend::parse(" mongodb "), Some(StorageBackend::Mongo));
        assert_eq!(StorageBackend::parse("memory"), Some(StorageBackend::Memory));
        assert_eq!(StorageBackend::parse("redis"), None);
    }
}
