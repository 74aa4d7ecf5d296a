//! Runtime configuration.
//!
//! Settings come from three layers, highest precedence first:
//!
//! 1. process environment (after loading `.env` with `dotenvy`)
//! 2. the `[authbot]` table of `config/default.toml`
//! 3. built-in defaults
//!
//! Identity-provider credentials are environment-only.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use authbot_auth_engine::OidcConfig;
use authbot_auth_engine::oidc::DEFAULT_SCOPES;
use authbot_channels::{AddressError, ConversationAddress};
use serde::Deserialize;

use crate::error::ConfigError;

/// Where [`AuthBotConfig::load`] looks for file settings.
pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";

pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
pub const DEFAULT_PORT: u16 = 3979;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_DB_PATH: &str = "data/authbot.db";
pub const DEFAULT_CODE_TTL_SECS: u64 = 600;
pub const DEFAULT_MAX_CODE_ATTEMPTS: u32 = 3;
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Path of the sign-in redirect endpoint.
pub const LOGIN_PATH: &str = "/login";
/// Path the identity provider redirects back to.
pub const CALLBACK_PATH: &str = "/api/OAuthCallback";

/// Which [`authbot_store::PendingLoginRegistry`] backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingBackend {
    /// In-process moka cache. Pending codes are lost on restart.
    #[default]
    Memory,
    /// Rows in the SQLite database.
    Sqlite,
}

impl FromStr for PendingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("expected `memory` or `sqlite`, got `{other}`")),
        }
    }
}

impl std::fmt::Display for PendingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Optional overrides read from the `[authbot]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub callback_host: Option<String>,
    pub bind_addr: Option<String>,
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub code_ttl_secs: Option<u64>,
    pub max_code_attempts: Option<u32>,
    pub pending_backend: Option<PendingBackend>,
    pub poll_timeout_secs: Option<u64>,
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    authbot: FileSettings,
}

impl FileSettings {
    /// Read the `[authbot]` table from `path`. A missing file yields defaults.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::File {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };
        Self::parse(&content).map_err(|reason| ConfigError::File {
            path: path.display().to_string(),
            reason,
        })
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str::<ConfigFile>(content)
            .map(|file| file.authbot)
            .map_err(|e| e.to_string())
    }
}

/// Fully resolved bot configuration.
#[derive(Debug, Clone)]
pub struct AuthBotConfig {
    pub oidc: OidcConfig,
    /// Public base URL of the web server, without trailing slash.
    pub callback_host: String,
    pub bind_addr: String,
    pub port: u16,
    pub telegram_bot_token: Option<String>,
    pub db_path: PathBuf,
    /// Lifetime of an unclaimed magic code.
    pub code_ttl: Duration,
    /// Wrong codes tolerated before the sign-in is abandoned.
    pub max_code_attempts: u32,
    pub pending_backend: PendingBackend,
    pub poll_timeout_secs: u64,
}

impl AuthBotConfig {
    /// Load `.env`, [`DEFAULT_CONFIG_FILE`] and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from(config_file: &Path) -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            tracing::warn!(error = %e, "ignoring unreadable .env file");
        }
        let file = FileSettings::read(config_file)?;
        Self::from_sources(|var| std::env::var(var).ok(), &file)
    }

    /// Build from a variable lookup alone, with no file overrides.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Self::from_sources(lookup, &FileSettings::default())
    }

    pub fn from_sources(
        lookup: impl Fn(&str) -> Option<String>,
        file: &FileSettings,
    ) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let require = |var: &'static str| get(var).ok_or(ConfigError::Missing { var });

        let callback_host = get("AUTHBOT_CALLBACKHOST")
            .or_else(|| file.callback_host.clone())
            .ok_or(ConfigError::Missing {
                var: "AUTHBOT_CALLBACKHOST",
            })?
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&callback_host).map_err(|e| ConfigError::Invalid {
            var: "AUTHBOT_CALLBACKHOST",
            reason: e.to_string(),
        })?;

        let oidc = OidcConfig {
            client_id: require("MICROSOFT_CLIENT_ID")?,
            client_secret: require("MICROSOFT_CLIENT_SECRET")?,
            realm: require("MICROSOFT_REALM")?,
            authority: get("MICROSOFT_AUTHORITY").unwrap_or_else(|| DEFAULT_AUTHORITY.to_string()),
            redirect_uri: format!("{callback_host}{CALLBACK_PATH}"),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            resource: get("MICROSOFT_RESOURCE_GRAPH"),
            refresh_resource: get("MICROSOFT_RESOURCE_CRM"),
        };

        let code_ttl_secs = parse_var(&get, "AUTHBOT_CODE_TTL_SECS")?
            .or(file.code_ttl_secs)
            .unwrap_or(DEFAULT_CODE_TTL_SECS);
        if code_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "AUTHBOT_CODE_TTL_SECS",
                reason: "must be positive".into(),
            });
        }

        let max_code_attempts = parse_var(&get, "AUTHBOT_MAX_CODE_ATTEMPTS")?
            .or(file.max_code_attempts)
            .unwrap_or(DEFAULT_MAX_CODE_ATTEMPTS);
        if max_code_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "AUTHBOT_MAX_CODE_ATTEMPTS",
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            oidc,
            callback_host,
            bind_addr: get("AUTHBOT_BIND_ADDR")
                .or_else(|| file.bind_addr.clone())
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            port: parse_var(&get, "PORT")?
                .or(file.port)
                .unwrap_or(DEFAULT_PORT),
            telegram_bot_token: get("TELEGRAM_BOT_TOKEN"),
            db_path: get("AUTHBOT_DB_PATH")
                .map(PathBuf::from)
                .or_else(|| file.db_path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            code_ttl: Duration::from_secs(code_ttl_secs),
            max_code_attempts,
            pending_backend: parse_var(&get, "AUTHBOT_PENDING_BACKEND")?
                .or(file.pending_backend)
                .unwrap_or_default(),
            poll_timeout_secs: parse_var(&get, "AUTHBOT_POLL_TIMEOUT_SECS")?
                .or(file.poll_timeout_secs)
                .unwrap_or(DEFAULT_POLL_TIMEOUT_SECS),
        })
    }

    /// `host:port` for the web listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Link that starts a browser sign-in for `address`.
    pub fn sign_in_link(&self, address: &ConversationAddress) -> Result<String, AddressError> {
        sign_in_link(&self.callback_host, address)
    }
}

/// `{callback_host}/login?address={urlencoded json}`.
pub fn sign_in_link(
    callback_host: &str,
    address: &ConversationAddress,
) -> Result<String, AddressError> {
    let state = address.to_state()?;
    let encoded: String = url::form_urlencoded::byte_serialize(state.as_bytes()).collect();
    Ok(format!(
        "{}{LOGIN_PATH}?address={encoded}",
        callback_host.trim_end_matches('/')
    ))
}

fn parse_var<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(var)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                var,
                reason: e.to_string(),
            })
        })
        .transpose()
}

// ── tests ────────────────────────────────────────────────────────────
