//! Configuration for auth sessions and the command-line client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default session name, used as the prefix of the persisted state key.
pub const DEFAULT_SESSION_NAME: &str = "angular";

/// Default path the session navigates to when credentials are needed.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Default path the session navigates to after a successful login.
pub const DEFAULT_POST_LOGIN_PATH: &str = "/";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default authentication server.
const DEFAULT_HOST: &str = "http://localhost:8080";

/// Immutable settings fixed when an auth session is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSessionConfig {
    /// Prefix of the persisted state key.
    #[serde(default = "default_session_name")]
    pub session_name: String,
    /// Path to redirect to when a login is required.
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Path to redirect to after login when no prior path was recorded.
    #[serde(default = "default_post_login_path")]
    pub default_post_login_path: String,
    /// Endpoint notified on logout. No request is sent when unset.
    #[serde(default)]
    pub logout_url: Option<String>,
}

fn default_session_name() -> String {
    DEFAULT_SESSION_NAME.to_string()
}

fn default_login_path() -> String {
    DEFAULT_LOGIN_PATH.to_string()
}

fn default_post_login_path() -> String {
    DEFAULT_POST_LOGIN_PATH.to_string()
}

impl Default for AuthSessionConfig {
    fn default() -> Self {
        Self {
            session_name: default_session_name(),
            login_path: default_login_path(),
            default_post_login_path: default_post_login_path(),
            logout_url: None,
        }
    }
}

impl AuthSessionConfig {
    /// Key under which the session state blob is persisted.
    pub fn storage_key(&self, auth_type: &str) -> String {
        format!("{}-{}", self.session_name, auth_type)
    }

    /// Override the session name.
    pub fn with_session_name(mut self, session_name: impl Into<String>) -> Self {
        self.session_name = session_name.into();
        self
    }

    /// Override the login path.
    pub fn with_login_path(mut self, login_path: impl Into<String>) -> Self {
        self.login_path = login_path.into();
        self
    }

    /// Override the post-login path.
    pub fn with_default_post_login_path(mut self, path: impl Into<String>) -> Self {
        self.default_post_login_path = path.into();
        self
    }

    /// Set the logout endpoint.
    pub fn with_logout_url(mut self, logout_url: impl Into<String>) -> Self {
        self.logout_url = Some(logout_url.into());
        self
    }
}

/// Client configuration loaded from `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL of the authentication server.
    #[serde(default = "default_host")]
    pub host: String,
    /// OAuth client id for the password grant.
    #[serde(default)]
    pub client_id: String,
    /// OAuth client secret for the password grant.
    #[serde(default)]
    pub client_secret: String,
    /// Session settings.
    #[serde(default)]
    pub session: AuthSessionConfig,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            host: default_host(),
            client_id: String::new(),
            client_secret: String::new(),
            session: AuthSessionConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the config file if present, falling back to
    /// defaults, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("AUTH_SESSION_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(host) = std::env::var("AUTH_SESSION_HOST") {
            self.host = host;
        }
    }

    /// Get the authentication server as a parsed URL.
    pub fn host_url(&self) -> CoreResult<Url> {
        let url = Url::parse(&self.host)?;
        if url.cannot_be_a_base() {
            return Err(CoreError::Config(format!(
                "host must be an absolute base URL: {}",
                self.host
            )));
        }
        Ok(url)
    }
}
