//! Configuration management
//!
//! Configuration is read from `config.yml` and can be overridden through
//! environment variables. Missing optional values fall back to defaults.
//!
//! Besides the `PORTCULLIS_*` variables, the conventional names
//! `SESSION_SECRET`, `FB_APP_CLIENT_ID`, `FB_APP_CLIENT_SECRET` and
//! `CALLBACK_URL` are honoured so existing deployments keep working.

use serde::{Deserialize, Serialize};

/// Longest session lifetime `validate` accepts (one year)
pub const MAX_SESSION_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Credential store configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session and cookie configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Facebook login configuration
    #[serde(default)]
    pub facebook: FacebookConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/portcullis.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// How the session serializer rebuilds the request user from a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeserializeMode {
    /// Hand back the stored record as-is (no database round-trip)
    #[default]
    Trust,
    /// Reload local users from the credential store on every request
    Refetch,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Cookie name; change it when several apps share one host
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Secret used to sign the session cookie (required)
    #[serde(default)]
    pub secret: Option<String>,
    /// Session lifetime in seconds, measured from the last write
    #[serde(default = "default_session_ttl")]
    pub ttl_seconds: i64,
    /// Add the `Secure` attribute to the cookie
    #[serde(default)]
    pub secure_cookie: bool,
    /// Keep ancillary session data (flash messages, pending logins) on logout
    #[serde(default)]
    pub keep_session_info: bool,
    /// Trust the stored record or refetch the user on each request
    #[serde(default)]
    pub deserialize: DeserializeMode,
    /// Upper bound on concurrently stored logged-in sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u64,
    /// Lifetime of sessions without a user (flash messages, pending logins)
    #[serde(default = "default_anonymous_ttl")]
    pub anonymous_ttl_seconds: i64,
    /// Upper bound on concurrently stored sessions without a user
    #[serde(default = "default_max_anonymous_sessions")]
    pub max_anonymous_sessions: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            secret: None,
            ttl_seconds: default_session_ttl(),
            secure_cookie: false,
            keep_session_info: false,
            deserialize: DeserializeMode::default(),
            max_sessions: default_max_sessions(),
            anonymous_ttl_seconds: default_anonymous_ttl(),
            max_anonymous_sessions: default_max_anonymous_sessions(),
        }
    }
}

fn default_cookie_name() -> String {
    "portcullis.sid".to_string()
}

fn default_session_ttl() -> i64 {
    60 * 60 // 1 hour
}

fn default_max_sessions() -> u64 {
    100_000
}

fn default_anonymous_ttl() -> i64 {
    10 * 60
}

fn default_max_anonymous_sessions() -> u64 {
    10_000
}

/// Facebook OAuth configuration
///
/// The federated strategy is only registered when both the client id and
/// the client secret are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacebookConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Redirect target registered with the provider
    #[serde(default = "default_callback_url")]
    pub callback_url: String,
    #[serde(default = "default_facebook_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_facebook_token_url")]
    pub token_url: String,
    /// Graph API endpoint returning the user's profile
    #[serde(default = "default_facebook_profile_url")]
    pub profile_url: String,
    #[serde(default = "default_facebook_scopes")]
    pub scopes: Vec<String>,
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            callback_url: default_callback_url(),
            auth_url: default_facebook_auth_url(),
            token_url: default_facebook_token_url(),
            profile_url: default_facebook_profile_url(),
            scopes: default_facebook_scopes(),
        }
    }
}

impl FacebookConfig {
    /// Whether enough credentials are present to talk to the provider
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.client_id) && present(&self.client_secret)
    }
}

fn default_callback_url() -> String {
    "http://localhost:3000/auth/facebook/callback".to_string()
}

fn default_facebook_auth_url() -> String {
    "https://www.facebook.com/v19.0/dialog/oauth".to_string()
}

fn default_facebook_token_url() -> String {
    "https://graph.facebook.com/v19.0/oauth/access_token".to_string()
}

fn default_facebook_profile_url() -> String {
    "https://graph.facebook.com/me?fields=id,name".to_string()
}

fn default_facebook_scopes() -> Vec<String> {
    vec!["public_profile".to_string()]
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing or empty file yields the default configuration; invalid
    /// YAML is an error that carries the offending location.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        Ok(config)
    }

    /// Load configuration from file, then apply environment overrides
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject configurations the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.session.secret.as_deref() {
            Some(secret) if !secret.trim().is_empty() => {}
            _ => {
                return Err(ConfigError::ValidationError(
                    "session.secret (or SESSION_SECRET) must be set".to_string(),
                ))
            }
        }
        for (key, ttl) in [
            ("session.ttl_seconds", self.session.ttl_seconds),
            ("session.anonymous_ttl_seconds", self.session.anonymous_ttl_seconds),
        ] {
            if !(1..=MAX_SESSION_TTL_SECONDS).contains(&ttl) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be between 1 and {}",
                    key, MAX_SESSION_TTL_SECONDS
                )));
            }
        }
        if self.session.cookie_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "session.cookie_name cannot be empty".to_string(),
            ));
        }
        if !self.session.cookie_name.bytes().all(is_cookie_token_byte) {
            return Err(ConfigError::ValidationError(format!(
                "session.cookie_name {:?} may only contain RFC 6265 token characters",
                self.session.cookie_name
            )));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("PORTCULLIS_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PORTCULLIS_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(driver) = std::env::var("PORTCULLIS_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("PORTCULLIS_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(name) = std::env::var("PORTCULLIS_SESSION_COOKIE_NAME") {
            self.session.cookie_name = name;
        }
        if let Some(secret) = env_any(&["PORTCULLIS_SESSION_SECRET", "SESSION_SECRET"]) {
            self.session.secret = Some(secret);
        }
        if let Ok(ttl) = std::env::var("PORTCULLIS_SESSION_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                self.session.ttl_seconds = ttl;
            }
        }
        if let Ok(ttl) = std::env::var("PORTCULLIS_SESSION_ANONYMOUS_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                self.session.anonymous_ttl_seconds = ttl;
            }
        }
        if let Ok(mode) = std::env::var("PORTCULLIS_SESSION_DESERIALIZE") {
            match mode.to_lowercase().as_str() {
                "trust" => self.session.deserialize = DeserializeMode::Trust,
                "refetch" => self.session.deserialize = DeserializeMode::Refetch,
                _ => {}
            }
        }

        if let Some(id) = env_any(&["PORTCULLIS_FACEBOOK_CLIENT_ID", "FB_APP_CLIENT_ID"]) {
            self.facebook.client_id = Some(id);
        }
        if let Some(secret) = env_any(&["PORTCULLIS_FACEBOOK_CLIENT_SECRET", "FB_APP_CLIENT_SECRET"]) {
            self.facebook.client_secret = Some(secret);
        }
        if let Some(url) = env_any(&["PORTCULLIS_FACEBOOK_CALLBACK_URL", "CALLBACK_URL"]) {
            self.facebook.callback_url = url;
        }
    }
}

/// Visible ASCII other than the HTTP separators
fn is_cookie_token_byte(b: u8) -> bool {
    b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
}

/// First set variable among `names`
fn env_any(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| std::env::var(name).ok())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    match e.location() {
        Some(location) => format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        ),
        None => e.to_string(),
    }
}

// Environment-mutating tests share this lock.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn session_config_strategy() -> impl Strategy<Value = SessionConfig> {
        (
            "[a-z][a-z0-9._-]{0,15}",
            prop::option::of("[a-zA-Z0-9]{8,32}"),
            1i64..=86_400,
            any::<bool>(),
            any::<bool>(),
            prop_oneof![Just(DeserializeMode::Trust), Just(DeserializeMode::Refetch)],
        )
            .prop_map(
                |(cookie_name, secret, ttl_seconds, secure_cookie, keep_session_info, deserialize)| {
                    SessionConfig {
                        cookie_name,
                        secret,
                        ttl_seconds,
                        secure_cookie,
                        keep_session_info,
                        deserialize,
                        max_sessions: 1_000,
                        anonymous_ttl_seconds: 600,
                        max_anonymous_sessions: 100,
                    }
                },
            )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Serialising a session section to YAML and loading it back keeps every field.
        #[test]
        fn session_config_survives_yaml(session in session_config_strategy(), port in 1u16..=65535) {
            let config = Config {
                server: ServerConfig { host: "127.0.0.1".to_string(), port },
                session: session.clone(),
                ..Config::default()
            };
            let yaml = serde_yaml::to_string(&config).expect("serialize config");
            let mut file = NamedTempFile::new().expect("temp file");
            write!(file, "{}", yaml).expect("write config");

            let parsed = Config::load(file.path()).expect("parse config");

            prop_assert_eq!(parsed.server.port, port);
            prop_assert_eq!(parsed.session.cookie_name, session.cookie_name);
            prop_assert_eq!(parsed.session.secret, session.secret);
            prop_assert_eq!(parsed.session.ttl_seconds, session.ttl_seconds);
            prop_assert_eq!(parsed.session.secure_cookie, session.secure_cookie);
            prop_assert_eq!(parsed.session.keep_session_info, session.keep_session_info);
            prop_assert_eq!(parsed.session.deserialize, session.deserialize);
        }
    }
}
