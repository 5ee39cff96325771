//! Session configuration.
//!
//! DESIGN
//! ======
//! `SessionConfig` is fixed for the lifetime of a `CollabClient`: it is moved
//! into the session task at `initialize` and never mutated. It can be built in
//! code (`SessionConfig::new` + `with_*`) or read from `COLLAB_*` environment
//! variables, where every tunable falls back to its default when unset or
//! unparsable.
//!
//! The auth token is never printed: `Debug` redacts it, and diagnostics go
//! through `DebugInfo` which does the same.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use frames::UserInfo;
use serde::{Deserialize, Serialize};

pub const DEFAULT_AUTO_RECONNECT: bool = true;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_RECONNECT_JITTER: Duration = Duration::from_millis(1000);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CURSOR_THROTTLE: Duration = Duration::from_millis(50);
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Placeholder shown wherever the credential would otherwise appear.
pub const REDACTED: &str = "[redacted]";

const ENV_SERVER_URL: &str = "COLLAB_SERVER_URL";
const ENV_TOKEN: &str = "COLLAB_TOKEN";
const ENV_USER_ID: &str = "COLLAB_USER_ID";
const ENV_USER_NAME: &str = "COLLAB_USER_NAME";
const ENV_USER_AVATAR: &str = "COLLAB_USER_AVATAR";

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),
    #[error("server url is empty")]
    EmptyServerUrl,
    #[error("server url must use ws:// or wss://, got {0}")]
    InvalidScheme(String),
    #[error("local user id is empty")]
    EmptyUserId,
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

// =============================================================================
// LOCAL USER
// =============================================================================

/// Identity of the user driving this session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
}

impl LocalUser {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar: None,
        }
    }

    #[must_use]
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    /// Wire form used in `auth` and `join` frames.
    #[must_use]
    pub fn to_user_info(&self) -> UserInfo {
        UserInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            color: None,
            role: None,
        }
    }
}

// =============================================================================
// SESSION CONFIG
// =============================================================================

#[derive(Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint, `ws://` or `wss://`.
    pub server_url: String,
    /// Credential sent in the `auth` handshake.
    pub auth_token: String,
    pub user: LocalUser,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    /// Base delay for the first reconnect attempt; doubles per attempt.
    pub reconnect_delay: Duration,
    /// Upper bound on any single reconnect delay.
    pub max_reconnect_delay: Duration,
    /// Largest random amount added to a reconnect delay.
    pub reconnect_jitter: Duration,
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
    /// Minimum spacing between cursor frames.
    pub cursor_throttle: Duration,
    /// Buffer size of the lifecycle event channel.
    pub event_capacity: usize,
}

impl SessionConfig {
    pub fn new(server_url: impl Into<String>, auth_token: impl Into<String>, user: LocalUser) -> Self {
        Self {
            server_url: server_url.into(),
            auth_token: auth_token.into(),
            user,
            auto_reconnect: DEFAULT_AUTO_RECONNECT,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_delay: DEFAULT_MAX_RECONNECT_DELAY,
            reconnect_jitter: DEFAULT_RECONNECT_JITTER,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            cursor_throttle: DEFAULT_CURSOR_THROTTLE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Load config from `COLLAB_*` environment variables.
    ///
    /// # Errors
    ///
    /// Fails when `COLLAB_SERVER_URL`, `COLLAB_TOKEN` or `COLLAB_USER_ID` is
    /// unset, or when the resulting config does not pass [`Self::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load config through an arbitrary key lookup (environment, test map).
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingEnv(key))
        };
        let server_url = required(ENV_SERVER_URL)?;
        let auth_token = required(ENV_TOKEN)?;
        let user_id = required(ENV_USER_ID)?;
        let user_name = lookup(ENV_USER_NAME).unwrap_or_else(|| user_id.clone());
        let mut user = LocalUser::new(user_id, user_name);
        user.avatar = lookup(ENV_USER_AVATAR).filter(|v| !v.is_empty());

        let config = Self {
            server_url,
            auth_token,
            user,
            auto_reconnect: env_parse(&lookup, "COLLAB_AUTO_RECONNECT", DEFAULT_AUTO_RECONNECT),
            max_reconnect_attempts: env_parse(
                &lookup,
                "COLLAB_MAX_RECONNECT_ATTEMPTS",
                DEFAULT_MAX_RECONNECT_ATTEMPTS,
            ),
            reconnect_delay: env_millis(&lookup, "COLLAB_RECONNECT_DELAY_MS", DEFAULT_RECONNECT_DELAY),
            max_reconnect_delay: env_millis(
                &lookup,
                "COLLAB_MAX_RECONNECT_DELAY_MS",
                DEFAULT_MAX_RECONNECT_DELAY,
            ),
            reconnect_jitter: env_millis(&lookup, "COLLAB_RECONNECT_JITTER_MS", DEFAULT_RECONNECT_JITTER),
            heartbeat_interval: env_millis(
                &lookup,
                "COLLAB_HEARTBEAT_INTERVAL_MS",
                DEFAULT_HEARTBEAT_INTERVAL,
            ),
            connect_timeout: env_millis(&lookup, "COLLAB_CONNECT_TIMEOUT_MS", DEFAULT_CONNECT_TIMEOUT),
            cursor_throttle: env_millis(&lookup, "COLLAB_CURSOR_THROTTLE_MS", DEFAULT_CURSOR_THROTTLE),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the session relies on.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.server_url.trim();
        if url.is_empty() {
            return Err(ConfigError::EmptyServerUrl);
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::InvalidScheme(url.to_owned()));
        }
        if self.user.id.trim().is_empty() {
            return Err(ConfigError::EmptyUserId);
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("heartbeat interval"));
        }
        if self.cursor_throttle.is_zero() {
            return Err(ConfigError::ZeroInterval("cursor throttle"));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ZeroInterval("connect timeout"));
        }
        Ok(())
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl SessionConfig {
    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_delay = base;
        self.max_reconnect_delay = max;
        self
    }

    #[must_use]
    pub fn with_reconnect_jitter(mut self, jitter: Duration) -> Self {
        self.reconnect_jitter = jitter;
        self
    }

    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cursor_throttle(mut self, interval: Duration) -> Self {
        self.cursor_throttle = interval;
        self
    }

    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("server_url", &self.server_url)
            .field("auth_token", &REDACTED)
            .field("user", &self.user)
            .field("auto_reconnect", &self.auto_reconnect)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_delay", &self.max_reconnect_delay)
            .field("reconnect_jitter", &self.reconnect_jitter)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("connect_timeout", &self.connect_timeout)
            .field("cursor_throttle", &self.cursor_throttle)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn env_parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_millis(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
