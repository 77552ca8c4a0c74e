//! Relay configuration.
//!
//! Read once from the environment at startup and validated before the listener binds.

use std::{str::FromStr, time::Duration};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

const HOST_VAR: &str = "RELAY_HOST";
const PORT_VAR: &str = "RELAY_PORT";
const HEARTBEAT_INTERVAL_VAR: &str = "RELAY_HEARTBEAT_INTERVAL_SECS";
const HEARTBEAT_TIMEOUT_VAR: &str = "RELAY_HEARTBEAT_TIMEOUT_SECS";
const ROOM_BUFFER_VAR: &str = "RELAY_ROOM_BUFFER";
const OUTBOUND_BUFFER_VAR: &str = "RELAY_OUTBOUND_BUFFER";
const HANDSHAKE_TIMEOUT_VAR: &str = "RELAY_HANDSHAKE_TIMEOUT_SECS";

/// Configuration for the relay service.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Address the WebSocket listener binds to.
    pub host: String,

    /// Port the WebSocket listener binds to.
    pub port: u16,

    /// How often every connection is pinged.
    pub heartbeat_interval: Duration,

    /// How long a connection may stay silent before it is closed.
    pub heartbeat_timeout: Duration,

    /// Frames a room buffers for its slowest member before that member starts skipping.
    pub room_buffer: usize,

    /// Frames queued for a single connection's socket writer.
    pub outbound_buffer: usize,

    /// How long a freshly accepted socket may take to complete the WebSocket upgrade.
    pub handshake_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: String::from(DEFAULT_HOST),
            port: DEFAULT_PORT,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            room_buffer: 100,
            outbound_buffer: 100,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl RelayConfig {
    /// Reads the configuration from `RELAY_*` environment variables, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed, or the result is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [RelayConfig::from_env], with variables resolved through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed, or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            host: lookup(HOST_VAR).unwrap_or(defaults.host),
            port: parse_var(&lookup, PORT_VAR)?.unwrap_or(defaults.port),
            heartbeat_interval: parse_var(&lookup, HEARTBEAT_INTERVAL_VAR)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_interval),
            heartbeat_timeout: parse_var(&lookup, HEARTBEAT_TIMEOUT_VAR)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_timeout),
            room_buffer: parse_var(&lookup, ROOM_BUFFER_VAR)?.unwrap_or(defaults.room_buffer),
            outbound_buffer: parse_var(&lookup, OUTBOUND_BUFFER_VAR)?
                .unwrap_or(defaults.outbound_buffer),
            handshake_timeout: parse_var(&lookup, HANDSHAKE_TIMEOUT_VAR)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.handshake_timeout),
        };

        config.validate()?;

        Ok(config)
    }

    /// Sets the listener address.
    #[must_use]
    pub fn with_bind(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Sets the ping period and the idle limit.
    #[must_use]
    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    /// Sets the per-room broadcast buffer.
    #[must_use]
    pub fn with_room_buffer(mut self, room_buffer: usize) -> Self {
        self.room_buffer = room_buffer;
        self
    }

    /// Sets the per-connection outbound queue.
    #[must_use]
    pub fn with_outbound_buffer(mut self, outbound_buffer: usize) -> Self {
        self.outbound_buffer = outbound_buffer;
        self
    }

    /// Sets the upgrade deadline for new sockets.
    #[must_use]
    pub fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    /// `host:port` as accepted by [tokio::net::TcpListener::bind].
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroHeartbeatInterval);
        }

        if self.heartbeat_timeout < self.heartbeat_interval {
            return Err(ConfigError::HeartbeatTimeoutTooShort);
        }

        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::ZeroHandshakeTimeout);
        }

        if self.room_buffer == 0 {
            return Err(ConfigError::EmptyBuffer(ROOM_BUFFER_VAR));
        }

        if self.outbound_buffer == 0 {
            return Err(ConfigError::EmptyBuffer(OUTBOUND_BUFFER_VAR));
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key, value })
        })
        .transpose()
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set to something that does not parse.
    #[error("{key} has an invalid value: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("heartbeat interval must be greater than zero")]
    ZeroHeartbeatInterval,

    #[error("heartbeat timeout must not be shorter than the heartbeat interval")]
    HeartbeatTimeoutTooShort,

    #[error("handshake timeout must be greater than zero")]
    ZeroHandshakeTimeout,

    #[error("{0} must be greater than zero")]
    EmptyBuffer(&'static str),
}
