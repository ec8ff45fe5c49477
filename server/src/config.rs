//! Server configuration: a YAML file with defaults for every field,
//! validated once at startup.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;
use wagerhall_types::constants::{DEFAULT_PLATFORM_FEE_BPS, MAX_PLATFORM_FEE_BPS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("platform fee must be at most {max} bps (got {value})")]
    InvalidPlatformFee { value: u16, max: u16 },
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// A player who does not act within this window forfeits.
    #[serde(default = "default_turn_timeout_ms")]
    pub turn_timeout_ms: u64,
    /// A match still filling after this window is cancelled and refunded.
    #[serde(default = "default_fill_timeout_ms")]
    pub fill_timeout_ms: u64,
    /// A cancelled or settled match stays queryable this long before it
    /// is dropped from memory. Its ledger entries are kept.
    #[serde(default = "default_retention_ms")]
    pub retention_ms: u64,
    #[serde(default = "default_platform_fee_bps")]
    pub default_platform_fee_bps: u16,
    /// Fixed base for dice seeds; random per match when unset.
    #[serde(default)]
    pub dice_seed: Option<u64>,

    #[serde(default = "default_updates_buffer")]
    pub updates_buffer: usize,
    #[serde(default = "default_payout_queue")]
    pub payout_queue: usize,

    #[serde(default = "default_http_body_limit_bytes")]
    pub http_body_limit_bytes: usize,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub require_origin: bool,

    #[serde(default = "default_ws_outbound_buffer")]
    pub ws_outbound_buffer: usize,
    #[serde(default = "default_ws_send_timeout_ms")]
    pub ws_send_timeout_ms: u64,
    #[serde(default = "default_ws_max_message_bytes")]
    pub ws_max_message_bytes: usize,
    #[serde(default)]
    pub ws_max_connections: Option<usize>,
    #[serde(default)]
    pub ws_max_connections_per_ip: Option<usize>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_turn_timeout_ms() -> u64 {
    60_000
}

fn default_fill_timeout_ms() -> u64 {
    600_000
}

fn default_retention_ms() -> u64 {
    3_600_000
}

fn default_platform_fee_bps() -> u16 {
    DEFAULT_PLATFORM_FEE_BPS
}

fn default_updates_buffer() -> usize {
    1_024
}

fn default_payout_queue() -> usize {
    1_024
}

fn default_http_body_limit_bytes() -> usize {
    64 * 1024
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_ws_outbound_buffer() -> usize {
    256
}

fn default_ws_send_timeout_ms() -> u64 {
    2_000
}

fn default_ws_max_message_bytes() -> usize {
    64 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            turn_timeout_ms: default_turn_timeout_ms(),
            fill_timeout_ms: default_fill_timeout_ms(),
            retention_ms: default_retention_ms(),
            default_platform_fee_bps: default_platform_fee_bps(),
            dice_seed: None,
            updates_buffer: default_updates_buffer(),
            payout_queue: default_payout_queue(),
            http_body_limit_bytes: default_http_body_limit_bytes(),
            allowed_origins: default_allowed_origins(),
            require_origin: false,
            ws_outbound_buffer: default_ws_outbound_buffer(),
            ws_send_timeout_ms: default_ws_send_timeout_ms(),
            ws_max_message_bytes: default_ws_max_message_bytes(),
            ws_max_connections: None,
            ws_max_connections_per_ip: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ValidatedConfig {
    pub addr: SocketAddr,
    pub log_level: Level,
    pub turn_timeout: Duration,
    pub fill_timeout: Duration,
    pub retention: Duration,
    pub default_platform_fee_bps: u16,
    pub dice_seed: Option<u64>,
    pub updates_buffer: usize,
    pub payout_queue: usize,
    pub http_body_limit_bytes: usize,
    pub allowed_origins: Vec<String>,
    pub require_origin: bool,
    pub ws_outbound_buffer: usize,
    pub ws_send_timeout: Duration,
    pub ws_max_message_bytes: usize,
    pub ws_max_connections: Option<usize>,
    pub ws_max_connections_per_ip: Option<usize>,
}

fn ensure_nonzero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero {
            field,
            value: value as u64,
        });
    }
    Ok(())
}

fn nonzero_duration(field: &'static str, millis: u64) -> Result<Duration, ConfigError> {
    if millis == 0 {
        return Err(ConfigError::InvalidNonZero { field, value: 0 });
    }
    Ok(Duration::from_millis(millis))
}

/// `Some(0)` disables a limit.
fn optional_limit(value: Option<usize>) -> Option<usize> {
    value.filter(|limit| *limit > 0)
}

impl Config {
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;
        if self.default_platform_fee_bps > MAX_PLATFORM_FEE_BPS {
            return Err(ConfigError::InvalidPlatformFee {
                value: self.default_platform_fee_bps,
                max: MAX_PLATFORM_FEE_BPS,
            });
        }
        ensure_nonzero("updates_buffer", self.updates_buffer)?;
        ensure_nonzero("payout_queue", self.payout_queue)?;
        ensure_nonzero("http_body_limit_bytes", self.http_body_limit_bytes)?;
        ensure_nonzero("ws_outbound_buffer", self.ws_outbound_buffer)?;
        ensure_nonzero("ws_max_message_bytes", self.ws_max_message_bytes)?;

        Ok(ValidatedConfig {
            addr: SocketAddr::new(self.host, self.port),
            log_level,
            turn_timeout: nonzero_duration("turn_timeout_ms", self.turn_timeout_ms)?,
            fill_timeout: nonzero_duration("fill_timeout_ms", self.fill_timeout_ms)?,
            retention: nonzero_duration("retention_ms", self.retention_ms)?,
            default_platform_fee_bps: self.default_platform_fee_bps,
            dice_seed: self.dice_seed,
            updates_buffer: self.updates_buffer,
            payout_queue: self.payout_queue,
            http_body_limit_bytes: self.http_body_limit_bytes,
            allowed_origins: self.allowed_origins,
            require_origin: self.require_origin,
            ws_outbound_buffer: self.ws_outbound_buffer,
            ws_send_timeout: nonzero_duration("ws_send_timeout_ms", self.ws_send_timeout_ms)?,
            ws_max_message_bytes: self.ws_max_message_bytes,
            ws_max_connections: optional_limit(self.ws_max_connections),
            ws_max_connections_per_ip: optional_limit(self.ws_max_connections_per_ip),
        })
    }
}
