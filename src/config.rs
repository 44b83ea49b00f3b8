use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::auth::StaticCredentials;
use crate::http::mime::MimeMap;
use crate::http::segment::{DEFAULT_PAYLOAD_SIZE, DEFAULT_SEGMENT_COUNT, SegmentPool};
use crate::server::{
    MAX_HEADER_FIELD, MAX_RESOURCE, MIN_HEAD_SEGMENT, NONCE_COUNT, ServerSettings,
};

/// Names a YAML file to load instead of the defaults.
pub const CONFIG_ENV: &str = "TINYHTTPD_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub timeouts: TimeoutConfig,
    pub pool: PoolConfig,
    pub limits: LimitsConfig,
    /// Extension maps consulted before the built-in MIME types
    pub mime: Vec<MimeMap>,
    pub auth: Option<StaticCredentials>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Directory resources are served from
    pub root: PathBuf,
    pub backlog: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            root: PathBuf::from("www"),
            backlog: 5,
        }
    }
}

/// Timeouts in seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub accept: u64,
    pub receive: u64,
    pub send: u64,
    pub disconnect: u64,
    pub nonce: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            accept: 10,
            receive: 10,
            send: 10,
            disconnect: 10,
            nonce: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub payload_size: usize,
    pub segment_count: usize,
    pub min_head_segment: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            payload_size: DEFAULT_PAYLOAD_SIZE,
            segment_count: DEFAULT_SEGMENT_COUNT,
            min_head_segment: MIN_HEAD_SEGMENT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_resource: usize,
    pub max_header_field: usize,
    pub nonce_count: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_resource: MAX_RESOURCE,
            max_header_field: MAX_HEADER_FIELD,
            nonce_count: NONCE_COUNT,
        }
    }
}

impl Config {
    /// Defaults, or the YAML file named by `TINYHTTPD_CONFIG`, then the
    /// `LISTEN` override.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {path}"))?;
                Self::from_yaml(&text).with_context(|| format!("parsing config file {path}"))?
            }
            Err(_) => Self::default(),
        };

        if let Ok(listen_addr) = std::env::var("LISTEN") {
            cfg.server.listen_addr = listen_addr;
        }
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn settings(&self) -> ServerSettings {
        ServerSettings {
            accept_timeout: Duration::from_secs(self.timeouts.accept),
            receive_timeout: Duration::from_secs(self.timeouts.receive),
            send_timeout: Duration::from_secs(self.timeouts.send),
            disconnect_timeout: Duration::from_secs(self.timeouts.disconnect),
            nonce_timeout: Duration::from_secs(self.timeouts.nonce),
            min_head_segment: self.pool.min_head_segment,
            max_resource: self.limits.max_resource,
            max_header_field: self.limits.max_header_field,
            nonce_count: self.limits.nonce_count,
        }
    }

    pub fn segment_pool(&self) -> SegmentPool {
        SegmentPool::new(self.pool.payload_size, self.pool.segment_count)
    }
}
