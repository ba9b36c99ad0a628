//! Typed configuration surface. Loading mechanics (env
//! files, CLI flags) are out of core scope; the shape itself is not.

use std::env;
use weft_core::work::WorkCoordinatorConfig;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub work: WorkCoordinatorConfig,
    pub heartbeat_interval_ms: u64,
    pub stats_interval_ms: u64,
    pub list_limit_max: usize,
    pub bus_subject_root: String,
    pub bearer_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            work: WorkCoordinatorConfig::default(),
            heartbeat_interval_ms: 30_000,
            stats_interval_ms: 30_000,
            list_limit_max: weft_core::cursor::HTTP_LIST_LIMIT_MAX,
            bus_subject_root: "weft".to_string(),
            bearer_token: None,
        }
    }
}

impl Config {
    /// Reads overrides from the environment; any unset variable keeps the
    /// default. No file/CLI parsing lives here — that's out of scope for
    /// this deployment profile.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("WEFT_BIND_ADDR") {
            cfg.bind_addr = v;
        }
        if let Ok(v) = env::var("WEFT_STALE_THRESHOLD_MS") {
            if let Ok(n) = v.parse() {
                cfg.work.stale_threshold_ms = n;
            }
        }
        if let Ok(v) = env::var("WEFT_CLEANUP_INTERVAL_MS") {
            if let Ok(n) = v.parse() {
                cfg.work.cleanup_interval_ms = n;
            }
        }
        if let Ok(v) = env::var("WEFT_AUTH_TOKEN") {
            cfg.bearer_token = Some(v);
        }
        cfg
    }
}
