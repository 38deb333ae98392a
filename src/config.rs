//! Configuration module for PulseCheck.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "pulsecheck.db")
    pub db_path: String,
    /// Scheduler tick cadence in seconds (default: 5)
    pub tick_secs: u64,
    /// Probe timeout in milliseconds (default: 5000)
    pub probe_timeout_ms: u64,
    /// Number of checks retained per application (default: 1000)
    pub retention_keep: u32,
    /// Retention sweep cadence in seconds (default: 3600)
    pub retention_sweep_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "pulsecheck.db".to_string(),
            tick_secs: 5,
            probe_timeout_ms: 5000,
            retention_keep: 1000,
            retention_sweep_secs: 3600,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PULSECHECK_HTTP_PORT`: HTTP port (default: 8080)
    /// - `PULSECHECK_DB_PATH`: Database file path (default: "pulsecheck.db")
    /// - `PULSECHECK_TICK_SECS`: Scheduler tick cadence (default: 5)
    /// - `PULSECHECK_PROBE_TIMEOUT_MS`: Probe timeout (default: 5000)
    /// - `PULSECHECK_RETENTION_KEEP`: Checks kept per application (default: 1000)
    /// - `PULSECHECK_RETENTION_SWEEP_SECS`: Sweep cadence (default: 3600)
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("PULSECHECK_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Ok(db_path) = env::var("PULSECHECK_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Ok(tick_str) = env::var("PULSECHECK_TICK_SECS") {
            if let Ok(tick) = tick_str.parse::<u64>() {
                if tick > 0 {
                    cfg.tick_secs = tick;
                }
            }
        }

        if let Ok(timeout_str) = env::var("PULSECHECK_PROBE_TIMEOUT_MS") {
            if let Ok(timeout) = timeout_str.parse::<u64>() {
                if timeout > 0 {
                    cfg.probe_timeout_ms = timeout;
                }
            }
        }

        if let Ok(keep_str) = env::var("PULSECHECK_RETENTION_KEEP") {
            if let Ok(keep) = keep_str.parse::<u32>() {
                if keep > 0 {
                    cfg.retention_keep = keep;
                }
            }
        }

        if let Ok(sweep_str) = env::var("PULSECHECK_RETENTION_SWEEP_SECS") {
            if let Ok(sweep) = sweep_str.parse::<u64>() {
                if sweep > 0 {
                    cfg.retention_sweep_secs = sweep;
                }
            }
        }

        cfg
    }

    /// Probe timeout as a `Duration`.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Scheduler tick cadence as a `Duration`.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Retention sweep cadence as a `Duration`.
    pub fn retention_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention_sweep_secs)
    }
}
