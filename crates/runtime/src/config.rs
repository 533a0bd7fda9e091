//! Runtime configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

/// What the processor does after a handler fails for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop delivering events to the key; later events for it are dropped.
    #[default]
    HaltKey,
    /// Record the failure and continue with the key's next event.
    Skip,
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "halt" | "halt-key" => Ok(Self::HaltKey),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown error policy {other:?}")),
        }
    }
}

/// Runtime configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `VIEW_CHANNEL_CAPACITY`: buffered events per key worker (default: `64`)
/// - `VIEW_ERROR_POLICY`: `halt` or `skip` (default: `halt`)
/// - `VIEW_WORKER_IDLE_MS`: idle time after which a key worker retires (default: `30000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub channel_capacity: usize,
    pub error_policy: ErrorPolicy,
    pub worker_idle_timeout: Duration,
    pub log_level: String,
}

impl RuntimeConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let channel_capacity = match lookup("VIEW_CHANNEL_CAPACITY").map(|v| v.parse::<usize>()) {
            Some(Ok(capacity)) if capacity > 0 => capacity,
            Some(_) => {
                tracing::warn!("invalid VIEW_CHANNEL_CAPACITY, using default");
                defaults.channel_capacity
            }
            None => defaults.channel_capacity,
        };

        let error_policy = match lookup("VIEW_ERROR_POLICY").map(|v| v.parse::<ErrorPolicy>()) {
            Some(Ok(policy)) => policy,
            Some(Err(reason)) => {
                tracing::warn!(%reason, "invalid VIEW_ERROR_POLICY, using default");
                defaults.error_policy
            }
            None => defaults.error_policy,
        };

        let worker_idle_timeout = match lookup("VIEW_WORKER_IDLE_MS").map(|v| v.parse::<u64>()) {
            Some(Ok(millis)) if millis > 0 => Duration::from_millis(millis),
            Some(_) => {
                tracing::warn!("invalid VIEW_WORKER_IDLE_MS, using default");
                defaults.worker_idle_timeout
            }
            None => defaults.worker_idle_timeout,
        };

        Self {
            channel_capacity,
            error_policy,
            worker_idle_timeout,
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            error_policy: ErrorPolicy::HaltKey,
            worker_idle_timeout: Duration::from_secs(30),
            log_level: "info".to_string(),
        }
    }
}
