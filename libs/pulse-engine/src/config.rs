use serde::Deserialize;

use crate::alarm::MissingDataPolicy;
use crate::error::EngineError;
use crate::signals::SignalName;

/// Root configuration — parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct PulseConfig {
    /// HTTP API port.
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Root directory for the file-backed stores (long retention, archive,
    /// quarantine).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Dimension attached to every measurement point.
    #[serde(default = "default_region")]
    pub region: String,

    /// Number of log shards. Records from one source always land on the
    /// same shard, so per-source ordering holds.
    #[serde(default = "default_shards")]
    pub shards: u32,

    /// Ring bound per log shard — the log is a transport, not an archive.
    #[serde(default = "default_log_max_entries")]
    pub log_max_entries: usize,

    /// Entries per dispatcher batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Retries per batch after the first failed attempt, so a batch gets
    /// `max_batch_retries + 1` attempts before it is surfaced as failed.
    #[serde(default = "default_max_batch_retries")]
    pub max_batch_retries: u32,

    /// Per-attempt timeout; a timed-out attempt counts against the retries.
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,

    /// Bounded retry at the measure-store transport before a batch-level
    /// store error is surfaced.
    #[serde(default = "default_store_retry_attempts")]
    pub store_retry_attempts: u32,

    /// Ring bound of the recent-window store.
    #[serde(default = "default_recent_max_points")]
    pub recent_max_points: usize,

    /// Idempotency keys retained by the durable sink. 0 disables dedup and
    /// keeps the at-least-once double-write behavior observable.
    #[serde(default)]
    pub dedup_window: usize,

    /// Alarm evaluation period.
    #[serde(default = "default_evaluation_interval_ms")]
    pub evaluation_interval_ms: u64,

    /// Alarm definitions. Empty list falls back to the default set.
    #[serde(default = "default_alarms")]
    pub alarms: Vec<AlarmConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlarmConfig {
    /// Alarm identifier, used in emitted events.
    pub metric: String,
    /// Operational signal the alarm observes.
    pub signal: SignalName,
    pub threshold: f64,
    /// Consecutive evaluation periods required to flip the state.
    #[serde(default = "default_alarm_periods")]
    pub periods: u32,
    #[serde(default = "default_missing_data")]
    pub missing_data: MissingDataPolicy,
}

fn default_api_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_region() -> String {
    "local".into()
}

fn default_shards() -> u32 {
    1
}

fn default_log_max_entries() -> usize {
    65536
}

fn default_batch_size() -> usize {
    10
}

fn default_max_batch_retries() -> u32 {
    3
}

fn default_batch_timeout_ms() -> u64 {
    30_000
}

fn default_store_retry_attempts() -> u32 {
    3
}

fn default_recent_max_points() -> usize {
    100_000
}

fn default_evaluation_interval_ms() -> u64 {
    60_000
}

fn default_alarm_periods() -> u32 {
    2
}

fn default_missing_data() -> MissingDataPolicy {
    MissingDataPolicy::Breaching
}

/// Default alarm set: consumer error rate and store connection count flip
/// only after two consecutive breaching periods; throttling alarms on the
/// first period. Missing connection data is treated as not breaching.
fn default_alarms() -> Vec<AlarmConfig> {
    vec![
        AlarmConfig {
            metric: "consumer-errors".into(),
            signal: SignalName::ConsumerErrors,
            threshold: 5.0,
            periods: 2,
            missing_data: MissingDataPolicy::Breaching,
        },
        AlarmConfig {
            metric: "store-throttles".into(),
            signal: SignalName::StoreThrottles,
            threshold: 0.0,
            periods: 1,
            missing_data: MissingDataPolicy::Breaching,
        },
        AlarmConfig {
            metric: "store-connections".into(),
            signal: SignalName::StoreConnections,
            threshold: 100.0,
            periods: 2,
            missing_data: MissingDataPolicy::NotBreaching,
        },
    ]
}

impl Default for PulseConfig {
    fn default() -> Self {
        // Serde defaults applied to an empty document.
        Self::parse("").expect("empty config parses")
    }
}

impl PulseConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = PulseConfig::parse("").unwrap();
        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.max_batch_retries, 3);
        assert_eq!(cfg.shards, 1);
        assert_eq!(cfg.dedup_window, 0);
        assert_eq!(cfg.alarms.len(), 3);
    }

    #[test]
    fn alarm_override() {
        let cfg = PulseConfig::parse(
            r#"
            batch_size = 25

            [[alarms]]
            metric = "query-errors"
            signal = "query_errors"
            threshold = 1.0
            periods = 1
            "#,
        )
        .unwrap();
        assert_eq!(cfg.batch_size, 25);
        assert_eq!(cfg.alarms.len(), 1);
        assert_eq!(cfg.alarms[0].periods, 1);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let err = PulseConfig::parse("batch_size = \"ten\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
