use rpt_core::PACKER_SUGGESTED_SIZE;
use serde::{Deserialize, Serialize};

/// Resolution of the timestamps a database accepts. The validity range
/// scales with the precision: a database created at millisecond precision
/// rejects a bare epoch-seconds timestamp as out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimePrecision {
    #[serde(rename = "s")]
    Second,
    #[serde(rename = "ms")]
    Millisecond,
    #[serde(rename = "us")]
    Microsecond,
    #[serde(rename = "ns")]
    Nanosecond,
}

impl TimePrecision {
    #[inline]
    #[must_use]
    pub const fn factor(self) -> i64 {
        match self {
            Self::Second => 1,
            Self::Millisecond => 1_000,
            Self::Microsecond => 1_000_000,
            Self::Nanosecond => 1_000_000_000,
        }
    }
}

/// Epoch-seconds ceiling on accepted timestamps (32-bit seconds horizon).
const TS_MAX_SECONDS: i64 = 4_294_967_296;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub db_name: String,
    #[serde(default = "default_server_name")]
    pub server_name: String,
    #[serde(default = "default_time_precision")]
    pub time_precision: TimePrecision,
    /// Base capacity for the per-pool insert buffers, split across pools.
    #[serde(default = "default_insert_buffer_size")]
    pub insert_buffer_size: usize,
    /// How long the dispatcher waits for each peer acknowledgement.
    #[serde(default = "default_peer_ack_timeout_ms")]
    pub peer_ack_timeout_ms: u64,
    /// Capacity of the replica fifo before enqueues start dropping.
    #[serde(default = "default_replica_fifo_capacity")]
    pub replica_fifo_capacity: usize,
}

impl DbConfig {
    #[must_use]
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            server_name: default_server_name(),
            time_precision: default_time_precision(),
            insert_buffer_size: default_insert_buffer_size(),
            peer_ack_timeout_ms: default_peer_ack_timeout_ms(),
            replica_fifo_capacity: default_replica_fifo_capacity(),
        }
    }

    /// Whether `ts` falls inside the database's validity range.
    #[inline]
    #[must_use]
    pub const fn valid_ts(&self, ts: i64) -> bool {
        ts >= 0 && ts < TS_MAX_SECONDS.saturating_mul(self.time_precision.factor())
    }
}

fn default_server_name() -> String {
    "riptide-0".to_owned()
}

const fn default_time_precision() -> TimePrecision {
    TimePrecision::Second
}

const fn default_insert_buffer_size() -> usize {
    PACKER_SUGGESTED_SIZE
}

const fn default_peer_ack_timeout_ms() -> u64 {
    10_000
}

const fn default_replica_fifo_capacity() -> usize {
    1024
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ts_scales_with_precision() {
        let mut config = DbConfig::new("tsdb");
        assert!(config.valid_ts(0));
        assert!(config.valid_ts(1_500_000_000));
        assert!(!config.valid_ts(-1));
        assert!(!config.valid_ts(TS_MAX_SECONDS));

        config.time_precision = TimePrecision::Millisecond;
        assert!(config.valid_ts(1_500_000_000_000));

        config.time_precision = TimePrecision::Nanosecond;
        assert!(config.valid_ts(1_500_000_000_000_000_000));
    }

    #[test]
    fn test_config_defaults_from_minimal_document() {
        let config: DbConfig = serde_json::from_str(r#"{"db_name": "metrics"}"#).unwrap();
        assert_eq!(config.db_name, "metrics");
        assert_eq!(config.time_precision, TimePrecision::Second);
        assert_eq!(config.peer_ack_timeout_ms, 10_000);
    }

    #[test]
    fn test_precision_rename() {
        let config: DbConfig =
            serde_json::from_str(r#"{"db_name": "m", "time_precision": "ms"}"#).unwrap();
        assert_eq!(config.time_precision, TimePrecision::Millisecond);
    }
}
