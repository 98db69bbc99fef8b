use crate::Series;
use rpt_core::Value;
use std::collections::HashMap;
use thiserror::Error;

/// A storage failure is always critical: the caller raises the fault
/// signal and unwinds without touching the engine again.
#[derive(Error, Debug)]
#[error("storage engine failure: {0}")]
pub struct CriticalError(pub String);

/// Seam to the shard storage engine. Implementations are driven under the
/// shards mutex; points for one series arrive in client-submitted order.
pub trait Storage: Send {
    /// Append one point to a series.
    ///
    /// # Errors
    /// Any error is critical and aborts the in-flight apply.
    fn add_point(&mut self, series: &Series, ts: i64, value: &Value) -> Result<(), CriticalError>;
}

/// In-memory shard store. The real shard engine (durable, compacting)
/// plugs in through [`Storage`]; this one backs tests and keeps points
/// per series id in arrival order.
#[derive(Debug, Default)]
pub struct ShardStore {
    points: HashMap<u64, Vec<(i64, Value)>>,
}

impl ShardStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn points(&self, series_id: u64) -> &[(i64, Value)] {
        self.points.get(&series_id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn total_points(&self) -> usize {
        self.points.values().map(Vec::len).sum()
    }
}

impl Storage for ShardStore {
    fn add_point(&mut self, series: &Series, ts: i64, value: &Value) -> Result<(), CriticalError> {
        self.points
            .entry(series.id)
            .or_default()
            .push((ts, value.clone()));
        Ok(())
    }
}
