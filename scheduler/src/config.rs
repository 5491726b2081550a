//! Runtime configuration of the scheduler.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use txsched_common::config::{SCHEDULE_TIMEOUT, SCHEDULE_WITH_DAG_TIMEOUT};

lazy_static! {
    /// Default worker pool capacity, four workers per logical CPU
    pub static ref DEFAULT_POOL_CAPACITY: usize = num_cpus::get() * 4;
}

/// Outcomes per conflict window
pub const DEFAULT_ADJUST_WINDOW_SIZE: usize = 500;
/// Batches smaller than `window * min_adjust_times` keep a fixed pool size
pub const DEFAULT_MIN_ADJUST_TIMES: usize = 10;
/// Conflict ratio above which the pool size is halved
pub const DEFAULT_CONFLICT_THRESHOLD_PERCENT: u8 = 50;

fn default_pool_capacity() -> usize {
    *DEFAULT_POOL_CAPACITY
}

const fn default_schedule_timeout_ms() -> u64 {
    SCHEDULE_TIMEOUT.as_millis() as u64
}

const fn default_schedule_with_dag_timeout_ms() -> u64 {
    SCHEDULE_WITH_DAG_TIMEOUT.as_millis() as u64
}

const fn default_adjust_window_size() -> usize {
    DEFAULT_ADJUST_WINDOW_SIZE
}

const fn default_min_adjust_times() -> usize {
    DEFAULT_MIN_ADJUST_TIMES
}

const fn default_conflict_threshold_percent() -> u8 {
    DEFAULT_CONFLICT_THRESHOLD_PERCENT
}

/// Scheduler configuration, passed to `TxScheduler::new`.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of txs executing at the same time.
    #[clap(name = "scheduler-pool-capacity", long, default_value_t = default_pool_capacity())]
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,

    /// Wall-clock budget of a proposer schedule, in milliseconds.
    ///
    /// When it expires the txs applied so far are kept and the rest are
    /// left out of the block.
    #[clap(name = "scheduler-timeout-ms", long, default_value_t = default_schedule_timeout_ms())]
    #[serde(default = "default_schedule_timeout_ms")]
    pub schedule_timeout_ms: u64,

    /// Wall-clock budget of a block verification, in milliseconds.
    #[clap(name = "scheduler-dag-timeout-ms", long, default_value_t = default_schedule_with_dag_timeout_ms())]
    #[serde(default = "default_schedule_with_dag_timeout_ms")]
    pub schedule_with_dag_timeout_ms: u64,

    /// Number of apply outcomes observed before resizing the pool.
    #[clap(name = "scheduler-adjust-window-size", long, default_value_t = default_adjust_window_size())]
    #[serde(default = "default_adjust_window_size")]
    pub adjust_window_size: usize,

    /// Minimum number of full windows a batch must span for resizing to kick in.
    #[clap(name = "scheduler-min-adjust-times", long, default_value_t = default_min_adjust_times())]
    #[serde(default = "default_min_adjust_times")]
    pub min_adjust_times: usize,

    /// Conflict percentage above which the pool size is halved.
    #[clap(name = "scheduler-conflict-threshold", long, default_value_t = default_conflict_threshold_percent())]
    #[serde(default = "default_conflict_threshold_percent")]
    pub conflict_threshold_percent: u8,

    /// Dump every produced read/write set at debug level.
    #[clap(name = "scheduler-rwset-log", long)]
    #[serde(default)]
    pub enable_rwset_log: bool,

    /// Record scheduler metrics.
    #[clap(name = "scheduler-metrics", long)]
    #[serde(default)]
    pub enable_metrics: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_capacity: default_pool_capacity(),
            schedule_timeout_ms: default_schedule_timeout_ms(),
            schedule_with_dag_timeout_ms: default_schedule_with_dag_timeout_ms(),
            adjust_window_size: DEFAULT_ADJUST_WINDOW_SIZE,
            min_adjust_times: DEFAULT_MIN_ADJUST_TIMES,
            conflict_threshold_percent: DEFAULT_CONFLICT_THRESHOLD_PERCENT,
            enable_rwset_log: false,
            enable_metrics: false,
        }
    }
}

impl SchedulerConfig {
    pub fn schedule_timeout(&self) -> Duration {
        Duration::from_millis(self.schedule_timeout_ms)
    }

    pub fn schedule_with_dag_timeout(&self) -> Duration {
        Duration::from_millis(self.schedule_with_dag_timeout_ms)
    }

    /// Pool capacity, never zero
    pub fn max_pool_size(&self) -> usize {
        self.pool_capacity.max(1)
    }

    /// Smallest batch for which the conflict window may resize the pool
    pub fn min_batch_for_adjust(&self) -> usize {
        self.adjust_window_size.saturating_mul(self.min_adjust_times)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();

        assert_eq!(config.pool_capacity, num_cpus::get() * 4);
        assert_eq!(config.schedule_timeout(), Duration::from_secs(10));
        assert_eq!(config.schedule_with_dag_timeout(), Duration::from_secs(20));
        assert_eq!(config.min_batch_for_adjust(), 5_000);
        assert!(!config.enable_rwset_log);
        assert!(!config.enable_metrics);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"pool_capacity":0,"enable_metrics":true}"#).unwrap();

        assert_eq!(config.max_pool_size(), 1);
        assert_eq!(config.adjust_window_size, DEFAULT_ADJUST_WINDOW_SIZE);
        assert!(config.enable_metrics);
    }
}
