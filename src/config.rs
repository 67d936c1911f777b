//! A small, validated configuration surface for the defaults a node's
//! connectors and worker pool fall back to when not given an explicit
//! value at the call site.

use std::time::Duration;

use crate::error::{Error, Result};

/// A bounded queue's default `maxsize`, a `get`'s default `refresh_interval`,
/// and a node's default `num_processes`, validated together the same way
/// [`crate::node::NodeBuilder::num_processes`] validates a worker count on
/// its own: bad values are rejected here, at construction, not discovered
/// later at an arbitrary call site.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    default_maxsize: usize,
    default_refresh_interval: Duration,
    default_num_processes: usize,
}

impl Config {
    /// `default_maxsize == 0` means unbounded. `default_refresh_interval`
    /// must be strictly positive and `default_num_processes` at least 1.
    pub fn new(
        default_maxsize: usize,
        default_refresh_interval: Duration,
        default_num_processes: usize,
    ) -> Result<Self> {
        if default_refresh_interval.is_zero() {
            tracing::warn!("rejected config with a zero default_refresh_interval");
            return Err(Error::InvalidArgument(
                "default_refresh_interval must be strictly positive".into(),
            ));
        }
        if default_num_processes == 0 {
            tracing::warn!("rejected config with a zero default_num_processes");
            return Err(Error::InvalidArgument(
                "default_num_processes must be at least 1".into(),
            ));
        }
        Ok(Self { default_maxsize, default_refresh_interval, default_num_processes })
    }

    /// `0` means unbounded.
    pub fn default_maxsize(&self) -> usize {
        self.default_maxsize
    }

    /// The default `get`/`iter_get` refresh interval.
    pub fn default_refresh_interval(&self) -> Duration {
        self.default_refresh_interval
    }

    /// The default worker count for a node's pool.
    pub fn default_num_processes(&self) -> usize {
        self.default_num_processes
    }
}

impl Default for Config {
    /// Unbounded queues, a 100ms `get` refresh interval, and a single
    /// worker per node.
    fn default() -> Self {
        Self {
            default_maxsize: 0,
            default_refresh_interval: Duration::from_millis(100),
            default_num_processes: 1,
        }
    }
}
