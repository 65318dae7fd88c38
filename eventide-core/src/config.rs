//! Centralized configuration for the kernel.
//!
//! Every tunable lives here. Defaults describe a sequential nanosecond
//! simulator on a binary heap; environment variables can override them.

use thiserror::Error;

use crate::scheduler::SchedulerKind;
use crate::simulator::SyncMode;
use crate::time::Unit;

/// Errors raised by [`KernelConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A size parameter was zero
    #[error("Invalid configuration: {field} must be greater than zero")]
    ZeroSize {
        /// Name of the offending field
        field: &'static str,
    },

    /// Automatic stop scheduled in the past
    #[error("Invalid configuration: stop_after_ns {nanos} is negative")]
    NegativeStop {
        /// Rejected delay in nanoseconds
        nanos: i64,
    },
}

/// Central configuration for all eventide components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KernelConfig {
    /// Time resolution
    pub time: TimeConfig,
    /// Event queue
    pub scheduler: SchedulerConfig,
    /// Event loop
    pub run: RunConfig,
    /// File-descriptor readers
    pub reader: ReaderConfig,
}

/// Virtual-time settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeConfig {
    /// Length of one tick, fixed process-wide on first use
    pub resolution: Unit,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            resolution: Unit::Nanos,
        }
    }
}

/// Event queue settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchedulerConfig {
    /// Ordering backend
    pub kind: SchedulerKind,
    /// Initial bucket count when `kind` is the calendar queue
    pub calendar_buckets: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            kind: SchedulerKind::Heap,
            calendar_buckets: 2,
        }
    }
}

/// Event loop settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunConfig {
    /// Stop automatically this many nanoseconds after start.
    ///
    /// Kept as a raw count so reading the configuration never fixes the
    /// time resolution; `Simulator::with_config` converts it once
    /// `time.resolution` is in effect.
    pub stop_after_ns: Option<i64>,
    /// Synchronization backend
    pub sync: SyncMode,
}

/// File-descriptor reader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReaderConfig {
    /// Bytes requested per read
    pub buffer_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024, // 64 KiB
        }
    }
}

impl KernelConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Values that fail to parse are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(kind) = std::env::var("EVENTIDE_SCHEDULER")
            && let Ok(kind) = kind.parse::<SchedulerKind>()
        {
            config.scheduler.kind = kind;
        }

        if let Ok(unit) = std::env::var("EVENTIDE_RESOLUTION")
            && let Ok(unit) = unit.parse::<Unit>()
        {
            config.time.resolution = unit;
        }

        if let Ok(stop) = std::env::var("EVENTIDE_STOP_AFTER_NS")
            && let Ok(nanos) = stop.parse::<i64>()
        {
            config.run.stop_after_ns = Some(nanos);
        }

        if let Ok(size) = std::env::var("EVENTIDE_READ_BUFFER")
            && let Ok(bytes) = size.parse::<usize>()
        {
            config.reader.buffer_size = bytes;
        }

        config
    }

    /// Small, fast settings for tests: sorted-map scheduler, 4 KiB reads.
    pub fn for_testing() -> Self {
        Self {
            scheduler: SchedulerConfig {
                kind: SchedulerKind::Map,
                ..Default::default()
            },
            reader: ReaderConfig { buffer_size: 4096 },
            ..Default::default()
        }
    }

    /// Checks the values a simulator or reader would reject later.
    ///
    /// # Errors
    ///
    /// - `ConfigError::ZeroSize` - `calendar_buckets` or `buffer_size` is zero
    /// - `ConfigError::NegativeStop` - `stop_after_ns` is negative
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.calendar_buckets == 0 {
            return Err(ConfigError::ZeroSize {
                field: "scheduler.calendar_buckets",
            });
        }
        if self.reader.buffer_size == 0 {
            return Err(ConfigError::ZeroSize {
                field: "reader.buffer_size",
            });
        }
        if let Some(nanos) = self.run.stop_after_ns
            && nanos < 0
        {
            return Err(ConfigError::NegativeStop { nanos });
        }
        Ok(())
    }
}
