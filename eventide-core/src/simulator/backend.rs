//! Synchronization backends.

use crate::time::Time;

/// How a simulator instance relates to other partitions.
///
/// The sequential backend runs alone and places no bound on how far ahead
/// it may advance. The conservative backend belongs to a partitioned run:
/// it carries its partition id and a lookahead window that callers may only
/// narrow. The synchronization protocol between partitions lives outside
/// the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SyncMode {
    /// Single partition, no lookahead constraint
    #[default]
    Sequential,
    /// One partition of a conservatively synchronized run
    Conservative {
        /// Partition id
        system_id: u32,
        /// Window ahead of the global minimum this partition may run
        lookahead: Time,
    },
}

impl SyncMode {
    /// Partition id; zero when sequential.
    pub fn system_id(&self) -> u32 {
        match self {
            SyncMode::Sequential => 0,
            SyncMode::Conservative { system_id, .. } => *system_id,
        }
    }

    /// Current lookahead; [`Time::MAX`] when sequential.
    pub fn lookahead(&self) -> Time {
        match self {
            SyncMode::Sequential => Time::MAX,
            SyncMode::Conservative { lookahead, .. } => *lookahead,
        }
    }

    /// Narrows the lookahead to `bound` if it is smaller. No-op when
    /// sequential.
    pub fn bound_lookahead(&mut self, bound: Time) {
        if let SyncMode::Conservative { lookahead, .. } = self {
            *lookahead = (*lookahead).min(bound);
        }
    }
}
