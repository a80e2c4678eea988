//! Bridge statistics snapshot.

use serde::Serialize;

use crate::time::Timestamp;

/// Lifecycle state of the bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    /// Nothing published yet.
    #[default]
    Init,
    /// Fetching devices and publishing discovery configs.
    Discovering,
    /// Waiting for the hub to echo every config of the current cycle.
    AwaitingConfigAcks,
    /// All configs acknowledged; stale entities retracted.
    Online,
}

/// Counters exposed to observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    /// Entities published in the current cycle.
    pub sensors: usize,
    /// Devices published in the current cycle.
    pub devices: usize,
    /// Time the last inbound message was handled.
    pub last_update: Option<Timestamp>,
    pub state: BridgeState,
}
