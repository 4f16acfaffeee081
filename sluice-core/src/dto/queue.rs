//! Dispatch queue DTOs

use serde::{Deserialize, Serialize};

/// Point-in-time counters of the dispatch queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub running: bool,
    pub workers: usize,
    /// Units buffered and not yet picked up
    pub depth: usize,
    /// Units currently executing
    pub in_flight: usize,
    pub enqueued: u64,
    pub processed: u64,
}
