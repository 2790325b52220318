//! The handle given to request front ends

use std::collections::BTreeSet;
use std::sync::Arc;

use super::{Command, CommandQueue};
use crate::domain::{Pid, ProbeError};
use crate::probe::ProbeManager;

/// Queue mutations, read state directly
///
/// Reads skip the queue, so a read issued right after an enqueue may not see
/// that command yet.
#[derive(Clone)]
pub struct ControlHandle {
    queue: CommandQueue,
    probe: Arc<ProbeManager>,
}

impl ControlHandle {
    #[must_use]
    pub fn new(queue: CommandQueue, probe: Arc<ProbeManager>) -> Self {
        Self { queue, probe }
    }

    /// Never blocks; a full queue drops the command with a warning
    pub fn enqueue(&self, command: Command) {
        self.queue.enqueue(command);
    }

    /// Decode a JSON command body and enqueue it
    ///
    /// # Errors
    /// Returns the decode error; nothing is enqueued in that case
    pub fn enqueue_json(&self, body: &str) -> Result<(), serde_json::Error> {
        self.enqueue(Command::from_json(body)?);
        Ok(())
    }

    /// # Errors
    /// Returns an error once the probe is stopped or if the map read fails
    pub fn watched_pids(&self) -> Result<BTreeSet<Pid>, ProbeError> {
        self.probe.watched_pids()
    }

    /// # Errors
    /// Returns an error once the probe is stopped or if the map read fails
    pub fn watch_all_state(&self) -> Result<bool, ProbeError> {
        self.probe.watch_all_state()
    }

    /// Commands dropped because the queue was full
    #[must_use]
    pub fn dropped_commands(&self) -> u64 {
        self.queue.dropped()
    }
}
