//! # Composition
//!
//! Wires the probe, the command queue and the mediator together, and tears
//! them down in the right order: the mediator first (no more writes), then
//! the probe (consumer, links, maps, object).

use std::sync::Arc;

use log::info;

use crate::control::{command_queue, ControlHandle, StateMediator, DEFAULT_QUEUE_CAPACITY};
use crate::domain::{Pid, ProbeError};
use crate::kernel::Kernel;
use crate::probe::{EventCounts, ProbeManager};

/// Startup settings for [`Monitor::start`]
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub self_pid: Pid,
    pub queue_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { self_pid: Pid::current(), queue_capacity: DEFAULT_QUEUE_CAPACITY }
    }
}

/// A running probe with its event consumer and state mediator
pub struct Monitor {
    probe: Arc<ProbeManager>,
    mediator: StateMediator,
    control: ControlHandle,
}

impl Monitor {
    /// Construct the probe, start consuming events, start the mediator
    ///
    /// # Errors
    /// Returns the construction error, or a spawn failure; anything already
    /// started is stopped before returning.
    pub fn start(kernel: &dyn Kernel, config: MonitorConfig) -> Result<Self, ProbeError> {
        let probe = Arc::new(ProbeManager::new(kernel, config.self_pid)?);
        probe.start_event_loop()?;

        let (queue, commands) = command_queue(config.queue_capacity);
        let mediator = StateMediator::spawn(Arc::clone(&probe), commands)?;
        let control = ControlHandle::new(queue, Arc::clone(&probe));

        info!("Monitor running (queue capacity {})", config.queue_capacity);
        Ok(Self { probe, mediator, control })
    }

    /// Handle for enqueueing commands and reading state
    #[must_use]
    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    #[must_use]
    pub fn probe(&self) -> &Arc<ProbeManager> {
        &self.probe
    }

    #[must_use]
    pub fn mediator(&self) -> &StateMediator {
        &self.mediator
    }

    #[must_use]
    pub fn event_counts(&self) -> EventCounts {
        self.probe.event_stats().snapshot()
    }

    /// Stop the mediator, then the probe; later calls do nothing
    pub fn stop(&self) {
        self.mediator.stop();
        self.probe.stop();
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}
