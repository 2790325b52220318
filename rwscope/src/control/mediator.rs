//! # State Mediator
//!
//! The only writer of the watched-PID set and the watch-all flag. Commands
//! are applied one at a time on the `state-mediator` thread, in the order
//! they were queued.
//!
//! Each command is best-effort: when a command touches two pieces of state
//! (Add and Clear also force watch-all off), a failure in one part is logged
//! and the other part still runs. Nothing is rolled back.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use super::Command;
use crate::domain::ProbeError;
use crate::probe::ProbeManager;

const MEDIATOR_THREAD: &str = "state-mediator";

pub struct StateMediator {
    stop_tx: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    applied: Arc<AtomicU64>,
    commands: Receiver<Command>,
}

impl StateMediator {
    /// Start applying commands from `commands` to `probe`
    ///
    /// # Errors
    /// Returns [`ProbeError::Spawn`] if the worker thread cannot be created
    pub fn spawn(
        probe: Arc<ProbeManager>,
        commands: Receiver<Command>,
    ) -> Result<Self, ProbeError> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let applied = Arc::new(AtomicU64::new(0));

        let worker = {
            let commands = commands.clone();
            let applied = Arc::clone(&applied);
            thread::Builder::new()
                .name(MEDIATOR_THREAD.to_string())
                .spawn(move || run(&probe, &commands, &stop_rx, &applied))
                .map_err(|source| ProbeError::Spawn { worker: MEDIATOR_THREAD, source })?
        };
        info!("State mediator started");

        Ok(Self {
            stop_tx: Mutex::new(Some(stop_tx)),
            worker: Mutex::new(Some(worker)),
            applied,
            commands,
        })
    }

    /// Signal the worker and wait for it to exit
    ///
    /// Safe to call any number of times. Commands still queued are not applied.
    pub fn stop(&self) {
        let Some(stop_tx) = self.stop_tx.lock().take() else {
            return;
        };
        drop(stop_tx);

        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!("State mediator thread panicked");
            }
        }
        info!("State mediator stopped");
    }

    /// Commands applied so far, successfully or not
    #[must_use]
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.commands.len()
    }
}

impl fmt::Display for StateMediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateMediator(queue={})", self.pending())
    }
}

impl Drop for StateMediator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    probe: &ProbeManager,
    commands: &Receiver<Command>,
    stop_rx: &Receiver<()>,
    applied: &AtomicU64,
) {
    loop {
        select! {
            recv(commands) -> command => match command {
                Ok(command) => {
                    apply(probe, command);
                    applied.fetch_add(1, Ordering::Release);
                }
                Err(_) => {
                    debug!("Command queue disconnected");
                    break;
                }
            },
            // Only ever fires by disconnection
            recv(stop_rx) -> _ => break,
        }
    }
}

/// Apply one command to the kernel state
pub fn apply(probe: &ProbeManager, command: Command) {
    debug!("Applying {command}");
    match command {
        Command::AddWatchedPid { pid } => {
            if let Err(e) = probe.add_watched_pid(pid) {
                error!("Failed to add watched pid {}: {e}", pid.0);
            }
            disable_watch_all(probe);
        }
        Command::ClearWatchedPids => {
            if let Err(e) = probe.clear_watched_pids() {
                error!("Failed to clear watched pids: {e}");
            }
            disable_watch_all(probe);
        }
        Command::SetWatchAll { enabled } => {
            if let Err(e) = probe.set_watch_all(enabled) {
                error!("Failed to set watch-all to {enabled}: {e}");
            }
        }
        Command::Unknown => warn!("Ignoring command of unknown kind"),
    }
}

fn disable_watch_all(probe: &ProbeManager) {
    if let Err(e) = probe.set_watch_all(false) {
        error!("Failed to disable watch-all: {e}");
    }
}
