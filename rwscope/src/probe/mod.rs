//! # Probe Lifecycle
//!
//! [`ProbeManager`] owns everything acquired from the kernel: the loaded
//! probe object, its kprobe links, the three PID maps and the event channel.
//!
//! ## Construction
//!
//! 1. Load the probe object and take its maps
//! 2. Seed the self-exclusion entry with the monitor's PID
//! 3. Write watch-all = 0
//! 4. Resolve the `read` and `write` entry symbols
//! 5. Attach the read kprobe
//! 6. Attach the write kprobe
//! 7. Open the event channel
//!
//! A failure at any step releases what the earlier steps acquired, newest
//! first: detach attached probes, drop the maps, drop the object.
//!
//! ## Shutdown
//!
//! [`ProbeManager::stop`] raises the stop flag, force-closes the channel so a
//! reader blocked in the kernel wakes up, joins the consumer, then detaches
//! and releases in the same order as a construction rollback.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rwscope_common::{WATCH_ALL_ENABLED, WATCH_ALL_KEY};

use crate::domain::{ConstructionStep, Pid, ProbeError, Syscall};
use crate::kernel::{EventChannel, Kernel, KernelMap, ProbeMap, ProbeObject};

pub mod event;
mod event_loop;

pub use event::{EventCounts, EventKind, EventStats, ObservedEvent};

const CONSUMER_THREAD: &str = "event-consumer";

/// Handles to the three PID maps
#[derive(Clone)]
struct ProbeMaps {
    self_exclusion: Arc<dyn KernelMap>,
    watched_pids: Arc<dyn KernelMap>,
    watch_all: Arc<dyn KernelMap>,
}

impl ProbeMaps {
    fn take(object: &mut dyn ProbeObject) -> Result<Self, ProbeError> {
        let mut take = |map: ProbeMap| {
            object.take_map(map).map_err(ProbeError::construction(ConstructionStep::OpenMaps))
        };
        let self_exclusion = take(ProbeMap::SelfExclusion)?;
        let watched_pids = take(ProbeMap::WatchedPids)?;
        let watch_all = take(ProbeMap::WatchAll)?;
        Ok(Self { self_exclusion, watched_pids, watch_all })
    }
}

/// Kernel resources released together on rollback and on stop
struct Resources {
    object: Box<dyn ProbeObject>,
    maps: ProbeMaps,
    attached: Vec<Syscall>,
}

impl Resources {
    fn attach(&mut self, syscall: Syscall, symbol: &str) -> Result<(), ProbeError> {
        let step = match syscall {
            Syscall::Read => ConstructionStep::AttachRead,
            Syscall::Write => ConstructionStep::AttachWrite,
        };
        self.object.attach(syscall, symbol).map_err(ProbeError::construction(step))?;
        self.attached.push(syscall);
        Ok(())
    }

    /// Detach newest first, then drop the maps, then the object
    fn release(self) {
        let Resources { mut object, maps, attached } = self;
        for syscall in attached.into_iter().rev() {
            match object.detach(syscall) {
                Ok(()) => debug!("Detached {syscall} probe"),
                Err(e) => warn!("Failed to detach {syscall} probe: {e}"),
            }
        }
        drop(maps);
        drop(object);
    }
}

/// Owner of the kernel probe and its maps
pub struct ProbeManager {
    self_pid: Pid,
    resources: Mutex<Option<Resources>>,
    channel: Mutex<Option<Arc<dyn EventChannel>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    stopping: Arc<AtomicBool>,
    stats: Arc<EventStats>,
}

impl ProbeManager {
    /// Load, seed and attach the probe, then open its event channel
    ///
    /// # Errors
    /// Returns [`ProbeError::Construction`] naming the step that failed; every
    /// resource acquired before it has been released by then.
    pub fn new(kernel: &dyn Kernel, self_pid: Pid) -> Result<Self, ProbeError> {
        info!("Host PID: {}", self_pid.0);

        let mut object =
            kernel.load().map_err(ProbeError::construction(ConstructionStep::LoadProgram))?;
        let maps = ProbeMaps::take(object.as_mut())?;
        let mut resources = Resources { object, maps, attached: Vec::new() };

        match Self::initialize(&mut resources, kernel, self_pid) {
            Ok(channel) => {
                info!("Initial state: no watched pids, watch-all disabled");
                Ok(Self {
                    self_pid,
                    resources: Mutex::new(Some(resources)),
                    channel: Mutex::new(Some(channel)),
                    consumer: Mutex::new(None),
                    stopping: Arc::new(AtomicBool::new(false)),
                    stats: Arc::new(EventStats::default()),
                })
            }
            Err(e) => {
                warn!("Probe setup failed, releasing partial state: {e}");
                resources.release();
                Err(e)
            }
        }
    }

    /// Steps 2 to 7 of construction
    fn initialize(
        resources: &mut Resources,
        kernel: &dyn Kernel,
        self_pid: Pid,
    ) -> Result<Arc<dyn EventChannel>, ProbeError> {
        resources
            .maps
            .self_exclusion
            .update(self_pid.0, self_pid.0)
            .map_err(ProbeError::construction(ConstructionStep::SeedSelfExclusion))?;
        info!("Self-exclusion PID: {}", self_pid.0);

        resources
            .maps
            .watch_all
            .update(WATCH_ALL_KEY, 0)
            .map_err(ProbeError::construction(ConstructionStep::InitWatchAll))?;

        let resolve = ProbeError::construction(ConstructionStep::ResolveSymbols);
        let (read_symbol, write_symbol) = kernel
            .symbol_table()
            .and_then(|table| {
                Ok((table.resolve_syscall(Syscall::Read)?, table.resolve_syscall(Syscall::Write)?))
            })
            .map_err(resolve)?;

        resources.attach(Syscall::Read, &read_symbol)?;
        resources.attach(Syscall::Write, &write_symbol)?;

        resources
            .object
            .open_channel()
            .map_err(ProbeError::construction(ConstructionStep::OpenEventChannel))
    }

    /// Spawn the `event-consumer` thread
    ///
    /// # Errors
    /// [`ProbeError::AlreadyStarted`] on a second call,
    /// [`ProbeError::NotInitialized`] after [`ProbeManager::stop`]
    pub fn start_event_loop(&self) -> Result<(), ProbeError> {
        let mut consumer = self.consumer.lock();
        if consumer.is_some() {
            return Err(ProbeError::AlreadyStarted);
        }
        let channel = self.channel.lock().clone().ok_or(ProbeError::NotInitialized)?;

        let stopping = Arc::clone(&self.stopping);
        let stats = Arc::clone(&self.stats);
        let handle = thread::Builder::new()
            .name(CONSUMER_THREAD.to_string())
            .spawn(move || event_loop::run(channel.as_ref(), &stopping, &stats))
            .map_err(|source| ProbeError::Spawn { worker: CONSUMER_THREAD, source })?;

        *consumer = Some(handle);
        info!("Event loop started");
        Ok(())
    }

    /// Tear down in order: close channel, join consumer, detach, release
    ///
    /// Only the first call does anything.
    pub fn stop(&self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Stopping probe");

        if let Some(channel) = self.channel.lock().take() {
            channel.close();
        }
        if let Some(handle) = self.consumer.lock().take() {
            if handle.join().is_err() {
                error!("Event consumer thread panicked");
            }
        }
        if let Some(resources) = self.resources.lock().take() {
            resources.release();
        }

        info!("Probe stopped");
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn self_pid(&self) -> Pid {
        self.self_pid
    }

    #[must_use]
    pub fn event_stats(&self) -> Arc<EventStats> {
        Arc::clone(&self.stats)
    }

    // Map CRUD. Each call clones the map handles out of the lock so a slow
    // kernel call never blocks stop().

    fn maps(&self) -> Result<ProbeMaps, ProbeError> {
        self.resources.lock().as_ref().map(|r| r.maps.clone()).ok_or(ProbeError::NotInitialized)
    }

    /// # Errors
    /// Returns an error if the manager is stopped or the map is full
    pub fn add_watched_pid(&self, pid: Pid) -> Result<(), ProbeError> {
        self.maps()?
            .watched_pids
            .update(pid.0, pid.0)
            .map_err(ProbeError::kernel("add watched pid"))?;
        debug!("Watching {pid}");
        Ok(())
    }

    /// Removing a PID that is not watched succeeds without effect
    ///
    /// # Errors
    /// Returns an error if the manager is stopped or the delete fails
    pub fn remove_watched_pid(&self, pid: Pid) -> Result<(), ProbeError> {
        self.maps()?.watched_pids.delete(pid.0).map_err(ProbeError::kernel("remove watched pid"))?;
        debug!("Stopped watching {pid}");
        Ok(())
    }

    /// Delete every enumerated key, continuing past keys that fail
    ///
    /// # Errors
    /// Returns an error if the manager is stopped or enumeration fails, or the
    /// first delete failure once every key has been tried
    pub fn clear_watched_pids(&self) -> Result<(), ProbeError> {
        let watched = self.maps()?.watched_pids;
        let keys = watched.keys().map_err(ProbeError::kernel("list watched pids"))?;

        let mut first_failure = None;
        let mut failed = 0usize;
        for key in &keys {
            if let Err(e) = watched.delete(*key) {
                error!("Failed to remove watched pid {key}: {e}");
                failed += 1;
                first_failure.get_or_insert(e);
            }
        }
        debug!("Cleared {} of {} watched pids", keys.len() - failed, keys.len());

        match first_failure {
            Some(source) => Err(ProbeError::Kernel { op: "remove watched pid", source }),
            None => Ok(()),
        }
    }

    /// # Errors
    /// Returns an error if the manager is stopped or enumeration fails
    pub fn watched_pids(&self) -> Result<BTreeSet<Pid>, ProbeError> {
        let keys =
            self.maps()?.watched_pids.keys().map_err(ProbeError::kernel("list watched pids"))?;
        Ok(keys.into_iter().map(Pid).collect())
    }

    /// # Errors
    /// Returns an error if the manager is stopped or the update fails
    pub fn set_watch_all(&self, enabled: bool) -> Result<(), ProbeError> {
        let value = if enabled { WATCH_ALL_ENABLED } else { 0 };
        self.maps()?
            .watch_all
            .update(WATCH_ALL_KEY, value)
            .map_err(ProbeError::kernel("set watch-all flag"))?;
        debug!("Watch-all {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// # Errors
    /// [`ProbeError::WatchAllUnset`] if the flag entry is absent, otherwise
    /// an error if the manager is stopped or the lookup fails
    pub fn watch_all_state(&self) -> Result<bool, ProbeError> {
        self.maps()?
            .watch_all
            .lookup(WATCH_ALL_KEY)
            .map_err(ProbeError::kernel("read watch-all flag"))?
            .map(|value| value == WATCH_ALL_ENABLED)
            .ok_or(ProbeError::WatchAllUnset)
    }
}

impl Drop for ProbeManager {
    fn drop(&mut self) {
        self.stop();
    }
}
