//! Bounded command queue between request handlers and the mediator

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::warn;

use super::Command;

/// Commands buffered before new ones are dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Producer side of the queue; cheap to clone
#[derive(Debug, Clone)]
pub struct CommandQueue {
    tx: Sender<Command>,
    dropped: Arc<AtomicU64>,
}

/// Create a queue holding at most `capacity` commands
///
/// A capacity of 0 is raised to 1 so that `enqueue` never needs a waiting
/// receiver.
#[must_use]
pub fn command_queue(capacity: usize) -> (CommandQueue, Receiver<Command>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (CommandQueue { tx, dropped: Arc::new(AtomicU64::new(0)) }, rx)
}

impl CommandQueue {
    /// Queue `command` without blocking
    ///
    /// A full or disconnected queue drops the command with a warning.
    pub fn enqueue(&self, command: Command) {
        match self.tx.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Command queue full, dropping {command}");
            }
            Err(TrySendError::Disconnected(command)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Command queue closed, dropping {command}");
            }
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }

    /// Commands dropped on a full or closed queue since creation
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Pid;

    #[test]
    fn test_fifo_order() {
        let (queue, rx) = command_queue(4);
        queue.enqueue(Command::AddWatchedPid { pid: Pid(1) });
        queue.enqueue(Command::ClearWatchedPids);

        assert_eq!(rx.len(), 2);
        assert_eq!(rx.try_recv().unwrap(), Command::AddWatchedPid { pid: Pid(1) });
        assert_eq!(rx.try_recv().unwrap(), Command::ClearWatchedPids);
    }

    #[test]
    fn test_overflow_drops_newest() {
        let (queue, rx) = command_queue(2);
        for pid in 1..=5 {
            queue.enqueue(Command::AddWatchedPid { pid: Pid(pid) });
        }

        assert_eq!(queue.dropped(), 3);
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.try_recv().unwrap(), Command::AddWatchedPid { pid: Pid(1) });
        assert_eq!(rx.try_recv().unwrap(), Command::AddWatchedPid { pid: Pid(2) });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disconnected_counts_as_dropped() {
        let (queue, rx) = command_queue(DEFAULT_QUEUE_CAPACITY);
        drop(rx);
        queue.enqueue(Command::ClearWatchedPids);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let (queue, _rx) = command_queue(0);
        assert_eq!(queue.capacity(), 1);
    }
}
