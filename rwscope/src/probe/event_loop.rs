//! # Event Consumption
//!
//! Runs on the `event-consumer` thread until the channel is closed.
//!
//! ## Record Routing
//!
//! - `Sample` → decode, count, log (`EVENT_READ` / `EVENT_WRITE` / unknown code)
//! - `Lost(n)` → warn and count; the kernel overwrote records
//! - `Closed` → exit
//! - any other read or decode failure → log, count, keep reading

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, warn};

use super::event::{EventKind, EventStats, ObservedEvent};
use crate::domain::ChannelError;
use crate::kernel::{ChannelRecord, EventChannel};

/// Consume records until `stopping` is raised or the channel reports closed
pub(crate) fn run(channel: &dyn EventChannel, stopping: &AtomicBool, stats: &EventStats) {
    debug!("Event consumer started");

    while !stopping.load(Ordering::Acquire) {
        match channel.read() {
            Ok(ChannelRecord::Sample(bytes)) => handle_sample(&bytes, stats),
            Ok(ChannelRecord::Lost(count)) => {
                warn!("Lost {count} events (perf buffer overrun)");
                stats.record_lost(count);
            }
            Err(ChannelError::Closed) => {
                debug!("Event channel closed");
                break;
            }
            Err(e) => {
                error!("Failed to read event: {e}");
                stats.record_transient_error();
            }
        }
    }

    debug!("Event consumer stopped");
}

fn handle_sample(bytes: &[u8], stats: &EventStats) {
    let event = match ObservedEvent::decode(bytes) {
        Ok(event) => event,
        Err(e) => {
            error!("Failed to decode event: {e}");
            stats.record_transient_error();
            return;
        }
    };

    stats.record(&event);
    match event.kind {
        EventKind::Read | EventKind::Write => info!("{event}"),
        EventKind::Unknown(code) => warn!("Unknown event type {code} from pid {}", event.pid.0),
    }
}
