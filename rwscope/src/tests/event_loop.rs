//! Event consumption: decoding, classification and error accounting.

use std::io;
use std::time::Duration;

use rwscope_common::{EVENT_READ, EVENT_WRITE};

use crate::domain::ChannelError;
use crate::kernel::ChannelRecord;
use crate::probe::{EventCounts, ProbeManager};
use crate::tests::mocks::{wait_until, FakeKernel, SELF_PID};

const TIMEOUT: Duration = Duration::from_secs(5);

fn running_probe() -> (FakeKernel, ProbeManager) {
    let kernel = FakeKernel::new();
    let probe = ProbeManager::new(&kernel, SELF_PID).unwrap();
    probe.start_event_loop().unwrap();
    (kernel, probe)
}

fn wait_for_counts(probe: &ProbeManager, expected: EventCounts) {
    let stats = probe.event_stats();
    assert!(
        wait_until(TIMEOUT, || stats.snapshot() == expected),
        "expected {expected}, got {}",
        stats.snapshot()
    );
}

#[test]
fn counts_reads_and_writes() {
    let (kernel, probe) = running_probe();

    kernel.emit_event(100, EVENT_READ);
    kernel.emit_event(100, EVENT_WRITE);
    kernel.emit_event(200, EVENT_READ);

    wait_for_counts(&probe, EventCounts { reads: 2, writes: 1, ..EventCounts::default() });
    probe.stop();
}

#[test]
fn unknown_event_type_is_counted_not_fatal() {
    let (kernel, probe) = running_probe();

    kernel.emit_event(100, 77);
    kernel.emit_event(100, EVENT_READ);

    wait_for_counts(&probe, EventCounts { reads: 1, unknown: 1, ..EventCounts::default() });
    probe.stop();
}

#[test]
fn lost_samples_are_counted() {
    let (kernel, probe) = running_probe();

    kernel.emit(ChannelRecord::Lost(5));
    kernel.emit(ChannelRecord::Lost(3));
    kernel.emit_event(1, EVENT_WRITE);

    wait_for_counts(&probe, EventCounts { writes: 1, lost: 8, ..EventCounts::default() });
    probe.stop();
}

#[test]
fn transient_errors_do_not_stop_the_loop() {
    let (kernel, probe) = running_probe();

    for _ in 0..3 {
        kernel.emit_error(ChannelError::Io(io::Error::from(io::ErrorKind::Interrupted)));
    }
    kernel.emit_event(9, EVENT_READ);

    let expected = EventCounts { reads: 1, transient_errors: 3, ..EventCounts::default() };
    wait_for_counts(&probe, expected);
    probe.stop();
}

#[test]
fn truncated_sample_is_a_transient_error() {
    let (kernel, probe) = running_probe();

    kernel.emit(ChannelRecord::Sample(vec![1, 0, 0]));
    kernel.emit_event(9, EVENT_WRITE);

    let expected = EventCounts { writes: 1, transient_errors: 1, ..EventCounts::default() };
    wait_for_counts(&probe, expected);
    probe.stop();
}

#[test]
fn close_ends_the_loop_with_records_pending() {
    let (kernel, probe) = running_probe();
    for pid in 0..100 {
        kernel.emit_event(pid, EVENT_READ);
    }

    probe.stop();

    // Whatever was consumed before the close, nothing is consumed after it
    let after_stop = probe.event_stats().snapshot();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(probe.event_stats().snapshot(), after_stop);
    assert!(after_stop.reads <= 100);
}
