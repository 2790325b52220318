//! Single-writer command processing through the queue and the mediator.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use log::Level;
use proptest::prelude::*;

use crate::app::{Monitor, MonitorConfig};
use crate::control::mediator::apply;
use crate::control::{command_queue, Command, ControlHandle, StateMediator};
use crate::domain::Pid;
use crate::kernel::ProbeMap;
use crate::probe::ProbeManager;
use crate::tests::mocks::{captured_logs, wait_until, FailPoint, FakeKernel, SELF_PID};

const TIMEOUT: Duration = Duration::from_secs(5);

fn start_monitor(kernel: &FakeKernel) -> Monitor {
    Monitor::start(kernel, MonitorConfig { self_pid: SELF_PID, queue_capacity: 64 }).unwrap()
}

/// Enqueue `commands` and wait until the mediator has applied all of them
fn run_commands(monitor: &Monitor, commands: &[Command]) {
    let control = monitor.control();
    let target = monitor.mediator().applied() + commands.len() as u64;
    for command in commands {
        control.enqueue(*command);
    }
    assert!(
        wait_until(TIMEOUT, || monitor.mediator().applied() >= target),
        "mediator applied {} of {target} commands",
        monitor.mediator().applied()
    );
}

fn state(control: &ControlHandle) -> (BTreeSet<Pid>, bool) {
    (control.watched_pids().unwrap(), control.watch_all_state().unwrap())
}

/// Expected state after applying `commands` in order to the initial state
fn fold(commands: &[Command]) -> (BTreeSet<Pid>, bool) {
    commands.iter().fold((BTreeSet::new(), false), |(mut pids, watch_all), command| {
        match *command {
            Command::AddWatchedPid { pid } => {
                pids.insert(pid);
                (pids, false)
            }
            Command::ClearWatchedPids => (BTreeSet::new(), false),
            Command::SetWatchAll { enabled } => (pids, enabled),
            Command::Unknown => (pids, watch_all),
        }
    })
}

#[test]
fn add_add_clear() {
    let kernel = FakeKernel::new();
    let monitor = start_monitor(&kernel);

    run_commands(
        &monitor,
        &[
            Command::AddWatchedPid { pid: Pid(100) },
            Command::AddWatchedPid { pid: Pid(200) },
        ],
    );
    assert_eq!(state(&monitor.control()), (BTreeSet::from([Pid(100), Pid(200)]), false));

    run_commands(&monitor, &[Command::ClearWatchedPids]);
    assert_eq!(state(&monitor.control()), (BTreeSet::new(), false));
}

#[test]
fn set_watch_all_only() {
    let kernel = FakeKernel::new();
    let monitor = start_monitor(&kernel);

    run_commands(&monitor, &[Command::SetWatchAll { enabled: true }]);

    assert_eq!(state(&monitor.control()), (BTreeSet::new(), true));
}

#[test]
fn add_forces_watch_all_off() {
    let kernel = FakeKernel::new();
    let monitor = start_monitor(&kernel);

    run_commands(
        &monitor,
        &[Command::SetWatchAll { enabled: true }, Command::AddWatchedPid { pid: Pid(5) }],
    );

    assert_eq!(state(&monitor.control()), (BTreeSet::from([Pid(5)]), false));
}

#[test]
fn clear_forces_watch_all_off() {
    let kernel = FakeKernel::new();
    let monitor = start_monitor(&kernel);

    run_commands(&monitor, &[Command::SetWatchAll { enabled: true }, Command::ClearWatchedPids]);

    assert_eq!(state(&monitor.control()), (BTreeSet::new(), false));
}

#[test]
fn add_twice_equals_add_once() {
    let kernel = FakeKernel::new();
    let monitor = start_monitor(&kernel);

    run_commands(&monitor, &[Command::AddWatchedPid { pid: Pid(8) }]);
    let once = state(&monitor.control());
    run_commands(&monitor, &[Command::AddWatchedPid { pid: Pid(8) }]);

    assert_eq!(state(&monitor.control()), once);
}

#[test]
fn clear_on_empty_is_a_no_op() {
    let kernel = FakeKernel::new();
    let monitor = start_monitor(&kernel);

    run_commands(&monitor, &[Command::ClearWatchedPids]);

    assert_eq!(state(&monitor.control()), (BTreeSet::new(), false));
}

#[test]
fn unknown_kind_is_skipped() {
    let kernel = FakeKernel::new();
    let monitor = start_monitor(&kernel);
    let control = monitor.control();

    control.enqueue_json(r#"{"kind":"reboot_host"}"#).unwrap();
    control.enqueue(Command::AddWatchedPid { pid: Pid(3) });

    assert!(wait_until(TIMEOUT, || monitor.mediator().applied() == 2));
    assert_eq!(state(&control), (BTreeSet::from([Pid(3)]), false));
}

#[test]
fn malformed_json_is_rejected_before_queueing() {
    let kernel = FakeKernel::new();
    let monitor = start_monitor(&kernel);
    let control = monitor.control();

    assert!(control.enqueue_json("{not json").is_err());
    assert!(control.enqueue_json(r#"{"kind":"add_watched_pid"}"#).is_err());
    assert_eq!(monitor.mediator().pending(), 0);
    assert_eq!(monitor.mediator().applied(), 0);
}

#[test]
fn failed_insert_still_disables_watch_all() {
    let kernel = FakeKernel::new();
    let monitor = start_monitor(&kernel);
    run_commands(&monitor, &[Command::SetWatchAll { enabled: true }]);

    kernel.fail(FailPoint::Update(ProbeMap::WatchedPids));
    run_commands(&monitor, &[Command::AddWatchedPid { pid: Pid(11) }]);

    assert_eq!(state(&monitor.control()), (BTreeSet::new(), false));
}

#[test]
fn failed_watch_all_write_keeps_inserted_pid() {
    let kernel = FakeKernel::new();
    let monitor = start_monitor(&kernel);

    kernel.fail(FailPoint::Update(ProbeMap::WatchAll));
    run_commands(&monitor, &[Command::AddWatchedPid { pid: Pid(12) }]);

    assert_eq!(monitor.control().watched_pids().unwrap(), BTreeSet::from([Pid(12)]));
}

#[test]
fn apply_runs_without_a_worker() {
    let kernel = FakeKernel::new();
    let probe = ProbeManager::new(&kernel, SELF_PID).unwrap();

    apply(&probe, Command::AddWatchedPid { pid: Pid(1) });
    apply(&probe, Command::SetWatchAll { enabled: true });

    assert_eq!(probe.watched_pids().unwrap(), BTreeSet::from([Pid(1)]));
    assert!(probe.watch_all_state().unwrap());
}

#[test]
fn full_queue_drops_without_blocking() {
    let kernel = FakeKernel::new();
    let probe = Arc::new(ProbeManager::new(&kernel, SELF_PID).unwrap());
    // No mediator drains this queue
    let (queue, _commands) = command_queue(2);
    let control = ControlHandle::new(queue, Arc::clone(&probe));

    for pid in 0..5 {
        control.enqueue(Command::AddWatchedPid { pid: Pid(pid) });
    }

    assert_eq!(control.dropped_commands(), 3);
    assert!(control.watched_pids().unwrap().is_empty());
}

#[test]
fn full_queue_logs_each_dropped_command() {
    let logs = captured_logs();
    let (queue, _commands) = command_queue(1);

    queue.enqueue(Command::AddWatchedPid { pid: Pid(90_001) });
    queue.enqueue(Command::AddWatchedPid { pid: Pid(90_002) });
    queue.enqueue(Command::SetWatchAll { enabled: true });

    assert!(!logs.contains(Level::Warn, "add_watched_pid(90001)"));
    assert!(logs.contains(Level::Warn, "Command queue full, dropping add_watched_pid(90002)"));
    assert!(logs.contains(Level::Warn, "Command queue full, dropping set_watch_all(true)"));
}

#[test]
fn closed_queue_logs_the_dropped_command() {
    let logs = captured_logs();
    let (queue, commands) = command_queue(4);
    drop(commands);

    queue.enqueue(Command::AddWatchedPid { pid: Pid(90_003) });

    assert_eq!(queue.dropped(), 1);
    assert!(logs.contains(Level::Warn, "Command queue closed, dropping add_watched_pid(90003)"));
}

#[test]
fn mediator_stop_is_idempotent() {
    let kernel = FakeKernel::new();
    let probe = Arc::new(ProbeManager::new(&kernel, SELF_PID).unwrap());
    let (_queue, commands) = command_queue(4);
    let mediator = StateMediator::spawn(probe, commands).unwrap();

    mediator.stop();
    mediator.stop();
    assert_eq!(mediator.to_string(), "StateMediator(queue=0)");
}

#[test]
fn mediator_exits_when_producers_are_gone() {
    let kernel = FakeKernel::new();
    let probe = Arc::new(ProbeManager::new(&kernel, SELF_PID).unwrap());
    let (queue, commands) = command_queue(4);
    let mediator = StateMediator::spawn(Arc::clone(&probe), commands).unwrap();

    queue.enqueue(Command::AddWatchedPid { pid: Pid(21) });
    drop(queue);

    // Commands buffered before the last producer went away are still applied
    assert!(wait_until(TIMEOUT, || mediator.applied() == 1));
    mediator.stop();
    assert_eq!(probe.watched_pids().unwrap(), BTreeSet::from([Pid(21)]));
}

#[test]
fn monitor_stop_releases_everything() {
    let kernel = FakeKernel::new();
    let monitor = start_monitor(&kernel);
    let control = monitor.control();

    monitor.stop();
    monitor.stop();

    assert!(control.watched_pids().is_err());
    assert!(kernel.journal().contains(&"release program".to_string()));
}

fn command_strategy() -> impl Strategy<Value = Command> {
    prop_oneof![
        4 => (1u32..8).prop_map(|pid| Command::AddWatchedPid { pid: Pid(pid) }),
        1 => Just(Command::ClearWatchedPids),
        2 => any::<bool>().prop_map(|enabled| Command::SetWatchAll { enabled }),
        1 => Just(Command::Unknown),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Applying any command sequence leaves the state its left fold predicts
    #[test]
    fn state_matches_fold(commands in prop::collection::vec(command_strategy(), 0..24)) {
        let kernel = FakeKernel::new();
        let monitor = start_monitor(&kernel);

        run_commands(&monitor, &commands);

        prop_assert_eq!(state(&monitor.control()), fold(&commands));
    }
}
