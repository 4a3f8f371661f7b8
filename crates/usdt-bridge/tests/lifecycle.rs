mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{Call, FakeProvider, WAIT_TIMEOUT, wait_until};
use usdt_bridge::{Bridge, BridgeConfig, BridgeState, ProbeKind};
use usdt_hooks::{CodeInfo, Event, Monitoring, ToolId};

fn config() -> BridgeConfig {
    BridgeConfig::default().with_poll_interval(Duration::from_millis(5))
}

fn fire(hooks: &Monitoring, event: Event, name: &str, line: i64) {
    if hooks.is_active(event) {
        hooks.fire(event, &CodeInfo::new(name, "/app/main.rs", line), 0);
    }
}

#[test]
fn test_attach_detach_cycle() {
    let hooks = Arc::new(Monitoring::new());
    let fake = FakeProvider::new(&[ProbeKind::Start]);
    let bridge = Bridge::start_with_provider(&config(), Arc::clone(&hooks), fake.handle());

    assert_eq!(bridge.state(), BridgeState::Disarmed);
    fire(&hooks, Event::FunctionStart, "idle", 1);
    assert_eq!(fake.call_count(), 0);
    assert!(!hooks.is_active(Event::FunctionStart));

    fake.set_counter(1);
    assert!(wait_until(WAIT_TIMEOUT, || bridge.state() == BridgeState::Armed));
    assert_eq!(hooks.get_tool(ToolId::PROFILER_ID).as_deref(), Some("usdt-bridge"));

    fire(&hooks, Event::FunctionStart, "fibonacci", 42);
    assert_eq!(
        fake.calls(),
        vec![Call {
            kind: ProbeKind::Start,
            name: "fibonacci".into(),
            file: "/app/main.rs".into(),
            line: 42,
        }]
    );

    fake.set_counter(0);
    assert!(wait_until(WAIT_TIMEOUT, || bridge.state() == BridgeState::Disarmed));
    assert!(!hooks.is_active(Event::FunctionStart));
    assert_eq!(hooks.get_tool(ToolId::PROFILER_ID), None);
    fire(&hooks, Event::FunctionStart, "fibonacci", 42);
    assert_eq!(fake.call_count(), 1);

    // A second tracer session re-arms without duplicating the registration.
    fake.set_counter(2);
    assert!(wait_until(WAIT_TIMEOUT, || bridge.state() == BridgeState::Armed));
    fire(&hooks, Event::FunctionStart, "main", 7);
    assert_eq!(fake.call_count(), 2);
    assert_eq!(bridge.stats().emitted, 2);

    bridge.shutdown();
    assert_eq!(bridge.state(), BridgeState::Disarmed);
    assert!(!hooks.is_active(Event::FunctionStart));
}

#[test]
fn test_resume_probe_fires_when_exposed() {
    let hooks = Arc::new(Monitoring::new());
    let fake = FakeProvider::new(&[ProbeKind::Start, ProbeKind::Resume]);
    let bridge = Bridge::start_with_provider(&config(), Arc::clone(&hooks), fake.handle());

    fake.set_counter(1);
    assert!(wait_until(WAIT_TIMEOUT, || bridge.state() == BridgeState::Armed));
    assert!(hooks.is_active(Event::FunctionResume));

    fire(&hooks, Event::FunctionStart, "gen", 3);
    fire(&hooks, Event::FunctionResume, "gen", 3);
    let kinds: Vec<_> = fake.calls().into_iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![ProbeKind::Start, ProbeKind::Resume]);

    bridge.shutdown();
}

#[test]
fn test_resume_ignored_without_probe() {
    let hooks = Arc::new(Monitoring::new());
    let fake = FakeProvider::new(&[ProbeKind::Start]);
    let bridge = Bridge::start_with_provider(&config(), Arc::clone(&hooks), fake.handle());

    fake.set_counter(1);
    assert!(wait_until(WAIT_TIMEOUT, || bridge.state() == BridgeState::Armed));
    assert!(!hooks.is_active(Event::FunctionResume));
    fire(&hooks, Event::FunctionResume, "gen", 3);
    assert_eq!(fake.call_count(), 0);

    bridge.shutdown();
}

#[test]
fn test_registration_conflict_retried() {
    let hooks = Arc::new(Monitoring::new());
    hooks.use_tool_id(ToolId::PROFILER_ID, "other-profiler").unwrap();

    let fake = FakeProvider::new(&[ProbeKind::Start]);
    let bridge = Bridge::start_with_provider(&config(), Arc::clone(&hooks), fake.handle());
    fake.set_counter(1);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(bridge.state(), BridgeState::Disarmed);
    assert_eq!(hooks.get_tool(ToolId::PROFILER_ID).as_deref(), Some("other-profiler"));

    hooks.free_tool_id(ToolId::PROFILER_ID).unwrap();
    assert!(wait_until(WAIT_TIMEOUT, || bridge.state() == BridgeState::Armed));
    assert_eq!(hooks.get_tool(ToolId::PROFILER_ID).as_deref(), Some("usdt-bridge"));

    bridge.shutdown();
}

#[test]
fn test_shutdown_is_idempotent() {
    let hooks = Arc::new(Monitoring::new());
    let fake = FakeProvider::new(&[ProbeKind::Start]);
    fake.set_counter(1);
    let bridge = Bridge::start_with_provider(&config(), Arc::clone(&hooks), fake.handle());
    assert!(wait_until(WAIT_TIMEOUT, || bridge.state() == BridgeState::Armed));

    bridge.shutdown();
    bridge.shutdown();
    assert_eq!(bridge.state(), BridgeState::Disarmed);

    // No monitor left to re-arm.
    thread::sleep(Duration::from_millis(30));
    assert_eq!(bridge.state(), BridgeState::Disarmed);
}
