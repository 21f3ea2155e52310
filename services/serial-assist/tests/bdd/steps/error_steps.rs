//! Step definitions for errors.feature

use std::io::ErrorKind;

use crate::world::mock_serial::{self, MockSerialPortFactory};
use crate::world::SessionWorld;
use cucumber::{given, then, when};
use serial_assist::{SessionConfig, SessionEvent};

#[given("a session on a mock serial port that stops on errors")]
fn session_stopping_on_errors(world: &mut SessionWorld) {
    let options = SessionConfig {
        stop_on_error: true,
        ..SessionConfig::default()
    };
    world.build_session(MockSerialPortFactory::new(), options);
}

#[given("the device rejects writes")]
fn device_rejects_writes(world: &mut SessionWorld) {
    world.factory().set_fail_writes(true);
}

#[when(expr = "the port reports a read fault {string}")]
fn port_reports_fault(world: &mut SessionWorld, msg: String) {
    assert!(world.factory().push_fault(ErrorKind::BrokenPipe, &msg));
}

#[when(expr = "the port reports a timeout {string}")]
fn port_reports_timeout(world: &mut SessionWorld, msg: String) {
    assert!(world.factory().push_fault(ErrorKind::TimedOut, &msg));
}

#[when("the device hangs up")]
fn device_hangs_up(world: &mut SessionWorld) {
    assert!(world.factory().hang_up());
}

#[then(expr = "an error event mentioning {string} should arrive")]
fn error_event_arrives(world: &mut SessionWorld, fragment: String) {
    let event = mock_serial::wait_for(world.events_mut(), |e| {
        matches!(e, SessionEvent::PortError(_))
    });
    match event {
        Some(SessionEvent::PortError(description)) => assert!(
            description.contains(&fragment),
            "expected error containing {:?}, got {:?}",
            fragment,
            description
        ),
        other => panic!("expected PortError, got {:?}", other),
    }
}

#[then("a Closed event should arrive")]
fn closed_event_arrives(world: &mut SessionWorld) {
    let event = mock_serial::wait_for(world.events_mut(), |e| {
        matches!(e, SessionEvent::PortClosed { .. })
    });
    assert!(event.is_some(), "session never closed");
}

#[then("no error event should arrive")]
fn no_error_event(world: &mut SessionWorld) {
    std::thread::sleep(std::time::Duration::from_millis(100));
    let events = mock_serial::drain(world.events_mut());
    assert!(
        !events.iter().any(|e| matches!(e, SessionEvent::PortError(_))),
        "unexpected events: {:?}",
        events
    );
}
