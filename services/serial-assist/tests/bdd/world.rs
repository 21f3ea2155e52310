//! World struct for serial session BDD tests

use std::sync::Arc;

use cucumber::World;
use serial_assist::io::SerialPortFactory;
use serial_assist::{EventReceiver, SerialSession, SessionConfig};

#[path = "mock_serial.rs"]
pub mod mock_serial;

use mock_serial::{test_config, wait_for_opened, FailingFactory, MockSerialPortFactory};

#[derive(Debug, Default, World)]
pub struct SessionWorld {
    pub factory: Option<MockSerialPortFactory>,
    pub session: Option<SerialSession>,
    pub events: Option<EventReceiver>,
}

impl SessionWorld {
    fn install(&mut self, factory: Arc<dyn SerialPortFactory>, options: SessionConfig) {
        let mut session = SerialSession::with_factory(test_config(), factory).with_options(options);
        self.events = session.take_events();
        self.session = Some(session);
    }

    /// Build a stopped session on a scriptable mock port
    pub fn build_session(&mut self, factory: MockSerialPortFactory, options: SessionConfig) {
        self.install(Arc::new(factory.clone()), options);
        self.factory = Some(factory);
    }

    /// Build a stopped session whose port cannot be opened
    pub fn build_failing_session(&mut self, error_msg: &str) {
        self.install(
            Arc::new(FailingFactory::new(error_msg)),
            SessionConfig::default(),
        );
    }

    /// Start the session and consume its PortOpened event
    pub fn start_and_wait(&mut self) {
        self.session_mut().start().unwrap();
        assert!(wait_for_opened(self.events_mut()), "port never opened");
    }

    pub fn session(&self) -> &SerialSession {
        self.session.as_ref().expect("session not created")
    }

    pub fn session_mut(&mut self) -> &mut SerialSession {
        self.session.as_mut().expect("session not created")
    }

    pub fn events_mut(&mut self) -> &mut EventReceiver {
        self.events.as_mut().expect("event stream not taken")
    }

    pub fn factory(&self) -> &MockSerialPortFactory {
        self.factory.as_ref().expect("mock factory not created")
    }
}
