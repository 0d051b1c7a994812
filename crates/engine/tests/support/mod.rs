//! Shared test support: a scriptable mock driver over the loopback
//! transport, plus a hub harness throttled by a hand-advanced clock.
#![allow(dead_code)]

use common::ManualClock;
use common::test_utils::{create_mock_device_info, create_mock_screened_device_info};
use engine::{ControllerDriver, EngineConfig, Hub, Loopback, UsbPort};
use protocol::{DeviceId, DeviceInfo, Event};
use std::cell::RefCell;
use std::rc::Rc;

/// Interrupt IN endpoint the mock surface reports on
pub const EP_IN: u8 = 0x81;
/// Interrupt OUT endpoint the mock surface lights on
pub const EP_LIGHTS: u8 = 0x01;
/// Bulk OUT endpoint the mock surface screen flushes on
pub const EP_SCREEN: u8 = 0x02;
/// Mock input report length
pub const REPORT_LEN: usize = 8;

/// One observed call, either into the driver or into a host callback
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Poll,
    LightSet { light: u32, color: u32 },
    GridLightSet { grid: u32, pos: u32, color: u32 },
    LightsFlush { force: bool },
    ScreenFlush { screen: u32 },
    Disconnect { banished: bool },
    EventCb { events: Vec<Event> },
    FeedbackCb,
    ScreenCb { screen: u32 },
    RemoveCb { unexpected: bool },
}

/// Shared, clonable call log
#[derive(Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.borrow_mut().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.0.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    /// Index of the first call matching `pred`, if any
    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.0.borrow().iter().position(|c| pred(c))
    }
}

/// Minimal driver: decodes `[id, pressed, ..]` reports into button events
pub struct MockDriver {
    info: DeviceInfo,
    handle_idx: usize,
    log: CallLog,
    screen: Vec<u8>,
}

impl MockDriver {
    pub fn new(info: DeviceInfo, handle_idx: usize, log: CallLog) -> Self {
        let screen = info
            .screens
            .first()
            .map(|s| vec![0u8; s.bytes])
            .unwrap_or_default();
        Self {
            info,
            handle_idx,
            log,
            screen,
        }
    }
}

impl ControllerDriver for MockDriver {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn poll(&mut self, port: &mut UsbPort) {
        self.log.push(Call::Poll);
        port.submit_read(self.handle_idx, EP_IN, REPORT_LEN);
    }

    fn handle_read(&mut self, endpoint: u8, data: &[u8], events: &mut Vec<Event>) {
        if endpoint != EP_IN || data.len() < 2 {
            return;
        }
        events.push(Event::Button {
            id: u32::from(data[0]),
            pressed: data[1] != 0,
        });
    }

    fn light_set(&mut self, light: u32, color: u32) {
        self.log.push(Call::LightSet { light, color });
    }

    fn grid_light_set(&mut self, grid: u32, pos: u32, color: u32) {
        self.log.push(Call::GridLightSet { grid, pos, color });
    }

    fn lights_flush(&mut self, port: &mut UsbPort, force: bool) {
        self.log.push(Call::LightsFlush { force });
        port.submit_interrupt_write(self.handle_idx, EP_LIGHTS, &[0x80, 0x01]);
    }

    fn screen_pixels(&mut self, screen: u32) -> Option<&mut [u8]> {
        (screen == 0 && !self.screen.is_empty()).then_some(self.screen.as_mut_slice())
    }

    fn screen_flush(&mut self, port: &mut UsbPort, screen: u32) {
        self.log.push(Call::ScreenFlush { screen });
        port.submit_bulk_write(self.handle_idx, EP_SCREEN, &self.screen);
    }

    fn disconnect(&mut self, port: &mut UsbPort, banished: bool) {
        self.log.push(Call::Disconnect { banished });
        if !banished {
            // Neutral state: all lights off.
            port.submit_interrupt_write(self.handle_idx, EP_LIGHTS, &[0x80, 0x00]);
        }
    }
}

/// Hub with a hand-advanced clock: screens at 10 fps (100 ms interval)
pub fn test_hub() -> (Hub, ManualClock) {
    let clock = ManualClock::new();
    let config = EngineConfig {
        screen_fps: 10,
        drain_ms: 20,
        hotplug: false,
        ..EngineConfig::default()
    };
    (Hub::with_clock(config, Box::new(clock.clone())), clock)
}

/// Connect a mock device; returns its id, loopback handle and call log
pub fn connect_mock(hub: &mut Hub, product_id: u16) -> (DeviceId, Loopback, CallLog) {
    connect_mock_inner(hub, product_id, false)
}

/// Connect a mock device carrying one 64x32 screen
pub fn connect_screened_mock(hub: &mut Hub, product_id: u16) -> (DeviceId, Loopback, CallLog) {
    connect_mock_inner(hub, product_id, true)
}

fn connect_mock_inner(
    hub: &mut Hub,
    product_id: u16,
    with_screen: bool,
) -> (DeviceId, Loopback, CallLog) {
    let loopback = Loopback::new();
    let mut port = UsbPort::new(loopback.transport());
    let handle_idx = port.open(0x1234, product_id).expect("open");
    port.open_interface(handle_idx, 0).expect("claim");

    let info = if with_screen {
        create_mock_screened_device_info(0x1234, product_id)
    } else {
        create_mock_device_info(0x1234, product_id)
    };
    let log = CallLog::default();
    let driver = MockDriver::new(info, handle_idx, log.clone());
    let id = hub.register_device(Box::new(driver), port);
    (id, loopback, log)
}

/// Install an event handler that mirrors batches into the log
pub fn log_events(hub: &mut Hub, id: DeviceId, log: &CallLog) {
    let log = log.clone();
    hub.set_event_handler(id, move |_ctx, events| {
        log.push(Call::EventCb {
            events: events.to_vec(),
        });
    });
}

/// Install a feedback handler that mirrors invocations into the log
pub fn log_feedback(hub: &mut Hub, id: DeviceId, log: &CallLog) {
    let log = log.clone();
    hub.set_feedback_handler(id, move |_ctx| {
        log.push(Call::FeedbackCb);
    });
}

/// Install a removal handler that mirrors invocations into the log
pub fn log_removal(hub: &mut Hub, id: DeviceId, log: &CallLog) {
    let log = log.clone();
    hub.set_remove_handler(id, move |_info, unexpected| {
        log.push(Call::RemoveCb { unexpected });
    });
}

/// A `[id, pressed]` mock input report
pub fn button_report(id: u8, pressed: bool) -> Vec<u8> {
    let mut report = vec![0u8; REPORT_LEN];
    report[0] = id;
    report[1] = pressed as u8;
    report
}
