//! Stand-ins for the node's hardware. Everything they do ends up in the log.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use log::info;
use motion_sensor_common::{Broker, EnvironmentSensor, Measurement, Network, Publisher};

/// Sensor that returns a fixed measurement, or fails when there is none.
pub struct SimSensor(pub Option<Measurement>);

impl EnvironmentSensor for SimSensor {
    type Error = &'static str;

    fn measure(&mut self) -> Result<Measurement, Self::Error> {
        self.0.ok_or("no sensor on the bus")
    }
}

/// Fails the first `failures` attempts, then succeeds.
#[derive(Default)]
pub struct SimLink {
    pub failures: u32,
    pub attempts: u32,
}

impl SimLink {
    fn attempt(&mut self, what: &str) -> Result<(), String> {
        self.attempts += 1;
        if self.attempts <= self.failures {
            Err(format!("{what} unreachable (simulated)"))
        } else {
            Ok(())
        }
    }
}

impl Network for SimLink {
    type Error = String;

    fn associate(&mut self) -> Result<(), Self::Error> {
        self.attempt("access point")
    }
}

pub struct SimBroker {
    pub link: SimLink,
    pub sent: Sent,
}

impl Broker for SimBroker {
    type Client = LogPublisher;
    type Error = String;

    fn connect(&mut self) -> Result<Self::Client, Self::Error> {
        self.link.attempt("broker")?;
        Ok(LogPublisher(self.sent.clone()))
    }
}

/// Topic and payload of everything published so far.
pub type Sent = Rc<RefCell<Vec<(String, String)>>>;

/// Publisher that writes every message to the log.
pub struct LogPublisher(Sent);

impl Publisher for LogPublisher {
    type Error = Infallible;

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error> {
        let payload = String::from_utf8_lossy(payload).into_owned();
        info!("publish {topic} (retain={retain}): {payload}");
        self.0.borrow_mut().push((topic.to_owned(), payload));
        Ok(())
    }
}

/// Motion input that reads high for a number of polls, then low.
pub struct SimMotionPin {
    pub high_polls: u32,
}

impl ErrorType for SimMotionPin {
    type Error = Infallible;
}

impl InputPin for SimMotionPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        if self.high_polls == 0 {
            return Ok(false);
        }
        self.high_polls -= 1;
        Ok(true)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

pub struct SimLed;

impl ErrorType for SimLed {
    type Error = Infallible;
}

impl OutputPin for SimLed {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        info!("status led off");
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        info!("status led on");
        Ok(())
    }
}

/// Delay that either sleeps the thread or only accounts for the time.
#[derive(Default)]
pub struct SimDelay {
    pub realtime: bool,
    pub elapsed: Duration,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        let duration = Duration::from_nanos(u64::from(ns));
        self.elapsed += duration;
        if self.realtime {
            std::thread::sleep(duration);
        }
    }
}
