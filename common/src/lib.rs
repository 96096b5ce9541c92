//! Platform independent part of the motion/climate sensor node.
//!
//! Everything in here runs on the desktop as well as on the ESP32: the boot
//! cycle state machine, the MQTT payloads, configuration and the AHT20 driver.
//! The firmware crate only supplies the hardware behind the traits in [`hal`].

pub mod aht20;
pub mod config;
pub mod cycle;
pub mod error;
pub mod hal;
pub mod payload;
pub mod reading;
pub mod retry;

pub use config::Config;
pub use cycle::{BootCycle, Board, CycleOutcome, SleepPlan};
pub use error::{ConfigError, CycleError};
pub use hal::{Broker, EnvironmentSensor, Network, Publisher, WakeCause};
pub use reading::{Measurement, Motion, Reading};
