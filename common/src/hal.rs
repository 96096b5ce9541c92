//! Seams between the boot cycle and the hardware.
//!
//! GPIO and delays use the `embedded-hal` traits directly; the pieces that
//! have no `embedded-hal` equivalent (Wi-Fi, MQTT, the climate sensor) get a
//! small trait each.

use core::fmt::Display;

use crate::reading::Measurement;

/// Reason the chip came out of deep sleep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeCause {
    /// The sleep timer expired.
    Timer,
    /// One of the ext1 wake pins went high.
    ExternalPin,
    /// Power-on, reset or any source that is not armed by this firmware.
    Other,
}

/// Temperature and humidity source.
pub trait EnvironmentSensor {
    type Error: Display;

    fn measure(&mut self) -> Result<Measurement, Self::Error>;
}

/// Wireless network association.
pub trait Network {
    type Error: Display;

    /// One association attempt. Blocks until associated or failed.
    fn associate(&mut self) -> Result<(), Self::Error>;
}

/// Factory for broker sessions.
pub trait Broker {
    type Client: Publisher;
    type Error: Display;

    /// One connection attempt. Blocks until the broker accepted or refused.
    fn connect(&mut self) -> Result<Self::Client, Self::Error>;
}

/// Fire-and-forget publishing on an established session.
pub trait Publisher {
    type Error: Display;

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error>;
}

impl<T: EnvironmentSensor + ?Sized> EnvironmentSensor for &mut T {
    type Error = T::Error;

    fn measure(&mut self) -> Result<Measurement, Self::Error> {
        T::measure(self)
    }
}

impl<T: Network + ?Sized> Network for &mut T {
    type Error = T::Error;

    fn associate(&mut self) -> Result<(), Self::Error> {
        T::associate(self)
    }
}

impl<T: Broker + ?Sized> Broker for &mut T {
    type Client = T::Client;
    type Error = T::Error;

    fn connect(&mut self) -> Result<Self::Client, Self::Error> {
        T::connect(self)
    }
}
