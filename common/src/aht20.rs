//! Driver for the AHT20 (and AHT21/AHT25) temperature and humidity sensor.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use thiserror::Error;

use crate::hal::EnvironmentSensor;
use crate::reading::Measurement;

#[derive(Error, Debug)]
pub enum Aht20Error<E> {
    #[error("i2c: {0:?}")]
    I2c(E),
    #[error("sensor stayed busy")]
    Busy,
    #[error("sensor refused calibration")]
    NotCalibrated,
    #[error("checksum mismatch")]
    Checksum,
}

pub struct Aht20<I, D> {
    i2c: I,
    delay: D,
    initialized: bool,
}

impl<I, D> Aht20<I, D>
where
    I: I2c,
    D: DelayNs,
{
    pub const ADDRESS: u8 = 0x38;

    const CMD_SOFT_RESET: u8 = 0xBA;
    const CMD_CALIBRATE: [u8; 3] = [0xBE, 0x08, 0x00];
    const CMD_TRIGGER: [u8; 3] = [0xAC, 0x33, 0x00];

    const STATUS_BUSY: u8 = 0x80;
    const STATUS_CALIBRATED: u8 = 0x08;

    /// Conversion takes about 80 ms, give it a few extra polls.
    const MAX_BUSY_POLLS: usize = 10;

    pub fn new(i2c: I, delay: D) -> Self {
        Self {
            i2c,
            delay,
            initialized: false,
        }
    }

    /// Reset the sensor and make sure it is calibrated.
    ///
    /// Called by [`Aht20::read`] on first use, so calling it explicitly is
    /// only needed to detect a missing sensor early.
    pub fn init(&mut self) -> Result<(), Aht20Error<I::Error>> {
        self.write(&[Self::CMD_SOFT_RESET])?;
        self.delay.delay_ms(20);

        self.wait_while_busy()?;

        if self.status()? & Self::STATUS_CALIBRATED == 0 {
            self.write(&Self::CMD_CALIBRATE)?;
            self.delay.delay_ms(10);
            self.wait_while_busy()?;

            if self.status()? & Self::STATUS_CALIBRATED == 0 {
                return Err(Aht20Error::NotCalibrated);
            }
        }

        self.initialized = true;
        Ok(())
    }

    pub fn read(&mut self) -> Result<Measurement, Aht20Error<I::Error>> {
        if !self.initialized {
            self.init()?;
        }

        self.write(&Self::CMD_TRIGGER)?;
        self.delay.delay_ms(80);
        self.wait_while_busy()?;

        // status, 5 bytes of packed 20 bit values, crc
        let mut data = [0u8; 7];
        self.i2c
            .read(Self::ADDRESS, &mut data)
            .map_err(Aht20Error::I2c)?;

        if crc8(&data[..6]) != data[6] {
            return Err(Aht20Error::Checksum);
        }

        Ok(convert(&data))
    }

    /// Hand the bus and delay back, e.g. to share the bus with another
    /// device after the measurement.
    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }

    fn status(&mut self) -> Result<u8, Aht20Error<I::Error>> {
        let mut status = [0u8; 1];
        self.i2c
            .read(Self::ADDRESS, &mut status)
            .map_err(Aht20Error::I2c)?;
        Ok(status[0])
    }

    fn wait_while_busy(&mut self) -> Result<(), Aht20Error<I::Error>> {
        for _ in 0..Self::MAX_BUSY_POLLS {
            if self.status()? & Self::STATUS_BUSY == 0 {
                return Ok(());
            }
            self.delay.delay_ms(10);
        }
        Err(Aht20Error::Busy)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Aht20Error<I::Error>> {
        self.i2c
            .write(Self::ADDRESS, bytes)
            .map_err(Aht20Error::I2c)
    }
}

impl<I, D> EnvironmentSensor for Aht20<I, D>
where
    I: I2c,
    D: DelayNs,
{
    type Error = Aht20Error<I::Error>;

    fn measure(&mut self) -> Result<Measurement, Self::Error> {
        self.read()
    }
}

fn convert(data: &[u8; 7]) -> Measurement {
    const FULL_SCALE: f32 = (1u32 << 20) as f32;

    let humidity =
        (u32::from(data[1]) << 12) | (u32::from(data[2]) << 4) | (u32::from(data[3]) >> 4);
    let temperature =
        ((u32::from(data[3]) & 0x0F) << 16) | (u32::from(data[4]) << 8) | u32::from(data[5]);

    Measurement {
        temperature_celsius: temperature as f32 * 200.0 / FULL_SCALE - 50.0,
        relative_humidity: humidity as f32 * 100.0 / FULL_SCALE,
    }
}

/// CRC-8, polynomial 0x31, initial value 0xFF.
fn crc8(bytes: &[u8]) -> u8 {
    let mut crc = 0xFFu8;
    for byte in bytes {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}
