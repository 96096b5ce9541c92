use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::gpio::{Gpio15, Gpio25, Input, Output, PinDriver};
use esp_idf_svc::hal::i2c::I2cDriver;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use motion_sensor_common::aht20::Aht20;

/// The drivers of the sensor node, as wired on the board:
///
/// - AHT20 on I2C0, SDA GPIO21, SCL GPIO22
/// - motion sensor output on GPIO15 (also an ext1 wake pin)
/// - status LED on GPIO25
pub struct EspNode {
    pub sensor: Aht20<I2cDriver<'static>, FreeRtos>,
    pub motion_pin: PinDriver<'static, Gpio15, Input>,
    pub status_led: PinDriver<'static, Gpio25, Output>,
    pub wifi: BlockingWifi<EspWifi<'static>>,
    pub nvs: EspDefaultNvsPartition,
}

impl EspNode {
    /// Take the peripherals and bring up the drivers.
    pub fn new() -> anyhow::Result<Self> {
        use esp_idf_svc::hal::prelude::*;

        let p = Peripherals::take()?;
        let sys_loop = EspSystemEventLoop::take()?;
        let nvs = EspDefaultNvsPartition::take()?;

        let i2c = I2cDriver::new(
            p.i2c0,
            p.pins.gpio21,
            p.pins.gpio22,
            &esp_idf_svc::hal::i2c::config::Config::new().baudrate(100_000.Hz()),
        )?;
        let sensor = Aht20::new(i2c, FreeRtos);

        let motion_pin = PinDriver::input(p.pins.gpio15)?;

        let mut status_led = PinDriver::output(p.pins.gpio25)?;
        status_led.set_low()?;

        let wifi = BlockingWifi::wrap(
            EspWifi::new(p.modem, sys_loop.clone(), Some(nvs.clone()))?,
            sys_loop,
        )?;

        Ok(Self {
            sensor,
            motion_pin,
            status_led,
            wifi,
            nvs,
        })
    }
}
