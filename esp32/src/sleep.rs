use std::time::Duration;

use esp_idf_svc::sys::{self, esp};
use log::{error, info};
use motion_sensor_common::WakeCause;

/// Read why the chip came out of deep sleep.
pub fn wake_cause() -> WakeCause {
    let cause = unsafe { sys::esp_sleep_get_wakeup_cause() };

    match cause {
        sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER => WakeCause::Timer,
        sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT1 => {
            let pins = unsafe { sys::esp_sleep_get_ext1_wakeup_status() };
            info!("boot: ext1 wake, triggered by pin mask {:#x}", pins);
            WakeCause::ExternalPin
        }
        other => {
            info!("boot: wake source {}", other);
            WakeCause::Other
        }
    }
}

/// Arm the timer and the ext1 "any high" pins, then power down.
///
/// Execution continues at boot on the next wake.
#[allow(unreachable_code)]
pub fn deep_sleep(timer: Duration, wake_pin_mask: u64) -> ! {
    let micros = u64::try_from(timer.as_micros()).unwrap_or(u64::MAX);

    if let Err(err) = esp!(unsafe { sys::esp_sleep_enable_timer_wakeup(micros) }) {
        error!("sleep: cannot arm timer wake: {}", err);
    }

    if let Err(err) = esp!(unsafe {
        sys::esp_sleep_enable_ext1_wakeup(
            wake_pin_mask,
            sys::esp_sleep_ext1_wakeup_mode_t_ESP_EXT1_WAKEUP_ANY_HIGH,
        )
    }) {
        error!("sleep: cannot arm pin wake: {}", err);
    }

    info!("Entering deep sleep");
    unsafe {
        sys::esp_deep_sleep_start();
    }
    unreachable!("deep sleep returned")
}
