//! The boot cycle: read, connect, announce, publish, sleep.
//!
//! A [`BootCycle`] is built fresh on every wake and consumed by
//! [`BootCycle::run`], which hands back the [`SleepPlan`] the caller has to
//! arm before entering deep sleep.

use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::error::CycleError;
use crate::hal::{Broker, EnvironmentSensor, Network, Publisher, WakeCause};
use crate::payload::{StatePayload, ENTITIES};
use crate::reading::{Motion, Reading};

/// Pause between consecutive discovery messages.
const DISCOVERY_PAUSE_MS: u32 = 5;
/// Pause between the last announcement and the first state publish.
const STATE_PAUSE_MS: u32 = 10;
/// Pause after the last publish so the client can flush before sleep.
const SLEEP_SETTLE_MS: u32 = 10;

/// Local peripherals used during a cycle.
pub struct Board<S, P, L, D> {
    pub sensor: S,
    /// Motion sensor output, high while motion is detected.
    pub motion_pin: P,
    /// Lit while the node is awake.
    pub status_led: L,
    pub delay: D,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Published,
    Failed(CycleError),
}

/// Wake sources to arm before deep sleep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SleepPlan {
    pub timer: Duration,
    /// ext1 "any high" mask.
    pub wake_pin_mask: u64,
    pub outcome: CycleOutcome,
}

/// How the wait for the motion pin ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Release {
    Released,
    TimedOut,
    PinError,
}

pub struct BootCycle<'c, S, P, L, D, N, B> {
    config: &'c Config,
    board: Board<S, P, L, D>,
    network: N,
    broker: B,
}

impl<'c, S, P, L, D, N, B> BootCycle<'c, S, P, L, D, N, B>
where
    S: EnvironmentSensor,
    P: InputPin,
    L: OutputPin,
    D: DelayNs,
    N: Network,
    B: Broker,
{
    pub fn new(config: &'c Config, board: Board<S, P, L, D>, network: N, broker: B) -> Self {
        Self {
            config,
            board,
            network,
            broker,
        }
    }

    /// Run the cycle to completion.
    ///
    /// Never fails: connection problems end up in [`SleepPlan::outcome`] and
    /// everything else is logged.
    pub fn run(mut self, wake_cause: WakeCause) -> SleepPlan {
        info!("boot: wake cause {:?}", wake_cause);

        let reading = self.read_sensor();

        self.set_status_led(true);

        let outcome = match self.connect() {
            Ok(mut client) => {
                self.announce(&mut client);
                self.board.delay.delay_ms(STATE_PAUSE_MS);
                self.publish_state(&mut client, &reading, Motion::On);

                if wake_cause == WakeCause::ExternalPin {
                    match self.wait_for_release() {
                        Release::Released => {
                            self.publish_state(&mut client, &reading, Motion::Off)
                        }
                        Release::TimedOut => warn!("motion: pin still high, skipping OFF update"),
                        Release::PinError => warn!("motion: pin unreadable, skipping OFF update"),
                    }
                }

                self.board.delay.delay_ms(SLEEP_SETTLE_MS);
                CycleOutcome::Published
            }
            Err(err) => {
                error!("boot: {err}, publishing skipped");
                CycleOutcome::Failed(err)
            }
        };

        let plan = self.sleep_plan(outcome);
        info!(
            "sleep: timer {}s, wake pins {:#x}",
            plan.timer.as_secs(),
            plan.wake_pin_mask
        );

        self.set_status_led(false);
        plan
    }

    fn read_sensor(&mut self) -> Reading {
        match self.board.sensor.measure() {
            Ok(measurement) => {
                info!(
                    "sensor: {:.2}°C, {:.2}% rH",
                    measurement.temperature_celsius, measurement.relative_humidity
                );
                measurement.into()
            }
            Err(err) => {
                error!("sensor: read failed ({err}), check wiring");
                Reading::EMPTY
            }
        }
    }

    fn connect(&mut self) -> Result<B::Client, CycleError> {
        info!("wifi: connecting");
        let network = &mut self.network;
        self.config
            .retry
            .wifi()
            .run("wifi", &mut self.board.delay, |_| network.associate())
            .map_err(|attempts| CycleError::NetworkUnavailable { attempts })?;

        info!("mqtt: connecting to {}", self.config.mqtt.url());
        let broker = &mut self.broker;
        self.config
            .retry
            .broker()
            .run("mqtt", &mut self.board.delay, |_| broker.connect())
            .map_err(|attempts| CycleError::BrokerUnavailable { attempts })
    }

    fn announce<C: Publisher>(&mut self, client: &mut C) {
        let mqtt = &self.config.mqtt;

        for (index, entity) in ENTITIES.iter().enumerate() {
            if index > 0 {
                self.board.delay.delay_ms(DISCOVERY_PAUSE_MS);
            }

            let topic = entity.topic(&mqtt.discovery_prefix);
            match serde_json::to_string(&entity.payload(&mqtt.state_topic)) {
                Ok(payload) => publish(client, &topic, &payload, mqtt.retain_discovery),
                Err(err) => error!("mqtt: cannot encode discovery for {topic}: {err}"),
            }
        }
    }

    fn publish_state<C: Publisher>(&mut self, client: &mut C, reading: &Reading, motion: Motion) {
        info!("mqtt: publishing state, motion {motion}");
        match StatePayload::new(reading, motion).to_json() {
            Ok(payload) => publish(client, &self.config.mqtt.state_topic, &payload, false),
            Err(err) => error!("mqtt: cannot encode state: {err}"),
        }
    }

    /// Busy-poll the motion pin until it drops or the configured timeout hits.
    fn wait_for_release(&mut self) -> Release {
        let motion = &self.config.motion;
        let poll_ms = motion.poll_interval_ms.max(1);
        let timeout_ms = motion.release_timeout_secs.map(|s| s.saturating_mul(1_000));
        let mut waited_ms: u64 = 0;

        info!("motion: waiting for the pin to go low");
        loop {
            match self.board.motion_pin.is_high() {
                Ok(false) => {
                    info!("motion: released after {waited_ms} ms");
                    return Release::Released;
                }
                Ok(true) => {}
                Err(err) => {
                    error!("motion: reading pin failed: {:?}", err);
                    return Release::PinError;
                }
            }

            if timeout_ms.is_some_and(|limit| waited_ms >= limit) {
                return Release::TimedOut;
            }

            self.board.delay.delay_ms(poll_ms);
            waited_ms += u64::from(poll_ms);
        }
    }

    fn set_status_led(&mut self, on: bool) {
        let led = &mut self.board.status_led;
        let result = if on { led.set_high() } else { led.set_low() };
        if let Err(err) = result {
            warn!("status led: {:?}", err);
        }
    }

    fn sleep_plan(&self, outcome: CycleOutcome) -> SleepPlan {
        let sleep = &self.config.sleep;
        let secs = match outcome {
            CycleOutcome::Published => sleep.interval_secs,
            CycleOutcome::Failed(_) => sleep.error_interval_secs,
        };

        SleepPlan {
            timer: Duration::from_secs(secs),
            wake_pin_mask: sleep.wake_pin_mask,
            outcome,
        }
    }
}

fn publish<C: Publisher>(client: &mut C, topic: &str, payload: &str, retain: bool) {
    debug!("mqtt: {topic} <- {payload}");
    if let Err(err) = client.publish(topic, payload.as_bytes(), retain) {
        error!("mqtt: publish to {topic} failed: {err}");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use embedded_hal::digital::{ErrorKind, ErrorType};

    use super::*;
    use crate::reading::Measurement;

    type Log = Rc<RefCell<Vec<Published>>>;

    #[derive(Clone, Debug, PartialEq)]
    struct Published {
        topic: String,
        payload: String,
        retain: bool,
    }

    struct FakeSensor(Option<Measurement>);

    impl EnvironmentSensor for FakeSensor {
        type Error = &'static str;

        fn measure(&mut self) -> Result<Measurement, Self::Error> {
            self.0.ok_or("no ack")
        }
    }

    /// Fails the first `failures` attempts.
    #[derive(Default)]
    struct Flaky {
        failures: u32,
        attempts: Rc<RefCell<u32>>,
    }

    impl Flaky {
        fn failing(failures: u32) -> Self {
            Self {
                failures,
                ..Default::default()
            }
        }

        fn attempt(&mut self) -> Result<(), &'static str> {
            let mut attempts = self.attempts.borrow_mut();
            *attempts += 1;
            if *attempts <= self.failures {
                Err("timeout")
            } else {
                Ok(())
            }
        }
    }

    impl Network for Flaky {
        type Error = &'static str;

        fn associate(&mut self) -> Result<(), Self::Error> {
            self.attempt()
        }
    }

    struct FakeBroker {
        link: Flaky,
        log: Log,
        publish_fails: bool,
    }

    impl Broker for FakeBroker {
        type Client = FakeClient;
        type Error = &'static str;

        fn connect(&mut self) -> Result<FakeClient, Self::Error> {
            self.link.attempt()?;
            Ok(FakeClient {
                log: self.log.clone(),
                fails: self.publish_fails,
            })
        }
    }

    /// Records every publish, then reports it as failed when `fails` is set.
    struct FakeClient {
        log: Log,
        fails: bool,
    }

    impl Publisher for FakeClient {
        type Error = &'static str;

        fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error> {
            self.log.borrow_mut().push(Published {
                topic: topic.into(),
                payload: String::from_utf8(payload.to_vec()).unwrap(),
                retain,
            });
            if self.fails {
                Err("outbox full")
            } else {
                Ok(())
            }
        }
    }

    /// Replays the given levels, then stays at the last one. A broken pin
    /// fails every read.
    struct FakePin {
        levels: VecDeque<bool>,
        broken: bool,
        reads: Rc<RefCell<u32>>,
    }

    impl FakePin {
        fn new(levels: &[bool], broken: bool) -> Self {
            Self {
                levels: levels.iter().copied().collect(),
                broken,
                reads: Rc::default(),
            }
        }
    }

    impl ErrorType for FakePin {
        type Error = ErrorKind;
    }

    impl InputPin for FakePin {
        fn is_high(&mut self) -> Result<bool, ErrorKind> {
            *self.reads.borrow_mut() += 1;
            if self.broken {
                return Err(ErrorKind::Other);
            }
            let level = if self.levels.len() > 1 {
                self.levels.pop_front()
            } else {
                self.levels.front().copied()
            };
            Ok(level.unwrap_or(false))
        }

        fn is_low(&mut self) -> Result<bool, ErrorKind> {
            self.is_high().map(|high| !high)
        }
    }

    /// Records every level it is driven to; a broken LED still records but
    /// reports failure.
    #[derive(Default)]
    struct FakeLed {
        states: Rc<RefCell<Vec<bool>>>,
        broken: bool,
    }

    impl FakeLed {
        fn set(&mut self, on: bool) -> Result<(), ErrorKind> {
            self.states.borrow_mut().push(on);
            if self.broken {
                Err(ErrorKind::Other)
            } else {
                Ok(())
            }
        }
    }

    impl ErrorType for FakeLed {
        type Error = ErrorKind;
    }

    impl OutputPin for FakeLed {
        fn set_low(&mut self) -> Result<(), ErrorKind> {
            self.set(false)
        }

        fn set_high(&mut self) -> Result<(), ErrorKind> {
            self.set(true)
        }
    }

    /// Records each pause in milliseconds.
    #[derive(Default)]
    struct FakeDelay(Rc<RefCell<Vec<u32>>>);

    impl DelayNs for FakeDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.0.borrow_mut().push(ns / 1_000_000);
        }

        fn delay_ms(&mut self, ms: u32) {
            self.0.borrow_mut().push(ms);
        }
    }

    struct Rig {
        config: Config,
        sensor: Option<Measurement>,
        pin: Vec<bool>,
        network_failures: u32,
        broker_failures: u32,
        publish_fails: bool,
        pin_broken: bool,
        led_broken: bool,
    }

    struct Run {
        plan: SleepPlan,
        published: Vec<Published>,
        network_attempts: u32,
        broker_attempts: u32,
        pin_reads: u32,
        led: Vec<bool>,
        delays: Vec<u32>,
        slept_ms: u64,
    }

    impl Rig {
        fn new() -> Self {
            let mut config = Config::default();
            config.wifi.ssid = "garden".into();

            Self {
                config,
                sensor: Some(Measurement {
                    temperature_celsius: 19.5,
                    relative_humidity: 40.0,
                }),
                pin: vec![false],
                network_failures: 0,
                broker_failures: 0,
                publish_fails: false,
                pin_broken: false,
                led_broken: false,
            }
        }

        fn run(&self, wake_cause: WakeCause) -> Run {
            let log = Log::default();
            let network = Flaky::failing(self.network_failures);
            let network_attempts = network.attempts.clone();
            let broker = FakeBroker {
                link: Flaky::failing(self.broker_failures),
                log: log.clone(),
                publish_fails: self.publish_fails,
            };
            let broker_attempts = broker.link.attempts.clone();
            let pin = FakePin::new(&self.pin, self.pin_broken);
            let pin_reads = pin.reads.clone();
            let led = FakeLed {
                broken: self.led_broken,
                ..Default::default()
            };
            let led_states = led.states.clone();
            let delay = FakeDelay::default();
            let slept = delay.0.clone();

            let board = Board {
                sensor: FakeSensor(self.sensor),
                motion_pin: pin,
                status_led: led,
                delay,
            };
            let plan = BootCycle::new(&self.config, board, network, broker).run(wake_cause);

            let published = log.borrow().clone();
            let network_attempts = *network_attempts.borrow();
            let broker_attempts = *broker_attempts.borrow();
            let pin_reads = *pin_reads.borrow();
            let led = led_states.borrow().clone();
            let delays = slept.borrow().clone();
            let slept_ms = delays.iter().map(|&ms| u64::from(ms)).sum();

            Run {
                plan,
                published,
                network_attempts,
                broker_attempts,
                pin_reads,
                led,
                delays,
                slept_ms,
            }
        }
    }

    impl Run {
        fn states(&self) -> Vec<&str> {
            self.published
                .iter()
                .filter(|p| p.topic.ends_with("/action"))
                .map(|p| p.payload.as_str())
                .collect()
        }
    }

    #[test]
    fn timer_wake_publishes_discovery_then_one_state() {
        let run = Rig::new().run(WakeCause::Timer);

        assert_eq!(run.plan.outcome, CycleOutcome::Published);
        assert_eq!(run.published.len(), 4);
        assert!(run.published[..3]
            .iter()
            .all(|p| p.topic.starts_with("homeassistant/") && p.topic.ends_with("/config")));
        assert_eq!(
            run.states(),
            [r#"{"temperature":19.5,"humidity":40.0,"motionDetected":"ON"}"#]
        );
        assert_eq!(run.pin_reads, 0);
    }

    #[test]
    fn timer_wake_ignores_a_high_pin() {
        let mut rig = Rig::new();
        rig.pin = vec![true];

        let run = rig.run(WakeCause::Timer);

        assert_eq!(run.states().len(), 1);
        assert_eq!(run.pin_reads, 0);
    }

    #[test]
    fn other_wake_behaves_like_timer() {
        let run = Rig::new().run(WakeCause::Other);

        assert_eq!(run.states().len(), 1);
        assert_eq!(run.pin_reads, 0);
    }

    #[test]
    fn pin_wake_publishes_off_once_pin_drops() {
        let mut rig = Rig::new();
        rig.pin = vec![true, true, true, false];

        let run = rig.run(WakeCause::ExternalPin);

        let states = run.states();
        assert_eq!(states.len(), 2);
        assert!(states[0].ends_with(r#""motionDetected":"ON"}"#));
        assert!(states[1].ends_with(r#""motionDetected":"OFF"}"#));
        assert_eq!(run.pin_reads, 4);
    }

    #[test]
    fn stuck_pin_times_out_without_off() {
        let mut rig = Rig::new();
        rig.pin = vec![true];
        rig.config.motion.poll_interval_ms = 100;
        rig.config.motion.release_timeout_secs = Some(2);

        let run = rig.run(WakeCause::ExternalPin);

        assert_eq!(run.states().len(), 1);
        assert_eq!(run.pin_reads, 21);
        assert_eq!(run.plan.outcome, CycleOutcome::Published);
        assert!(run.slept_ms >= 2_000);
    }

    #[test]
    fn discovery_goes_out_once_before_any_state() {
        let mut rig = Rig::new();
        rig.pin = vec![true, false];

        let run = rig.run(WakeCause::ExternalPin);

        let first_state = run
            .published
            .iter()
            .position(|p| p.topic == rig.config.mqtt.state_topic)
            .unwrap();
        let discovery: Vec<_> = run
            .published
            .iter()
            .enumerate()
            .filter(|(_, p)| p.topic.ends_with("/config"))
            .collect();

        assert_eq!(discovery.len(), 3);
        assert!(discovery.iter().all(|(index, _)| *index < first_state));
        assert!(discovery.iter().all(|(_, p)| !p.retain));
    }

    #[test]
    fn zero_temperature_is_left_out() {
        let mut rig = Rig::new();
        rig.sensor = Some(Measurement {
            temperature_celsius: 0.0,
            relative_humidity: 23.5,
        });

        let run = rig.run(WakeCause::Timer);

        assert_eq!(run.states(), [r#"{"humidity":23.5,"motionDetected":"ON"}"#]);
    }

    #[test]
    fn sensor_failure_still_publishes_motion() {
        let mut rig = Rig::new();
        rig.sensor = None;

        let run = rig.run(WakeCause::Timer);

        assert_eq!(run.states(), [r#"{"motionDetected":"ON"}"#]);
    }

    #[test]
    fn network_recovers_on_fifth_attempt() {
        let mut rig = Rig::new();
        rig.network_failures = 4;

        let run = rig.run(WakeCause::Timer);

        assert_eq!(run.network_attempts, 5);
        assert_eq!(run.plan.outcome, CycleOutcome::Published);
        assert_eq!(run.states().len(), 1);
    }

    #[test]
    fn network_gives_up_after_five_attempts() {
        let mut rig = Rig::new();
        rig.network_failures = 5;

        let run = rig.run(WakeCause::ExternalPin);

        assert_eq!(run.network_attempts, 5);
        assert_eq!(run.broker_attempts, 0);
        assert!(run.published.is_empty());
        assert_eq!(run.pin_reads, 0);
        assert_eq!(
            run.plan.outcome,
            CycleOutcome::Failed(CycleError::NetworkUnavailable { attempts: 5 })
        );
        assert_eq!(run.slept_ms, 4 * 1_000);
    }

    #[test]
    fn broker_gives_up_after_five_attempts() {
        let mut rig = Rig::new();
        rig.broker_failures = 5;

        let run = rig.run(WakeCause::Timer);

        assert_eq!(run.network_attempts, 1);
        assert_eq!(run.broker_attempts, 5);
        assert!(run.published.is_empty());
        assert_eq!(
            run.plan.outcome,
            CycleOutcome::Failed(CycleError::BrokerUnavailable { attempts: 5 })
        );
        assert_eq!(run.slept_ms, 4 * 5_000);
    }

    #[test]
    fn broker_recovers_on_fifth_attempt() {
        let mut rig = Rig::new();
        rig.broker_failures = 4;

        let run = rig.run(WakeCause::Timer);

        assert_eq!(run.broker_attempts, 5);
        assert_eq!(run.plan.outcome, CycleOutcome::Published);
    }

    #[test]
    fn every_path_arms_timer_and_wake_pins() {
        let mut failing_network = Rig::new();
        failing_network.network_failures = 5;
        let mut failing_broker = Rig::new();
        failing_broker.broker_failures = 5;

        let plans = [
            Rig::new().run(WakeCause::Timer).plan,
            Rig::new().run(WakeCause::ExternalPin).plan,
            failing_network.run(WakeCause::Timer).plan,
            failing_broker.run(WakeCause::Other).plan,
        ];

        for plan in plans {
            assert_eq!(plan.timer, Duration::from_secs(600));
            assert_eq!(plan.wake_pin_mask, 0x8004);
        }
    }

    #[test]
    fn error_path_uses_error_interval() {
        let mut rig = Rig::new();
        rig.broker_failures = 5;
        rig.config.sleep.interval_secs = 600;
        rig.config.sleep.error_interval_secs = 900;

        assert_eq!(rig.run(WakeCause::Timer).plan.timer, Duration::from_secs(900));
        rig.broker_failures = 0;
        assert_eq!(rig.run(WakeCause::Timer).plan.timer, Duration::from_secs(600));
    }

    #[test]
    fn led_is_lit_while_awake_and_off_before_sleep() {
        let mut failing = Rig::new();
        failing.network_failures = 5;

        assert_eq!(Rig::new().run(WakeCause::Timer).led, [true, false]);
        assert_eq!(failing.run(WakeCause::Timer).led, [true, false]);
    }

    #[test]
    fn retained_discovery_when_configured() {
        let mut rig = Rig::new();
        rig.config.mqtt.retain_discovery = true;
        rig.config.mqtt.discovery_prefix = "ha".into();

        let run = rig.run(WakeCause::Timer);

        assert!(run.published[..3]
            .iter()
            .all(|p| p.retain && p.topic.starts_with("ha/")));
        assert!(!run.published[3].retain);
    }

    #[test]
    fn pauses_between_discovery_and_before_sleep() {
        let run = Rig::new().run(WakeCause::Timer);

        assert_eq!(run.delays, [5, 5, 10, 10]);
    }

    #[test]
    fn failed_publishes_do_not_stop_the_cycle() {
        let mut rig = Rig::new();
        rig.publish_fails = true;
        rig.pin = vec![true, false];

        let run = rig.run(WakeCause::ExternalPin);

        assert_eq!(run.plan.outcome, CycleOutcome::Published);
        assert_eq!(run.published.len(), 5);
        assert_eq!(run.states().len(), 2);
        assert_eq!(run.plan.timer, Duration::from_secs(600));
    }

    #[test]
    fn unreadable_pin_skips_off() {
        let mut rig = Rig::new();
        rig.pin_broken = true;

        let run = rig.run(WakeCause::ExternalPin);

        assert_eq!(run.plan.outcome, CycleOutcome::Published);
        assert_eq!(run.pin_reads, 1);
        assert_eq!(run.published.len(), 4);
        assert!(run.states()[0].ends_with(r#""motionDetected":"ON"}"#));
    }

    #[test]
    fn broken_led_does_not_stop_the_cycle() {
        let mut rig = Rig::new();
        rig.led_broken = true;

        let run = rig.run(WakeCause::Timer);

        assert_eq!(run.plan.outcome, CycleOutcome::Published);
        assert_eq!(run.led, [true, false]);
        assert_eq!(run.states().len(), 1);
    }
}
