//! Runs one boot cycle of the sensor node on the desktop.
//!
//! Usage: `motion-sensor-sim [scenario.json]`. Without an argument the bundled
//! scenario is used. Set `RUST_LOG=debug` to see the payloads being built.

mod devices;

use anyhow::Context;
use motion_sensor_common::{
    Board, BootCycle, Config, CycleOutcome, Measurement, SleepPlan, WakeCause,
};
use serde::Deserialize;

use devices::{Sent, SimBroker, SimDelay, SimLed, SimLink, SimMotionPin, SimSensor};

/// What the simulated hardware does during the cycle.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
struct Scenario {
    wake_cause: Wake,
    /// `null` simulates a missing sensor.
    measurement: Option<Measurement>,
    network_failures: u32,
    broker_failures: u32,
    /// Number of polls the motion pin stays high after a pin wake.
    motion_high_polls: u32,
    /// Actually wait for retry backoffs and polls instead of only counting them.
    realtime: bool,
    config: Config,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            wake_cause: Wake::Timer,
            measurement: Some(Measurement::default()),
            network_failures: 0,
            broker_failures: 0,
            motion_high_polls: 0,
            realtime: false,
            config: Config::default(),
        }
    }
}

#[derive(Deserialize, Clone, Copy, Debug)]
#[serde(rename_all = "snake_case")]
enum Wake {
    Timer,
    ExternalPin,
    Other,
}

impl From<Wake> for WakeCause {
    fn from(wake: Wake) -> Self {
        match wake {
            Wake::Timer => WakeCause::Timer,
            Wake::ExternalPin => WakeCause::ExternalPin,
            Wake::Other => WakeCause::Other,
        }
    }
}

/// Result of a simulated cycle.
struct Report {
    plan: SleepPlan,
    sent: Vec<(String, String)>,
    network_attempts: u32,
    broker_attempts: u32,
    delayed: std::time::Duration,
}

struct Simulator {
    scenario: Scenario,
}

impl Simulator {
    fn new(scenario: Scenario) -> anyhow::Result<Self> {
        scenario
            .config
            .validate()
            .context("scenario carries an invalid configuration")?;

        Ok(Self { scenario })
    }

    /// Load a scenario from `path`, or the bundled one.
    fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let json = match path {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("cannot read scenario {path}"))?,
            None => std::include_str!("./scenario.json").to_owned(),
        };

        let scenario = serde_json::from_str::<Scenario>(&json).context("malformed scenario")?;
        Self::new(scenario)
    }

    fn run(&self) -> Report {
        let scenario = &self.scenario;

        let mut network = SimLink {
            failures: scenario.network_failures,
            ..Default::default()
        };
        let sent = Sent::default();
        let mut broker = SimBroker {
            link: SimLink {
                failures: scenario.broker_failures,
                ..Default::default()
            },
            sent: sent.clone(),
        };
        let mut delay = SimDelay {
            realtime: scenario.realtime,
            ..Default::default()
        };

        let board = Board {
            sensor: SimSensor(scenario.measurement),
            motion_pin: SimMotionPin {
                high_polls: scenario.motion_high_polls,
            },
            status_led: SimLed,
            delay: &mut delay,
        };

        let plan = BootCycle::new(&scenario.config, board, &mut network, &mut broker)
            .run(scenario.wake_cause.into());

        let sent = sent.borrow().clone();
        Report {
            plan,
            sent,
            network_attempts: network.attempts,
            broker_attempts: broker.link.attempts,
            delayed: delay.elapsed,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let path = std::env::args().nth(1);
    let simulator = Simulator::load(path.as_deref())?;
    let report = simulator.run();

    match report.plan.outcome {
        CycleOutcome::Published => log::info!("cycle published {} messages", report.sent.len()),
        CycleOutcome::Failed(err) => log::warn!("cycle failed: {err}"),
    }
    log::info!(
        "wifi attempts {}, broker attempts {}, time spent waiting {:?}",
        report.network_attempts,
        report.broker_attempts,
        report.delayed
    );
    log::info!(
        "deep sleep: timer {:?}, ext1 mask {:#x}",
        report.plan.timer,
        report.plan.wake_pin_mask
    );

    Ok(())
}

#[test]
fn test_bundled_scenario() {
    let report = Simulator::load(None).unwrap().run();

    assert_eq!(report.plan.outcome, CycleOutcome::Published);
    assert_eq!(report.network_attempts, 2);
    assert_eq!(report.broker_attempts, 1);

    // three discovery documents, then ON and OFF
    assert_eq!(report.sent.len(), 5);
    assert!(report.sent[3].1.contains(r#""motionDetected":"ON""#));
    assert!(report.sent[4].1.contains(r#""motionDetected":"OFF""#));
}

#[test]
fn test_broker_outage() {
    let mut scenario: Scenario =
        serde_json::from_str(r#"{ "config": { "wifi": { "ssid": "x" } }, "broker_failures": 9 }"#)
            .unwrap();
    scenario.config.sleep.error_interval_secs = 1200;

    let report = Simulator::new(scenario).unwrap().run();

    assert!(report.sent.is_empty());
    assert_eq!(report.broker_attempts, 5);
    assert_eq!(report.plan.timer, std::time::Duration::from_secs(1200));
    assert_eq!(report.delayed, std::time::Duration::from_secs(20));
}

#[test]
fn test_rejects_config_without_ssid() {
    assert!(Simulator::new(Scenario::default()).is_err());
}
