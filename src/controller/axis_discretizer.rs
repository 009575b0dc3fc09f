//! Analog stick → four synthetic direction buttons
//!
//! The poll loop samples both stick axes at roughly 100 Hz, centres them on the
//! calibration point and runs each direction through a latch with separate
//! activation and release thresholds:
//!
//! ```text
//!   value ─────────────────────────────────────────────►
//!            -activate  -release   0   release  activate
//!   down ◄──────┤          │                              (latched until > -release)
//!   up                                  │          ├──────► (latched until < release)
//! ```
//!
//! Latch edges are fed into the shared [`InputRouter`] with the synthetic pins
//! 1000-1003. Bus errors skip the iteration, the loop retries on the next tick.

use chrono::Local;
use std::fmt;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::input_state::LogicalButton;
use super::pin_map::PinId;
use super::transition::InputRouter;
use crate::hw::ads1015::{AdcChannel, AdcError, AnalogChannelReader};
use crate::hw::RegisterBus;

/// Thresholds and calibration for the stick
#[derive(Clone, Debug)]
pub struct AxisSettings {
    pub poll_interval: Duration,
    pub calibration_center: i32,
    pub activate_threshold: i32,
    pub release_threshold: i32,
    pub x_channel: AdcChannel,
    pub y_channel: AdcChannel,
    /// The bonnet's y axis reads higher when pushed down
    pub invert_y: bool,
}

impl Default for AxisSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            calibration_center: 800,
            activate_threshold: 600,
            release_threshold: 600,
            x_channel: AdcChannel::Ain1,
            y_channel: AdcChannel::Ain0,
            invert_y: true,
        }
    }
}

/// Calibrated, signed stick position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalogSample {
    pub x: i32,
    pub y: i32,
}

impl AnalogSample {
    pub fn from_raw(raw_x: u16, raw_y: u16, settings: &AxisSettings) -> Self {
        let center = settings.calibration_center;
        let x = i32::from(raw_x) - center;
        let y = if settings.invert_y {
            center - i32::from(raw_y)
        } else {
            i32::from(raw_y) - center
        };
        Self { x, y }
    }
}

/// Current latch per direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisActivationState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

/// The four stick directions, each backed by a synthetic pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StickDirection {
    Up,
    Down,
    Left,
    Right,
}

impl StickDirection {
    pub fn pin(self) -> PinId {
        match self {
            StickDirection::Up => PinId::ANALOG_UP,
            StickDirection::Down => PinId::ANALOG_DOWN,
            StickDirection::Left => PinId::ANALOG_LEFT,
            StickDirection::Right => PinId::ANALOG_RIGHT,
        }
    }

    pub fn button(self) -> LogicalButton {
        match self {
            StickDirection::Up => LogicalButton::Up,
            StickDirection::Down => LogicalButton::Down,
            StickDirection::Left => LogicalButton::Left,
            StickDirection::Right => LogicalButton::Right,
        }
    }
}

impl fmt::Display for StickDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.button(), f)
    }
}

/// One latch edge produced by a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectionEdge {
    pub direction: StickDirection,
    pub active: bool,
}

impl DirectionEdge {
    pub fn pin(&self) -> PinId {
        self.direction.pin()
    }
}

/// Hysteresis latches for the four directions
#[derive(Debug, Clone)]
pub struct AxisDiscretizer {
    activate: i32,
    release: i32,
    state: AxisActivationState,
}

impl AxisDiscretizer {
    pub fn new(activate_threshold: i32, release_threshold: i32) -> Self {
        Self {
            activate: activate_threshold,
            release: release_threshold,
            state: AxisActivationState::default(),
        }
    }

    pub fn state(&self) -> AxisActivationState {
        self.state
    }

    /// Feed one sample, returning the latch edges it caused in up, down, left, right order
    pub fn step(&mut self, sample: AnalogSample) -> Vec<DirectionEdge> {
        let mut edges = Vec::new();
        let (activate, release) = (self.activate, self.release);

        // Positive direction of an axis
        let mut latch_high = |latched: &mut bool, value: i32, direction: StickDirection| {
            if !*latched && value > activate {
                *latched = true;
                edges.push(DirectionEdge { direction, active: true });
            } else if *latched && value < release {
                *latched = false;
                edges.push(DirectionEdge { direction, active: false });
            }
        };
        latch_high(&mut self.state.up, sample.y, StickDirection::Up);
        latch_high(&mut self.state.down, -sample.y, StickDirection::Down);
        latch_high(&mut self.state.left, -sample.x, StickDirection::Left);
        latch_high(&mut self.state.right, sample.x, StickDirection::Right);

        edges
    }
}

/// Outcome of one poll iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Sampled {
        sample: AnalogSample,
        edges: Vec<DirectionEdge>,
    },
    Skipped,
}

/// Owner of the ADC for the lifetime of the poll loop
pub struct AnalogPoller<B: RegisterBus> {
    reader: AnalogChannelReader<B>,
    discretizer: AxisDiscretizer,
    router: InputRouter,
    settings: AxisSettings,
}

impl<B: RegisterBus + 'static> AnalogPoller<B> {
    pub fn new(reader: AnalogChannelReader<B>, router: InputRouter, settings: AxisSettings) -> Self {
        debug!("Creating analog poller with settings: {:?}", settings);
        Self {
            reader,
            discretizer: AxisDiscretizer::new(
                settings.activate_threshold,
                settings.release_threshold,
            ),
            router,
            settings,
        }
    }

    fn read_sample(&mut self) -> Result<AnalogSample, AdcError> {
        let raw_y = self.reader.read_channel(self.settings.y_channel)?;
        let raw_x = self.reader.read_channel(self.settings.x_channel)?;
        Ok(AnalogSample::from_raw(raw_x, raw_y, &self.settings))
    }

    /// Sample both axes once and route any latch edges
    pub fn poll_once(&mut self) -> PollOutcome {
        let sample = match self.read_sample() {
            Ok(sample) => sample,
            Err(e) => {
                debug!("Skipping analog iteration: {}", e);
                return PollOutcome::Skipped;
            }
        };

        let edges = self.discretizer.step(sample);
        for edge in &edges {
            debug!(
                "Analog {} {} at ({}, {})",
                edge.direction,
                if edge.active { "activated" } else { "released" },
                sample.x,
                sample.y
            );
            self.router.apply(edge.pin(), edge.active);
        }

        PollOutcome::Sampled { sample, edges }
    }

    /// Poll until `shutdown` is cancelled, then hand the reader back
    pub fn run_poll_loop(mut self, shutdown: CancellationToken) -> AnalogChannelReader<B> {
        info!(
            "Starting analog poll loop every {:?}",
            self.settings.poll_interval
        );

        let mut iterations: u64 = 0;
        let mut skipped: u64 = 0;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(30);

        while !shutdown.is_cancelled() {
            if self.poll_once() == PollOutcome::Skipped {
                skipped += 1;
            }
            iterations += 1;

            let now = Local::now();
            if now - last_log_time > log_interval {
                info!(
                    "Analog poll stats: {} iterations, {} skipped in last {} seconds",
                    iterations,
                    skipped,
                    log_interval.num_seconds()
                );
                if skipped * 2 > iterations {
                    warn!("More than half of the analog reads failed, check the ADC wiring");
                }
                iterations = 0;
                skipped = 0;
                last_log_time = now;
            }

            std::thread::sleep(self.settings.poll_interval);
        }

        info!("Analog poll loop stopped");
        self.reader
    }

    /// Run the poll loop on its own thread
    pub fn spawn(
        self,
        shutdown: CancellationToken,
    ) -> std::io::Result<JoinHandle<AnalogChannelReader<B>>> {
        std::thread::Builder::new()
            .name("analog-poll".to_string())
            .spawn(move || self.run_poll_loop(shutdown))
            .inspect_err(|e| error!("Failed to spawn analog poll thread: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::transition::tests::router_with;
    use crate::hw::ads1015::tests::FakeAds1015;
    use crate::controller::pin_map::PinMap;
    use crate::mapping::keyboard::tests::RecordingKeySink;
    use std::sync::Arc;

    fn sample(x: i32, y: i32) -> AnalogSample {
        AnalogSample { x, y }
    }

    #[test]
    fn crossing_and_returning_fires_exactly_two_edges() {
        let mut axis = AxisDiscretizer::new(600, 600);

        let mut edges = Vec::new();
        for x in [0, 300, 650, 700, 650, 599, 200, 0] {
            edges.extend(axis.step(sample(x, 0)));
        }

        assert_eq!(
            edges,
            vec![
                DirectionEdge {
                    direction: StickDirection::Right,
                    active: true
                },
                DirectionEdge {
                    direction: StickDirection::Right,
                    active: false
                },
            ]
        );
    }

    #[test]
    fn noise_inside_the_band_fires_nothing() {
        let mut axis = AxisDiscretizer::new(600, 600);
        axis.step(sample(0, 700));
        axis.step(sample(0, 0));

        for y in [-550, 420, -10, 599, -599, 600, -600] {
            assert!(axis.step(sample(0, y)).is_empty(), "y = {}", y);
        }
        assert_eq!(axis.state(), AxisActivationState::default());
    }

    #[test]
    fn release_threshold_below_activation_adds_hysteresis() {
        let mut axis = AxisDiscretizer::new(600, 400);

        assert_eq!(axis.step(sample(-650, 0)).len(), 1);
        assert!(axis.state().left);
        // Still beyond the release point
        assert!(axis.step(sample(-450, 0)).is_empty());
        assert!(axis.step(sample(-610, 0)).is_empty());

        let edges = axis.step(sample(-350, 0));
        assert_eq!(
            edges,
            vec![DirectionEdge {
                direction: StickDirection::Left,
                active: false
            }]
        );
    }

    #[test]
    fn opposite_directions_are_never_latched_together() {
        let mut axis = AxisDiscretizer::new(600, 600);
        for (x, y) in [(700, 700), (-700, -700), (700, -700), (0, 0), (-900, 900)] {
            axis.step(sample(x, y));
            let state = axis.state();
            assert!(!(state.up && state.down));
            assert!(!(state.left && state.right));
        }
    }

    #[test]
    fn diagonal_reports_edges_in_fixed_order() {
        let mut axis = AxisDiscretizer::new(600, 600);
        let edges = axis.step(sample(-700, 700));
        let directions: Vec<_> = edges.iter().map(|e| e.direction).collect();
        assert_eq!(directions, vec![StickDirection::Up, StickDirection::Left]);
    }

    #[test]
    fn each_direction_owns_its_synthetic_pin() {
        let pins = PinMap::with_analog_directions();
        for direction in [
            StickDirection::Up,
            StickDirection::Down,
            StickDirection::Left,
            StickDirection::Right,
        ] {
            let edge = DirectionEdge {
                direction,
                active: true,
            };
            assert!(edge.pin().is_synthetic());
            assert_eq!(pins.button_for(edge.pin()), Some(direction.button()));
        }
        assert_eq!(StickDirection::Right.to_string(), "right");
    }

    #[test]
    fn raw_samples_are_centred_and_y_inverted() {
        let settings = AxisSettings::default();
        assert_eq!(AnalogSample::from_raw(1450, 800, &settings), sample(650, 0));
        assert_eq!(AnalogSample::from_raw(800, 0, &settings), sample(0, 800));

        let upright = AxisSettings {
            invert_y: false,
            ..AxisSettings::default()
        };
        assert_eq!(AnalogSample::from_raw(800, 0, &upright), sample(0, -800));
    }

    #[test]
    fn raw_right_push_activates_only_right() {
        let sink = Arc::new(RecordingKeySink::default());
        let router = router_with(sink.clone());
        let store = router.store().clone();
        // Ain0 carries y, Ain1 carries x
        let bus = FakeAds1015::with_raw([800, 1450, 0, 0]);
        let reader = AnalogChannelReader::new(bus, Duration::from_millis(100));
        let mut poller = AnalogPoller::new(reader, router, AxisSettings::default());

        let outcome = poller.poll_once();

        assert_eq!(
            outcome,
            PollOutcome::Sampled {
                sample: sample(650, 0),
                edges: vec![DirectionEdge {
                    direction: StickDirection::Right,
                    active: true
                }],
            }
        );
        let snapshot = store.snapshot();
        assert!(snapshot.right);
        assert!(!snapshot.up && !snapshot.down && !snapshot.left);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn bus_failure_skips_the_iteration() {
        let sink = Arc::new(RecordingKeySink::default());
        let router = router_with(sink);
        let store = router.store().clone();
        let mut bus = FakeAds1015::with_raw([800, 1450, 0, 0]);
        bus.failing_reads.push_back(0x00);
        let reader = AnalogChannelReader::new(bus, Duration::from_millis(100));
        let mut poller = AnalogPoller::new(reader, router, AxisSettings::default());

        assert_eq!(poller.poll_once(), PollOutcome::Skipped);
        assert!(!store.snapshot().right);

        // Next tick reads fine again
        assert!(matches!(poller.poll_once(), PollOutcome::Sampled { .. }));
        assert!(store.snapshot().right);
    }

    #[test]
    fn poll_thread_stops_on_cancel_and_returns_the_bus() {
        let sink = Arc::new(RecordingKeySink::default());
        let router = router_with(sink);
        let store = router.store().clone();
        let bus = FakeAds1015::with_raw([100, 800, 0, 0]);
        let reader = AnalogChannelReader::new(bus, Duration::from_millis(100));
        let poller = AnalogPoller::new(reader, router, AxisSettings::default());

        let shutdown = CancellationToken::new();
        let handle = poller.spawn(shutdown.clone()).unwrap();
        while !store.snapshot().up {
            std::thread::sleep(Duration::from_millis(1));
        }
        shutdown.cancel();

        let bus = handle.join().unwrap().into_inner();
        assert!(!bus.writes.is_empty());
    }
}
