//! The Ranging Cycle Controller.
//!
//! One cycle goes
//!
//! ```text
//! Idle -> Emitting -> AwaitingArrivals -> Resolved | TimedOut -> Idle
//! ```
//!
//! and always ends back in `Idle`, whatever happened along the way. Only a
//! bad configuration stops the controller, and that can only happen when it
//! is built.

use crate::actuator::Actuator;
use crate::arrival_buffer::{ArrivalBuffer, EdgeSink};
use crate::beacon_hardware::{BeaconHardware, HardwareError, ReceiverId};
use crate::clock::{Clock, Timestamp};
use crate::config::{ConfigError, RangingConfig};
use crate::localizer::{localize, BearingResult, Estimate};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fmt::Display,
    sync::Arc,
    time::Instant,
};

/// Where a [`RangingController`] is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Between cycles.
    Idle,
    /// The buffer is reset and the pulse is going out.
    Emitting,
    /// Waiting for every receiver, up to the timeout.
    AwaitingArrivals,
    /// Every receiver reported in time.
    Resolved,
    /// The timeout passed first.
    TimedOut,
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CycleOutcome {
    /// Every receiver reported and the arrivals gave a direction.
    Resolved(BearingResult),
    /// Every receiver reported, but at the same time, so there is a range
    /// and no direction.
    Indeterminate {
        /// Mean pseudo-distance of the receivers.
        distance_meters: f64,
    },
    /// The timeout passed before these receivers reported.
    TimedOut {
        /// Receivers with no arrival, in ascending order.
        missing: Vec<ReceiverId>,
    },
    /// The pulse could not be emitted.
    Aborted(HardwareError),
}

impl Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleOutcome::Resolved(b) => write!(
                f,
                "bearing {:.2} degrees, distance {:.3} m",
                b.angle_degrees, b.distance_meters
            ),
            CycleOutcome::Indeterminate { distance_meters } => write!(
                f,
                "bearing indeterminate, distance {:.3} m",
                distance_meters
            ),
            CycleOutcome::TimedOut { missing } => {
                write!(f, "timed out waiting for receivers {:?}", missing)
            }
            CycleOutcome::Aborted(error) => write!(f, "aborted: {}", error),
        }
    }
}

/// Reasons a controller cannot be built.
#[derive(Debug)]
pub enum RangingError {
    /// The configuration or clock was rejected.
    Config(ConfigError),
    /// The hardware could not be attached.
    Hardware(HardwareError),
}

impl Display for RangingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangingError::Config(error) => write!(f, "configuration error: {}", error),
            RangingError::Hardware(error) => write!(f, "hardware error: {}", error),
        }
    }
}

impl Error for RangingError {}

impl From<ConfigError> for RangingError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<HardwareError> for RangingError {
    fn from(value: HardwareError) -> Self {
        Self::Hardware(value)
    }
}

/// Runs ranging cycles against a [`BeaconHardware`] and points an
/// [`Actuator`] at every bearing it finds.
///
/// Iterating over the controller runs one cycle per item, forever.
pub struct RangingController<Hw, Act>
where
    Hw: BeaconHardware,
    Act: Actuator,
{
    config: RangingConfig,
    clock: Arc<dyn Clock>,
    buffer: Arc<ArrivalBuffer>,
    hardware: Hw,
    actuator: Act,
    state: CycleState,
    cycles: u64,
}

impl<Hw, Act> RangingController<Hw, Act>
where
    Hw: BeaconHardware,
    Act: Actuator,
{
    /// Validates everything, then attaches the hardware to a fresh arrival
    /// buffer.
    pub fn new(
        config: RangingConfig,
        clock: Arc<dyn Clock>,
        mut hardware: Hw,
        actuator: Act,
    ) -> Result<Self, RangingError> {
        config.validate()?;
        if !clock.is_monotonic() {
            return Err(ConfigError::NonMonotonicClock.into());
        }
        if Instant::now().checked_add(config.cycle_timeout()).is_none() {
            return Err(ConfigError::OutOfRange(
                "cycle_timeout_seconds",
                config.cycle_timeout_seconds,
            )
            .into());
        }

        let buffer = Arc::new(ArrivalBuffer::new(config.receiver_count()));
        hardware.attach(EdgeSink::new(Arc::clone(&buffer)))?;

        Ok(Self {
            config,
            clock,
            buffer,
            hardware,
            actuator,
            state: CycleState::Idle,
            cycles: 0,
        })
    }

    /// The validated configuration.
    pub fn config(&self) -> &RangingConfig {
        &self.config
    }

    /// Always `Idle` between calls to [`RangingController::run_cycle`].
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// How many cycles have been started.
    pub fn cycles_run(&self) -> u64 {
        self.cycles
    }

    /// The hardware the controller drives.
    pub fn hardware(&self) -> &Hw {
        &self.hardware
    }

    /// The hardware, mutably, to change it between cycles.
    pub fn hardware_mut(&mut self) -> &mut Hw {
        &mut self.hardware
    }

    /// The actuator the controller points.
    pub fn actuator(&self) -> &Act {
        &self.actuator
    }

    /// Another handle on the arrival buffer, for capture paths that are not
    /// part of the hardware.
    pub fn edge_sink(&self) -> EdgeSink {
        EdgeSink::new(Arc::clone(&self.buffer))
    }

    fn enter(&mut self, next: CycleState) {
        debug!("Cycle {}: {:?} -> {:?}", self.cycles, self.state, next);
        self.state = next;
    }

    /// Runs one whole cycle, including the inter-cycle delay, and returns
    /// how it ended. The controller is `Idle` again when this returns.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        debug_assert_eq!(self.state, CycleState::Idle);
        self.cycles += 1;

        self.buffer.reset();
        self.enter(CycleState::Emitting);
        let start = self.clock.now();
        let deadline = Instant::now() + self.config.cycle_timeout();

        let outcome = match self
            .hardware
            .emit(self.config.pulse_frequency_hz, self.config.pulse_duration())
        {
            Ok(()) => {
                debug!(
                    "Cycle {}: emitted {} Hz for {:?} at {}",
                    self.cycles,
                    self.config.pulse_frequency_hz,
                    self.config.pulse_duration(),
                    start
                );
                self.await_arrivals(start, deadline)
            }
            Err(error) => {
                warn!("Cycle {}: could not emit pulse: {}", self.cycles, error);
                self.buffer.close();
                CycleOutcome::Aborted(error)
            }
        };

        info!("Cycle {}: {}", self.cycles, outcome);

        if let CycleOutcome::Resolved(bearing) = &outcome {
            // The pointer always faces the emitter, whichever way bearings
            // are reported.
            let toward = self.config.bearing_sense.toward_source(bearing.angle_degrees);
            if let Err(error) = self.actuator.point(toward) {
                warn!("Cycle {}: actuator error: {}", self.cycles, error);
            }
        }

        spin_sleep::sleep(self.config.inter_cycle_delay());
        self.enter(CycleState::Idle);
        outcome
    }

    fn await_arrivals(&mut self, start: Timestamp, deadline: Instant) -> CycleOutcome {
        self.enter(CycleState::AwaitingArrivals);
        let record = self.buffer.finish(deadline);
        match record.arrivals() {
            Some(arrivals) => {
                self.enter(CycleState::Resolved);
                self.solve(start, &arrivals)
            }
            None => {
                self.enter(CycleState::TimedOut);
                CycleOutcome::TimedOut {
                    missing: record.missing(),
                }
            }
        }
    }

    fn solve(&self, start: Timestamp, arrivals: &[Timestamp]) -> CycleOutcome {
        let timeout = self.config.cycle_timeout();
        for (id, arrival) in arrivals.iter().enumerate() {
            let late = arrival
                .checked_duration_since(start)
                .map_or(false, |dt| dt > timeout);
            if late {
                warn!(
                    "Cycle {}: receiver {} arrived at {}, later than the {:?} timeout",
                    self.cycles, id, arrival, timeout
                );
            }
        }

        let solution = localize(
            start,
            arrivals,
            &self.config.receiver_angles,
            self.config.propagation_speed_mps,
            self.config.bearing_sense,
        );

        for id in &solution.clamped {
            warn!(
                "Cycle {}: receiver {} arrived at {}, before the pulse at {}; using zero time of flight",
                self.cycles, id, arrivals[*id], start
            );
        }

        match solution.estimate {
            Estimate::Bearing(bearing) => CycleOutcome::Resolved(bearing),
            Estimate::Indeterminate { distance_meters } => {
                warn!(
                    "Cycle {}: all receivers heard the pulse at once, bearing is indeterminate",
                    self.cycles
                );
                CycleOutcome::Indeterminate { distance_meters }
            }
        }
    }
}

impl<Hw, Act> Iterator for RangingController<Hw, Act>
where
    Hw: BeaconHardware,
    Act: Actuator,
{
    type Item = CycleOutcome;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.run_cycle())
    }
}
