//! A [`BeaconHardware`] with nothing behind it but a worker thread and some
//! geometry. Good for demos, the monitor, and testing the controller
//! against edges that really do arrive from another thread.
//!
//! The rig pretends there is a source somewhere around the receiver ring.
//! Every pulse, it works out how long sound takes from the source to each
//! receiver, sleeps that long, and reports the edge. It can add jitter, lose
//! receivers, and ring with a late echo on every receiver.

use crate::arrival_buffer::EdgeSink;
use crate::beacon_hardware::{BeaconHardware, Degree, HardwareError, Radian, ReceiverId};
use crate::clock::{Clock, Timestamp};
use crate::config::RangingConfig;
use crate::localizer::normalize_degrees;
use crate::Point;

use log::{debug, warn};
use rand::prelude::*;
use std::f64::consts::PI;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// How long after the real arrival a simulated echo shows up.
const ECHO_DELAY: Duration = Duration::from_millis(3);

/// Where the simulated source is, relative to the centre of the ring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualSource {
    /// Degrees counterclockwise from the x axis.
    pub bearing: Degree,
    /// Meters from the array centre.
    pub range: f64,
}

impl VirtualSource {
    /// The source as a point in the plane of the ring.
    pub fn point(&self) -> Point {
        Point::from_polar(self.bearing, self.range)
    }
}

/// The parts of the simulation that can change while it runs.
#[derive(Debug, Clone, Copy)]
struct Scene {
    source: VirtualSource,
    jitter: f64,
    dropout: f64,
}

/// The parts that cannot.
#[derive(Debug, Clone)]
struct Physics {
    receiver_angles: Vec<Radian>,
    array_radius: f64,
    speed_mps: f64,
    echo: bool,
    drift: Degree,
}

impl Physics {
    /// Edges for one pulse, as offsets from the moment of emission, sorted
    /// by when they happen.
    fn edges(&self, scene: &Scene, rng: &mut impl Rng) -> Vec<(ReceiverId, Duration)> {
        let source = scene.source.point();
        let mut edges = Vec::new();
        for (id, angle) in self.receiver_angles.iter().enumerate() {
            if scene.dropout > 0.0 && rng.gen::<f64>() < scene.dropout {
                continue;
            }
            let receiver = Point {
                x: self.array_radius * angle.cos(),
                y: self.array_radius * angle.sin(),
            };
            let noise = if scene.jitter > 0.0 {
                rng.gen_range(-scene.jitter..scene.jitter)
            } else {
                0.0
            };
            let flight = (source.abs_dist(&receiver) / self.speed_mps + noise).max(0.0);
            let flight = Duration::from_secs_f64(flight);
            edges.push((id, flight));
            if self.echo {
                edges.push((id, flight + ECHO_DELAY));
            }
        }
        edges.sort_by_key(|&(_, at)| at);
        edges
    }
}

enum Signal {
    Attach(EdgeSink),
    Pulse { at: Timestamp, instant: Instant },
    Stop,
}

/// Simulated [`BeaconHardware`]. Edges are computed from the geometry of a
/// [`VirtualSource`] and delivered from a worker thread. Built with
/// [`DummyRig::builder`]; the worker is stopped on drop.
pub struct DummyRig {
    handle: Option<thread::JoinHandle<()>>,
    tx: mpsc::Sender<Signal>,
    clock: Arc<dyn Clock>,
    scene: Arc<Mutex<Scene>>,
}

impl DummyRig {
    /// A builder with a three receiver ring and a source 2 m out at 0°.
    pub fn builder() -> DummyRigBuilder {
        DummyRigBuilder::default()
    }

    /// Where the source is right now.
    pub fn source(&self) -> VirtualSource {
        self.scene.lock().unwrap().source
    }

    /// Moves the source to `bearing`, from the next pulse on.
    pub fn set_source_bearing(&self, bearing: Degree) {
        self.scene.lock().unwrap().source.bearing = normalize_degrees(bearing);
    }

    /// Moves the source to `range` meters out, from the next pulse on.
    pub fn set_source_range(&self, range: f64) {
        self.scene.lock().unwrap().source.range = range.max(0.0);
    }

    /// Uniform timing noise of up to `jitter` seconds either way.
    pub fn set_jitter(&self, jitter: f64) {
        self.scene.lock().unwrap().jitter = jitter.abs();
    }

    /// Chance, per receiver per pulse, that the receiver hears nothing.
    pub fn set_dropout(&self, dropout: f64) {
        self.scene.lock().unwrap().dropout = dropout.clamp(0.0, 1.0);
    }

    /// Stops the worker thread and waits for it.
    pub fn stop(&mut self) {
        // The worker may already be gone, in which case there is nobody to
        // tell and nothing to wait for.
        let _ = self.tx.send(Signal::Stop);
        if let Some(thread) = self.handle.take() {
            if thread.join().is_err() {
                warn!("Simulated rig worker panicked");
            }
        }
    }

    fn send(&self, signal: Signal) -> Result<(), HardwareError> {
        self.tx
            .send(signal)
            .map_err(|_| HardwareError::HardwareUnavailable("simulated rig is stopped".into()))
    }
}

impl Drop for DummyRig {
    fn drop(&mut self) {
        self.stop();
    }
}

impl BeaconHardware for DummyRig {
    fn attach(&mut self, sink: EdgeSink) -> Result<(), HardwareError> {
        self.send(Signal::Attach(sink))
    }

    fn emit(&mut self, frequency_hz: f64, duration: Duration) -> Result<(), HardwareError> {
        let at = self.clock.now();
        debug!("Simulated pulse at {}: {} Hz for {:?}", at, frequency_hz, duration);
        self.send(Signal::Pulse {
            at,
            instant: Instant::now(),
        })
    }
}

fn run_worker(
    rx: mpsc::Receiver<Signal>,
    physics: Physics,
    scene: Arc<Mutex<Scene>>,
    mut rng: StdRng,
) {
    let mut sink: Option<EdgeSink> = None;
    while let Ok(signal) = rx.recv() {
        match signal {
            Signal::Attach(new_sink) => sink = Some(new_sink),
            Signal::Stop => break,
            Signal::Pulse { at, instant } => {
                let Some(sink) = &sink else {
                    warn!("Simulated pulse with no edge sink attached");
                    continue;
                };
                let current = *scene.lock().unwrap();
                for (id, flight) in physics.edges(&current, &mut rng) {
                    let due = instant + flight;
                    let now = Instant::now();
                    if due > now {
                        spin_sleep::sleep(due - now);
                    }
                    sink.on_edge(id, at + flight);
                }
                if physics.drift != 0.0 {
                    let mut scene = scene.lock().unwrap();
                    scene.source.bearing = normalize_degrees(scene.source.bearing + physics.drift);
                }
            }
        }
    }
}

/// Configures a [`DummyRig`].
pub struct DummyRigBuilder {
    physics: Physics,
    scene: Scene,
    seed: Option<u64>,
}

impl Default for DummyRigBuilder {
    fn default() -> Self {
        Self {
            physics: Physics {
                receiver_angles: vec![0.0, 2.0 * PI / 3.0, 4.0 * PI / 3.0],
                array_radius: 0.1,
                speed_mps: 343.0,
                echo: false,
                drift: 0.0,
            },
            scene: Scene {
                source: VirtualSource {
                    bearing: 0.0,
                    range: 2.0,
                },
                jitter: 0.0,
                dropout: 0.0,
            },
            seed: None,
        }
    }
}

impl DummyRigBuilder {
    /// Takes the ring layout and the speed of sound from `config`.
    pub fn config(mut self, config: &RangingConfig) -> Self {
        self.physics.receiver_angles = config.receiver_angles.clone();
        self.physics.array_radius = config.array_radius_m;
        self.physics.speed_mps = config.propagation_speed_mps;
        self
    }

    /// Where the receivers sit on the ring.
    pub fn receiver_angles(mut self, angles: Vec<Radian>) -> Self {
        self.physics.receiver_angles = angles;
        self
    }

    /// Radius of the ring, in meters.
    pub fn array_radius(mut self, radius: f64) -> Self {
        self.physics.array_radius = radius;
        self
    }

    /// Speed of sound, in meters per second.
    pub fn speed(mut self, speed_mps: f64) -> Self {
        self.physics.speed_mps = speed_mps;
        self
    }

    /// Initial bearing of the source.
    pub fn source_bearing(mut self, bearing: Degree) -> Self {
        self.scene.source.bearing = normalize_degrees(bearing);
        self
    }

    /// Initial range of the source, in meters.
    pub fn source_range(mut self, range: f64) -> Self {
        self.scene.source.range = range.max(0.0);
        self
    }

    /// See [`DummyRig::set_jitter`].
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.scene.jitter = jitter.abs();
        self
    }

    /// See [`DummyRig::set_dropout`].
    pub fn dropout(mut self, dropout: f64) -> Self {
        self.scene.dropout = dropout.clamp(0.0, 1.0);
        self
    }

    /// Every receiver hears the pulse a second time, shortly after the first.
    pub fn echo(mut self, echo: bool) -> Self {
        self.physics.echo = echo;
        self
    }

    /// Turns the source by `drift` degrees after every pulse.
    pub fn drift(mut self, drift: Degree) -> Self {
        self.physics.drift = drift;
        self
    }

    /// Makes the jitter and dropouts repeatable.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Starts the worker. Edges are stamped with `clock`, which must be the
    /// controller's clock too.
    pub fn build(self, clock: Arc<dyn Clock>) -> DummyRig {
        let (tx, rx) = mpsc::channel::<Signal>();
        let scene = Arc::new(Mutex::new(self.scene));
        let th_scene = Arc::clone(&scene);
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let physics = self.physics;

        let handle = thread::spawn(move || run_worker(rx, physics, th_scene, rng));

        DummyRig {
            handle: Some(handle),
            tx,
            clock,
            scene,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::LogActuator;
    use crate::clock::MonotonicClock;
    use crate::localizer::BearingSense;
    use crate::ranging_cycle::{CycleOutcome, RangingController};

    fn config() -> RangingConfig {
        RangingConfig {
            bearing_sense: BearingSense::Source,
            cycle_timeout_seconds: 0.5,
            inter_cycle_delay_seconds: 0.0,
            ..Default::default()
        }
    }

    fn angular_gap(a: Degree, b: Degree) -> Degree {
        let d = normalize_degrees(a - b);
        d.min(360.0 - d)
    }

    #[test]
    fn source_points() {
        let source = VirtualSource {
            bearing: 90.0,
            range: 2.0,
        };
        assert!(source.point().abs_dist(&Point { x: 0.0, y: 2.0 }) < 0.0001);
    }

    #[test]
    fn nearest_receiver_hears_first() {
        let physics = DummyRigBuilder::default().physics;
        let scene = Scene {
            source: VirtualSource {
                bearing: 120.0,
                range: 3.0,
            },
            jitter: 0.0,
            dropout: 0.0,
        };
        let edges = physics.edges(&scene, &mut StdRng::seed_from_u64(1));
        assert_eq!(edges.len(), 3);
        assert_eq!(edges[0].0, 1);
    }

    #[test]
    fn controller_finds_the_source() {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        for bearing in [10.0, 75.0, 180.0, 250.0, 333.0] {
            let rig = DummyRig::builder()
                .config(&config())
                .source_bearing(bearing)
                .build(clock.clone());
            let mut ctl =
                RangingController::new(config(), clock.clone(), rig, LogActuator::new()).unwrap();
            let outcome = ctl.run_cycle();
            let CycleOutcome::Resolved(b) = outcome else {
                panic!("expected a bearing for {}, got {:?}", bearing, outcome);
            };
            assert!(
                angular_gap(b.angle_degrees, bearing) < 2.0,
                "source at {} solved to {}",
                bearing,
                b.angle_degrees
            );
            ctl.hardware_mut().stop();
        }
    }

    #[test]
    fn echoes_do_not_move_the_bearing() {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let rig = DummyRig::builder()
            .config(&config())
            .source_bearing(40.0)
            .echo(true)
            .build(clock.clone());
        let mut ctl = RangingController::new(config(), clock, rig, LogActuator::new()).unwrap();
        for outcome in ctl.by_ref().take(3) {
            let CycleOutcome::Resolved(b) = outcome else {
                panic!("expected a bearing, got {:?}", outcome);
            };
            assert!(angular_gap(b.angle_degrees, 40.0) < 2.0);
        }
    }

    #[test]
    fn total_dropout_times_out() {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let config = RangingConfig {
            cycle_timeout_seconds: 0.05,
            ..config()
        };
        let rig = DummyRig::builder()
            .config(&config)
            .dropout(1.0)
            .build(clock.clone());
        let mut ctl = RangingController::new(config, clock, rig, LogActuator::new()).unwrap();
        assert_eq!(
            ctl.run_cycle(),
            CycleOutcome::TimedOut {
                missing: vec![0, 1, 2]
            }
        );
        assert_eq!(ctl.actuator().last(), None);
    }

    #[test]
    fn drift_turns_the_source() {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let rig = DummyRig::builder()
            .config(&config())
            .source_bearing(350.0)
            .drift(15.0)
            .build(clock.clone());
        let mut ctl = RangingController::new(config(), clock, rig, LogActuator::new()).unwrap();
        ctl.run_cycle();
        ctl.run_cycle();
        // The second pulse may still be turning the source when the cycle
        // resolves, so wait for the worker before looking.
        ctl.hardware_mut().stop();
        assert!((ctl.hardware().source().bearing - 20.0).abs() < 1e-9);
    }

    #[test]
    fn stopped_rig_is_unavailable() {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let mut rig = DummyRig::builder().build(clock);
        rig.stop();
        assert!(matches!(
            rig.emit(15000.0, Duration::from_millis(100)),
            Err(HardwareError::HardwareUnavailable(_))
        ));
    }
}
