//! Ranges a simulated source and charts where it really is against where
//! the controller thinks it is.

mod gui;

use std::{
    collections::VecDeque,
    error::Error,
    process,
    sync::{mpsc, Arc, Mutex},
    thread,
};

use beaconranger::{
    actuator::LogActuator,
    args::MonitorArgs,
    clock::{Clock, MonotonicClock},
    config::RangingConfig,
    dummy_rig::DummyRig,
    localizer::BearingSense,
    ranging_cycle::{CycleOutcome, RangingController},
    Point,
};
use clap::Parser;
use gui::engage_gui;
use log::error;

/// How many past cycles stay on the chart.
const TRAIL: usize = 12;

#[derive(Debug, Default)]
struct Trail {
    truth: VecDeque<Point>,
    estimates: VecDeque<Point>,
}

impl Trail {
    fn push(queue: &mut VecDeque<Point>, point: Point) {
        if queue.len() == TRAIL {
            queue.pop_front();
        }
        queue.push_back(point);
    }
}

fn main() {
    env_logger::init();
    if let Err(e) = run(MonitorArgs::parse()) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(args: MonitorArgs) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => RangingConfig::from_path(path)?,
        None => RangingConfig::default(),
    };
    // The chart is only meaningful if the bearing faces the source.
    config.bearing_sense = BearingSense::Source;

    let scene = &args.scene;
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let mut builder = DummyRig::builder()
        .config(&config)
        .source_bearing(scene.bearing)
        .source_range(scene.range)
        .jitter(scene.jitter)
        .dropout(scene.dropout)
        .echo(scene.echo)
        .drift(scene.drift);
    if let Some(seed) = scene.seed {
        builder = builder.seed(seed);
    }
    let rig = builder.build(Arc::clone(&clock));
    let mut controller = RangingController::new(config, clock, rig, LogActuator::new())?;

    let trail = Arc::new(Mutex::new(Trail::default()));
    let worker_trail = Arc::clone(&trail);
    let (stop_tx, stop_rx) = mpsc::channel::<()>();

    let worker = thread::spawn(move || {
        while let Err(mpsc::TryRecvError::Empty) = stop_rx.try_recv() {
            let source = controller.hardware().source();
            let outcome = controller.run_cycle();
            let mut trail = worker_trail.lock().unwrap();
            Trail::push(&mut trail.truth, source.point());
            if let CycleOutcome::Resolved(result) = outcome {
                // Distance is a pseudo-distance, not the range, so the
                // estimate is drawn at the true range.
                Trail::push(
                    &mut trail.estimates,
                    Point::from_polar(result.angle_degrees, source.range),
                );
            }
        }
    });

    let truth_trail = Arc::clone(&trail);
    let estimate_trail = Arc::clone(&trail);
    let res = engage_gui(
        Box::new(move || truth_trail.lock().unwrap().truth.iter().copied().collect()),
        Box::new(move || estimate_trail.lock().unwrap().estimates.iter().copied().collect()),
        scene.range.max(0.1) * 1.25,
    );

    let _ = stop_tx.send(());
    if worker.join().is_err() {
        error!("Ranging worker panicked");
    }
    res
}
