//! Runs ranging cycles against a simulated or a serial rig, printing each
//! outcome and optionally appending it to a log.

use beaconranger::{
    actuator::{Actuator, LogActuator},
    args::{RangerArgs, RigCommand, SerialCommand, SimulateCommand},
    beacon_hardware::BeaconHardware,
    clock::{Clock, MonotonicClock},
    config::RangingConfig,
    dummy_rig::DummyRig,
    gui::{device_selector, run_until_keypress},
    outcome_log::OutcomeLog,
    ranging_cycle::{CycleOutcome, RangingController},
    serial_rig::SerialRig,
};

use clap::Parser;
use log::{error, info, warn};
use serial2::SerialPort;
use std::{error::Error, fs::File, io::BufWriter, process, sync::Arc};

type Log = Option<OutcomeLog<BufWriter<File>>>;

// Example:
// RUST_LOG=info cargo run --bin ranger --
//                            --config  rig.ron
//                            --cycles  10
//                            --log     outcomes.ron
//                            simulate  --bearing 120 --jitter 0.00001

fn main() {
    env_logger::init();
    let args = RangerArgs::parse();

    if let Err(e) = run(args) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(args: RangerArgs) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => RangingConfig::from_path(path)?,
        None => RangingConfig::default(),
    };
    args.apply_to(&mut config);
    config.validate()?;

    let log = match &args.log {
        Some(path) => Some(OutcomeLog::append_to(path)?),
        None => None,
    };
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());

    match &args.command {
        RigCommand::Simulate(sim) => {
            let rig = simulated_rig(sim, &config, Arc::clone(&clock));
            let controller = RangingController::new(config, clock, rig, LogActuator::new())?;
            drive(controller, log, args.cycles)
        }
        RigCommand::Serial(serial) => {
            let Some(rig) = serial_rig(serial, Arc::clone(&clock))? else {
                info!("No device selected");
                return Ok(());
            };
            let actuator = rig.actuator()?;
            let controller = RangingController::new(config, clock, rig, actuator)?;
            drive(controller, log, args.cycles)
        }
    }
}

fn simulated_rig(sim: &SimulateCommand, config: &RangingConfig, clock: Arc<dyn Clock>) -> DummyRig {
    let mut builder = DummyRig::builder()
        .config(config)
        .source_bearing(sim.bearing)
        .source_range(sim.range)
        .jitter(sim.jitter)
        .dropout(sim.dropout)
        .echo(sim.echo)
        .drift(sim.drift);
    if let Some(seed) = sim.seed {
        builder = builder.seed(seed);
    }
    builder.build(clock)
}

fn serial_rig(
    serial: &SerialCommand,
    clock: Arc<dyn Clock>,
) -> Result<Option<SerialRig>, Box<dyn Error>> {
    let device = match &serial.device {
        Some(device) => device.clone(),
        None => match device_selector(SerialPort::available_ports()?)? {
            Some(device) => device,
            None => return Ok(None),
        },
    };
    info!("Opening {} at {} baud", device.to_string_lossy(), serial.baud);
    Ok(Some(SerialRig::open(&device, serial.baud, clock)?))
}

/// Runs `cycles` cycles, or until a key is pressed if no count is given.
fn drive<Hw, Act>(
    mut controller: RangingController<Hw, Act>,
    mut log: Log,
    cycles: Option<u64>,
) -> Result<(), Box<dyn Error>>
where
    Hw: BeaconHardware + Send + 'static,
    Act: Actuator + Send + 'static,
{
    match cycles {
        Some(n) => {
            for (cycle, outcome) in (1..).zip(controller.by_ref().take(n as usize)) {
                println!("#{} {}", cycle, outcome);
                record(&mut log, cycle, &outcome);
            }
        }
        None => {
            run_until_keypress("Ranging", (controller, log), |(controller, log)| {
                let outcome = controller.run_cycle();
                let cycle = controller.cycles_run();
                record(log, cycle, &outcome);
                format!("#{} {}", cycle, outcome)
            })?;
        }
    }
    Ok(())
}

fn record(log: &mut Log, cycle: u64, outcome: &CycleOutcome) {
    if let Some(log) = log {
        if let Err(e) = log.record(cycle, outcome) {
            warn!("Could not log cycle {}: {}", cycle, e);
        }
    }
}
