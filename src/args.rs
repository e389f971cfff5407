//! Commandline argument parser using clap for BeaconRanger

use crate::config::RangingConfig;
use crate::localizer::BearingSense;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Arguments of the `ranger` binary.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct RangerArgs {
    #[command(subcommand)]
    /// Which hardware to range with, simulated or real
    pub command: RigCommand,

    /// RON file holding the ranging configuration. Defaults are used when
    /// no file is given
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Stop after this many cycles instead of running until a key is
    /// pressed
    #[arg(short = 'n', long)]
    pub cycles: Option<u64>,

    /// File to append one record per cycle to
    #[arg(short, long)]
    pub log: Option<PathBuf>,

    /// Which way the reported bearing points, overriding the configuration
    #[arg(long, value_enum)]
    pub sense: Option<SenseArg>,
}

/// The hardware a `ranger` run uses.
#[derive(Debug, Subcommand, Clone)]
pub enum RigCommand {
    /// Range a virtual source through a simulated rig
    #[command(about)]
    Simulate(SimulateCommand),

    /// Range with a capture microcontroller on a serial port
    #[command(about)]
    Serial(SerialCommand),
}

/// The virtual source and its imperfections.
#[derive(Debug, Args, Clone)]
pub struct SimulateCommand {
    /// Bearing of the virtual source, in degrees counterclockwise from the
    /// first receiver
    #[arg(short, long, default_value_t = 30.0, allow_negative_numbers = true)]
    pub bearing: f64,

    /// Distance from the array centre to the virtual source, in meters
    #[arg(short, long, default_value_t = 2.0)]
    pub range: f64,

    /// Largest timing error added to each edge, in seconds
    #[arg(short, long, default_value_t = 0.0)]
    pub jitter: f64,

    /// Chance that a receiver misses a pulse, between 0 and 1
    #[arg(short, long, default_value_t = 0.0)]
    pub dropout: f64,

    /// Have every receiver hear a late echo of each pulse
    #[arg(short, long)]
    pub echo: bool,

    /// How far the source moves around the array after each pulse, in
    /// degrees
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub drift: f64,

    /// Seed for the simulation's random numbers
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Where to find the capture microcontroller.
#[derive(Debug, Args, Clone)]
pub struct SerialCommand {
    /// Serial device to open. A selector is shown when this is omitted
    #[arg(short, long)]
    pub device: Option<PathBuf>,

    /// Baud rate of the serial device
    #[arg(short, long, default_value_t = 115200)]
    pub baud: u32,
}

/// [BearingSense], as spelled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SenseArg {
    /// The raw projection of the arrival times
    Projection,
    /// Toward the beacon
    Source,
}

impl From<SenseArg> for BearingSense {
    fn from(value: SenseArg) -> Self {
        match value {
            SenseArg::Projection => BearingSense::Projection,
            SenseArg::Source => BearingSense::Source,
        }
    }
}

impl RangerArgs {
    /// Applies the command line overrides to a loaded configuration.
    pub fn apply_to(&self, config: &mut RangingConfig) {
        if let Some(sense) = self.sense {
            config.bearing_sense = sense.into();
        }
    }
}

/// Arguments of the `monitor` binary.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct MonitorArgs {
    /// RON file holding the ranging configuration. Defaults are used when
    /// no file is given
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// The virtual source to chart.
    #[command(flatten)]
    pub scene: SimulateCommand,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulate_defaults() {
        let args = RangerArgs::try_parse_from(["ranger", "simulate"]).unwrap();
        assert!(args.config.is_none());
        assert!(args.cycles.is_none());
        match args.command {
            RigCommand::Simulate(sim) => {
                assert_eq!(sim.bearing, 30.0);
                assert_eq!(sim.range, 2.0);
                assert!(!sim.echo);
                assert!(sim.seed.is_none());
            }
            other => panic!("expected simulate, got {:?}", other),
        }
    }

    #[test]
    fn global_options_and_serial() {
        let args = RangerArgs::try_parse_from([
            "ranger",
            "--config",
            "rig.ron",
            "-n",
            "5",
            "--log",
            "out.ron",
            "--sense",
            "source",
            "serial",
            "--device",
            "/dev/ttyACM0",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("rig.ron")));
        assert_eq!(args.cycles, Some(5));
        assert_eq!(args.log, Some(PathBuf::from("out.ron")));
        match &args.command {
            RigCommand::Serial(serial) => {
                assert_eq!(serial.device, Some(PathBuf::from("/dev/ttyACM0")));
                assert_eq!(serial.baud, 115200);
            }
            other => panic!("expected serial, got {:?}", other),
        }

        let mut config = RangingConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.bearing_sense, BearingSense::Source);
    }

    #[test]
    fn negative_bearing_and_drift() {
        let args = RangerArgs::try_parse_from([
            "ranger", "simulate", "-b", "-45", "--drift", "-2.5", "-e", "--seed", "7",
        ])
        .unwrap();
        let RigCommand::Simulate(sim) = args.command else {
            panic!("expected simulate");
        };
        assert_eq!(sim.bearing, -45.0);
        assert_eq!(sim.drift, -2.5);
        assert!(sim.echo);
        assert_eq!(sim.seed, Some(7));
    }

    #[test]
    fn monitor_takes_scene_options() {
        let args = MonitorArgs::try_parse_from(["monitor", "--range", "4", "--drift", "3"]).unwrap();
        assert_eq!(args.scene.range, 4.0);
        assert_eq!(args.scene.drift, 3.0);
    }
}
