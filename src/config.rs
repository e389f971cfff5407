//! Configuration for a ranging controller, read from and written to RON.
//!
//! A complete file looks like this:
//!
//! ```text
//! (
//!     receiver_angles: [0.0, 2.0943951023931953, 4.1887902047863905],
//!     propagation_speed_mps: 343.0,
//!     cycle_timeout_seconds: 1.0,
//!     inter_cycle_delay_seconds: 1.0,
//!     pulse_frequency_hz: 15000.0,
//!     pulse_duration_seconds: 0.1,
//!     bearing_sense: Projection,
//!     array_radius_m: 0.1,
//! )
//! ```
//!
//! Any field left out takes its value from [`RangingConfig::default`].
//! Receiver angles are in radians; everything else is in SI units.

use crate::beacon_hardware::Radian;
use crate::localizer::BearingSense;

use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    f64::consts::PI,
    fmt,
    fs::File,
    io::{Read, Write},
    path::Path,
    time::Duration,
};

/// Two receiver angles closer than this (in radians, after wrapping) are the
/// same angle.
const ANGLE_EPSILON: Radian = 1e-9;

/// Everything a [`crate::ranging_cycle::RangingController`] needs to
/// know about the rig it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangingConfig {
    /// Where each receiver sits on the ring. At least three, all distinct.
    pub receiver_angles: Vec<Radian>,
    /// Speed of sound in the medium, in meters per second.
    pub propagation_speed_mps: f64,
    /// How long a cycle waits for every receiver before giving up.
    pub cycle_timeout_seconds: f64,
    /// Quiet time after each cycle, to let echoes die down.
    pub inter_cycle_delay_seconds: f64,
    /// Tone of the emitted pulse.
    pub pulse_frequency_hz: f64,
    /// Length of the emitted pulse.
    pub pulse_duration_seconds: f64,
    /// Which way reported bearings face.
    pub bearing_sense: BearingSense,
    /// Radius of the receiver ring. Only the simulated rig uses it.
    pub array_radius_m: f64,
}

impl Default for RangingConfig {
    fn default() -> Self {
        Self {
            receiver_angles: vec![0.0, 2.0 * PI / 3.0, 4.0 * PI / 3.0],
            propagation_speed_mps: 343.0,
            cycle_timeout_seconds: 1.0,
            inter_cycle_delay_seconds: 1.0,
            pulse_frequency_hz: 15000.0,
            pulse_duration_seconds: 0.1,
            bearing_sense: BearingSense::Projection,
            array_radius_m: 0.1,
        }
    }
}

/// Everything that can be wrong with a configuration. All of these are fatal.
#[derive(Debug)]
pub enum ConfigError {
    /// Fewer than three receivers were configured.
    TooFewReceivers(usize),

    /// Two receivers share an angle.
    DuplicateReceiverAngle(usize, usize),

    /// A field is NaN or infinite.
    NonFinite(&'static str),

    /// A field that must be strictly positive is not.
    NonPositive(&'static str, f64),

    /// A field that must not be negative is.
    Negative(&'static str, f64),

    /// A time field too large to be represented as a duration, or to be
    /// added to the current time.
    OutOfRange(&'static str, f64),

    /// The clock handed to the controller can go backwards.
    NonMonotonicClock,

    /// Returned when io fails when reading or writing config files.
    IoError(std::io::Error),

    /// Returned when serialization fails.
    RonError(ron::Error),

    /// Returned when deserialization fails.
    RonSpannedError(ron::de::SpannedError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ConfigError as CE;
        let msg = match self {
            CE::TooFewReceivers(n) => {
                Cow::from(format!("need at least 3 receivers, {} configured", n))
            }
            CE::DuplicateReceiverAngle(a, b) => {
                Cow::from(format!("receivers {} and {} share an angle", a, b))
            }
            CE::NonFinite(field) => Cow::from(format!("{} is not a finite number", field)),
            CE::NonPositive(field, v) => Cow::from(format!("{} must be positive, got {}", field, v)),
            CE::Negative(field, v) => Cow::from(format!("{} must not be negative, got {}", field, v)),
            CE::OutOfRange(field, v) => Cow::from(format!("{} is out of range, got {}", field, v)),
            CE::NonMonotonicClock => Cow::from("the clock source is not monotonic"),
            CE::IoError(error) => Cow::from(format!("io error: {}", error)),
            CE::RonError(error) => Cow::from(format!("ron error: {}", error)),
            CE::RonSpannedError(error) => Cow::from(format!("ron spanning error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

fn finite(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::NonFinite(field))
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if finite(field, value)? > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive(field, value))
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if finite(field, value)? >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative(field, value))
    }
}

fn duration(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::OutOfRange(field, value))
}

impl RangingConfig {
    /// Read a [RangingConfig] from the path provided and validate it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut handle = File::open(path)?;
        Self::from_file(&mut handle)
    }

    /// Read a [RangingConfig] from the [Read]able object provided and
    /// validate it.
    pub fn from_file(file: &mut impl Read) -> Result<Self, ConfigError> {
        let mut text = String::new();
        file.read_to_string(&mut text)?;
        Self::from_ron_str(&text)
    }

    /// Parse a [RangingConfig] from RON text and validate it.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: RangingConfig =
            ron::de::from_str(text).map_err(ConfigError::RonSpannedError)?;
        config.validate()?;
        Ok(config)
    }

    /// The config as pretty-printed RON.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(ConfigError::RonError)
    }

    /// Write out a [RangingConfig] to the path provided.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let mut handle = File::create(path)?;
        handle.write_all(self.to_ron_string()?.as_bytes())?;
        Ok(())
    }

    /// Checks every field. A config that passes can be turned into durations
    /// and fed to the solver without further checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = self.receiver_angles.len();
        if n < 3 {
            return Err(ConfigError::TooFewReceivers(n));
        }
        for &angle in &self.receiver_angles {
            finite("receiver_angles", angle)?;
        }
        for i in 0..n {
            for j in (i + 1)..n {
                let gap = (self.receiver_angles[i] - self.receiver_angles[j]).rem_euclid(2.0 * PI);
                if gap < ANGLE_EPSILON || 2.0 * PI - gap < ANGLE_EPSILON {
                    return Err(ConfigError::DuplicateReceiverAngle(i, j));
                }
            }
        }

        positive("propagation_speed_mps", self.propagation_speed_mps)?;
        positive("cycle_timeout_seconds", self.cycle_timeout_seconds)?;
        positive("pulse_frequency_hz", self.pulse_frequency_hz)?;
        positive("pulse_duration_seconds", self.pulse_duration_seconds)?;
        non_negative("inter_cycle_delay_seconds", self.inter_cycle_delay_seconds)?;
        non_negative("array_radius_m", self.array_radius_m)?;

        duration("cycle_timeout_seconds", self.cycle_timeout_seconds)?;
        duration("inter_cycle_delay_seconds", self.inter_cycle_delay_seconds)?;
        duration("pulse_duration_seconds", self.pulse_duration_seconds)?;
        Ok(())
    }

    /// Number of receivers on the ring.
    pub fn receiver_count(&self) -> usize {
        self.receiver_angles.len()
    }

    /// `cycle_timeout_seconds` as a [Duration]. Only call this on a config
    /// that passed [RangingConfig::validate].
    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.cycle_timeout_seconds)
    }

    /// `inter_cycle_delay_seconds` as a [Duration], for a validated config.
    pub fn inter_cycle_delay(&self) -> Duration {
        Duration::from_secs_f64(self.inter_cycle_delay_seconds)
    }

    /// `pulse_duration_seconds` as a [Duration], for a validated config.
    pub fn pulse_duration(&self) -> Duration {
        Duration::from_secs_f64(self.pulse_duration_seconds)
    }
}
