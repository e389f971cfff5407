//! Turning a bearing into servo setpoints.
//!
//! The pointer is a pan servo on a tilt servo. Both servos only sweep 0° to
//! 180°, so the back half of the circle is reached by flipping the tilt servo
//! over the top and panning from the other side:
//!
//! ```text
//!   bearing   0..180  ->  pan = bearing,        tilt =   0
//!   bearing 180..360  ->  pan = bearing - 180,  tilt = 180
//! ```

use crate::beacon_hardware::Degree;
use crate::localizer::normalize_degrees;

use log::info;
use std::{error::Error, fmt::Display, io};

/// Sweep of a single servo, in degrees.
const SERVO_SWEEP: Degree = 180.0;

/// Something that can be pointed. Best-effort: the controller logs errors
/// and moves on.
pub trait Actuator {
    /// Turns to face `angle_degrees`, a bearing in degrees. Any value is
    /// accepted and wrapped into `[0, 360)`.
    fn point(&mut self, angle_degrees: Degree) -> Result<(), ActuatorError>;
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn point(&mut self, angle_degrees: Degree) -> Result<(), ActuatorError> {
        (**self).point(angle_degrees)
    }
}

/// Why an [`Actuator`] could not be pointed.
#[derive(Debug)]
pub enum ActuatorError {
    /// The actuator is not there, or is refusing commands.
    Unavailable(String),
    /// Writing the command failed.
    IoError(io::Error),
}

impl Display for ActuatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActuatorError::Unavailable(why) => write!(f, "actuator unavailable: {}", why),
            ActuatorError::IoError(error) => write!(f, "io error: {}", error),
        }
    }
}

impl Error for ActuatorError {}

impl From<io::Error> for ActuatorError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value)
    }
}

/// Angles for the pan and tilt servos, in degrees within `[0, 180]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoSetpoints {
    /// Pan servo angle.
    pub pan: Degree,
    /// Tilt servo angle. `0` faces front, `180` is flipped over the top.
    pub tilt: Degree,
}

impl ServoSetpoints {
    /// The unique setpoints that face `bearing`.
    pub fn from_bearing(bearing: Degree) -> Self {
        let bearing = normalize_degrees(bearing);
        if bearing < SERVO_SWEEP {
            Self {
                pan: bearing,
                tilt: 0.0,
            }
        } else {
            Self {
                pan: bearing - SERVO_SWEEP,
                tilt: SERVO_SWEEP,
            }
        }
    }

    /// Back to a bearing in `[0, 360)`.
    pub fn bearing(&self) -> Degree {
        if self.tilt >= SERVO_SWEEP / 2.0 {
            normalize_degrees(self.pan + SERVO_SWEEP)
        } else {
            self.pan
        }
    }

    /// Maps a servo angle to the `[-1, 1]` position value most servo
    /// drivers take, with 90° at the centre.
    pub fn servo_value(angle: Degree) -> f64 {
        (angle / (SERVO_SWEEP / 2.0) - 1.0).clamp(-1.0, 1.0)
    }

    /// [`ServoSetpoints::servo_value`] of the pan angle.
    pub fn pan_value(&self) -> f64 {
        Self::servo_value(self.pan)
    }

    /// [`ServoSetpoints::servo_value`] of the tilt angle.
    pub fn tilt_value(&self) -> f64 {
        Self::servo_value(self.tilt)
    }
}

/// An [`Actuator`] with no hardware behind it. It logs where it would
/// point and remembers the last setpoints.
#[derive(Debug, Default)]
pub struct LogActuator {
    last: Option<ServoSetpoints>,
}

impl LogActuator {
    /// An actuator that has not pointed anywhere yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Where it was last told to point.
    pub fn last(&self) -> Option<ServoSetpoints> {
        self.last
    }
}

impl Actuator for LogActuator {
    fn point(&mut self, angle_degrees: Degree) -> Result<(), ActuatorError> {
        let setpoints = ServoSetpoints::from_bearing(angle_degrees);
        info!(
            "Pointing at {:.2} degrees: pan {:.2} ({:+.3}), tilt {:.2} ({:+.3})",
            angle_degrees,
            setpoints.pan,
            setpoints.pan_value(),
            setpoints.tilt,
            setpoints.tilt_value()
        );
        self.last = Some(setpoints);
        Ok(())
    }
}
