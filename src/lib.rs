//! BeaconRanger finds the bearing of an acoustic beacon by time difference
//! of arrival. Each ranging cycle emits a short tone, waits for every
//! receiver on a ring around the array centre to report when it first heard
//! the tone, and projects those arrival times onto the receiver directions
//! to estimate where the tone came from. The result can drive a pan/tilt
//! pointer.
//!
//! The pieces, bottom-up:
//!
//! - [`clock`]: timestamps and the clocks that hand them out
//! - [`beacon_hardware`]: the seam between the controller and the hardware
//! - [`arrival_buffer`]: where capture threads drop first arrivals
//! - [`localizer`]: the geometry
//! - [`ranging_cycle`]: the state machine that ties all of it together
//! - [`actuator`]: pointing at the result
//!
//! Hardware comes in two flavours, [`dummy_rig`] for a simulated source and
//! [`serial_rig`] for a capture microcontroller on a serial port.

#![warn(missing_docs)]

pub mod actuator;
pub mod args;
pub mod arrival_buffer;
pub mod beacon_hardware;
pub mod clock;
pub mod config;
pub mod dummy_rig;
pub mod gui;
pub mod hardware_message_decoder;
pub mod localizer;
pub mod outcome_log;
pub mod ranging_cycle;
pub mod serial_rig;

use beacon_hardware::Degree;
use std::fmt::Display;

/// A point in the plane of the receiver ring, in meters, with the array
/// centre at the origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// Meters along the axis of the first receiver.
    pub x: f64,
    /// Meters across it.
    pub y: f64,
}

impl Point {
    /// The point `range` meters away from the origin in the direction of
    /// `bearing`, measured counterclockwise from the x axis.
    pub fn from_polar(bearing: Degree, range: f64) -> Self {
        let angle = bearing.to_radians();
        Point {
            x: range * angle.cos(),
            y: range * angle.sin(),
        }
    }

    /// Euclidean distance to `other`.
    pub fn abs_dist(&self, other: &Self) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}
