//! The seam between the ranging core and the physical beacon: one emitter
//! and a ring of receivers that report edges asynchronously.

use crate::arrival_buffer::EdgeSink;
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt::Display, io, time::Duration};

/// An angle in radians.
pub type Radian = f64;
/// An angle in degrees.
pub type Degree = f64;

/// Index of a receiver in the configured ring, `0..receiver_count`.
pub type ReceiverId = usize;

/// `BeaconHardware`
///
/// The emission and capture halves of the beacon. Capture is push-based:
/// once attached, the hardware calls [`EdgeSink::on_edge`] from whatever
/// thread or interrupt context it likes.
pub trait BeaconHardware {
    /// Hands the hardware the sink its edge notifications must go to.
    /// Called once, when the controller is built.
    fn attach(&mut self, sink: EdgeSink) -> Result<(), HardwareError>;

    /// Emits one pulse. May return as soon as the pulse has been started;
    /// it must not wait for anything beyond `duration`.
    fn emit(&mut self, frequency_hz: f64, duration: Duration) -> Result<(), HardwareError>;
}

impl<H: BeaconHardware + ?Sized> BeaconHardware for Box<H> {
    fn attach(&mut self, sink: EdgeSink) -> Result<(), HardwareError> {
        (**self).attach(sink)
    }

    fn emit(&mut self, frequency_hz: f64, duration: Duration) -> Result<(), HardwareError> {
        (**self).emit(frequency_hz, duration)
    }
}

/// Failures reported by a [`BeaconHardware`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareError {
    /// The output cannot be driven right now.
    HardwareUnavailable(String),
    /// The device reported a fault code of its own.
    Fault(String),
    /// `emit` was called before the hardware was attached to a sink.
    Detached,
}

impl Display for HardwareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareError::HardwareUnavailable(why) => write!(f, "hardware unavailable: {}", why),
            HardwareError::Fault(code) => write!(f, "device fault {}", code),
            HardwareError::Detached => write!(f, "hardware is not attached to an edge sink"),
        }
    }
}

impl Error for HardwareError {}

impl From<io::Error> for HardwareError {
    fn from(value: io::Error) -> Self {
        Self::HardwareUnavailable(value.to_string())
    }
}
