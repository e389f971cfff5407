//! The line protocol spoken by a capture microcontroller on the serial port.
//!
//! Device to host:
//!
//! ```text
//! +EDGE:<channel>,<microseconds since the pulse started>
//! +FAULT:<alphanumeric fault code>
//! ```
//!
//! Host to device:
//!
//! ```text
//! +PULSE:<frequency in Hz>,<duration in microseconds>
//! +POINT:<pan degrees>,<tilt degrees>
//! ```

use crate::actuator::ServoSetpoints;

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alphanumeric1, char, u32, u64},
    combinator::{all_consuming, map},
    error::Error,
    sequence::{preceded, tuple},
    Finish, IResult,
};
use std::{str::FromStr, time::Duration};

/// A nom error that owns the input it failed on.
pub type DecodeError = Error<String>;

/// A receiver saw the pulse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeEvent {
    /// Receiver the edge was seen on.
    pub channel: u32,
    /// Microseconds from the start of the pulse.
    pub micros: u64,
}

impl EdgeEvent {
    /// Time from the start of the pulse to the edge.
    pub fn offset(&self) -> Duration {
        Duration::from_micros(self.micros)
    }
}

/// One line from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareEvent {
    /// A receiver saw the pulse.
    Edge(EdgeEvent),
    /// The device hit a fault, with its code.
    Fault(String),
}

fn parse_edge(s: &str) -> IResult<&str, EdgeEvent> {
    map(
        tuple((preceded(tag("+EDGE:"), u32), preceded(char(','), u64))),
        |(channel, micros)| EdgeEvent { channel, micros },
    )(s)
}

fn parse_fault(s: &str) -> IResult<&str, String> {
    map(preceded(tag("+FAULT:"), alphanumeric1), |code: &str| {
        code.to_owned()
    })(s)
}

fn parse_event(s: &str) -> IResult<&str, HardwareEvent> {
    alt((
        map(parse_edge, HardwareEvent::Edge),
        map(parse_fault, HardwareEvent::Fault),
    ))(s)
}

impl FromStr for HardwareEvent {
    type Err = DecodeError;

    /// Parses one line. Surrounding whitespace (the line ending, mostly) is
    /// ignored; anything else left over is an error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match all_consuming(parse_event)(s.trim()).finish() {
            Ok((_remaining, event)) => Ok(event),
            Err(Error { input, code }) => Err(Error {
                input: input.to_string(),
                code,
            }),
        }
    }
}

/// The command that starts a pulse.
pub fn pulse_command(frequency_hz: f64, duration: Duration) -> String {
    format!(
        "+PULSE:{},{}\n",
        frequency_hz.round() as u64,
        duration.as_micros()
    )
}

/// The command that moves the pointer.
pub fn point_command(setpoints: &ServoSetpoints) -> String {
    format!("+POINT:{:.1},{:.1}\n", setpoints.pan, setpoints.tilt)
}
