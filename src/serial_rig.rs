//! A [`BeaconHardware`] that delegates the speaker and the microphones to a
//! microcontroller on a serial line. See [`crate::hardware_message_decoder`]
//! for what goes over the wire.
//!
//! The microcontroller times edges relative to the start of its own pulse.
//! We turn those offsets into host timestamps by anchoring them at the
//! moment the pulse command was written.

use crate::actuator::{Actuator, ActuatorError, ServoSetpoints};
use crate::arrival_buffer::EdgeSink;
use crate::beacon_hardware::{BeaconHardware, Degree, HardwareError};
use crate::clock::{Clock, Timestamp};
use crate::hardware_message_decoder::{point_command, pulse_command, HardwareEvent};

use log::{debug, info, warn};
use serial2::SerialPort;
use std::{
    io::{ErrorKind, Read, Write},
    path::Path,
    str::{self, FromStr},
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

/// State shared between the rig and its reader thread.
#[derive(Debug, Default)]
struct Shared {
    /// When the most recent pulse command went out.
    anchor: Mutex<Option<Timestamp>>,
    /// A fault the device reported since the last pulse.
    fault: Mutex<Option<String>>,
}

/// [`BeaconHardware`] backed by a capture microcontroller. Commands go
/// out through `W`; device lines come back on a reader thread started by
/// `attach`.
pub struct SerialRig<W: Write = SerialPort> {
    commands: W,
    events: Option<Box<dyn Read + Send>>,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
    reader: Option<JoinHandle<()>>,
}

impl SerialRig<SerialPort> {
    /// Opens the device at `path`. Reads block forever (well, for about
    /// 584,942,417,355 years), so the reader thread only wakes up for data.
    pub fn open(
        path: impl AsRef<Path>,
        baud_rate: u32,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, HardwareError> {
        let mut port = SerialPort::open(path, baud_rate)?;
        port.set_read_timeout(Duration::MAX)?;
        let events = port.try_clone()?;
        Ok(Self::new(port, events, clock))
    }

    /// An actuator that drives the pointer attached to the same device.
    pub fn actuator(&self) -> Result<SerialActuator<SerialPort>, HardwareError> {
        Ok(SerialActuator::new(self.commands.try_clone()?))
    }
}

impl<W: Write> SerialRig<W> {
    /// A rig that writes commands to `commands` and reads device lines from
    /// `events`.
    pub fn new(commands: W, events: impl Read + Send + 'static, clock: Arc<dyn Clock>) -> Self {
        Self {
            commands,
            events: Some(Box::new(events)),
            clock,
            shared: Arc::new(Shared::default()),
            reader: None,
        }
    }

    /// Whether the reader thread is still running.
    pub fn is_listening(&self) -> bool {
        self.reader.as_ref().map_or(false, |r| !r.is_finished())
    }
}

impl<W: Write> BeaconHardware for SerialRig<W> {
    fn attach(&mut self, sink: EdgeSink) -> Result<(), HardwareError> {
        let events = self.events.take().ok_or_else(|| {
            HardwareError::HardwareUnavailable("serial rig is already attached".into())
        })?;
        let shared = Arc::clone(&self.shared);
        self.reader = Some(thread::spawn(move || pump(events, &shared, &sink)));
        Ok(())
    }

    fn emit(&mut self, frequency_hz: f64, duration: Duration) -> Result<(), HardwareError> {
        if self.reader.is_none() {
            return Err(HardwareError::Detached);
        }
        if let Some(code) = self.shared.fault.lock().unwrap().take() {
            return Err(HardwareError::Fault(code));
        }

        let command = pulse_command(frequency_hz, duration);
        *self.shared.anchor.lock().unwrap() = Some(self.clock.now());
        self.commands.write_all(command.as_bytes())?;
        self.commands.flush()?;
        debug!("Sent {}", command.trim_end());
        Ok(())
    }
}

/// Longest line the device ever sends, with plenty of room to spare.
const MAX_LINE: usize = 128;

/// Splits a byte stream into `\n`-terminated lines. A line longer than
/// [MAX_LINE] is thrown away up to its terminator.
#[derive(Debug, Default)]
struct LineAssembler {
    read_buf: Vec<u8>,
    overflowed: bool,
}

impl LineAssembler {
    fn feed(&mut self, bytes: &[u8], mut on_line: impl FnMut(&[u8])) {
        for &c in bytes {
            if c == b'\n' {
                if !self.overflowed {
                    on_line(&self.read_buf);
                }
                self.read_buf.clear();
                self.overflowed = false;
            } else if self.overflowed {
                continue;
            } else if self.read_buf.len() == MAX_LINE {
                // Usually means a baud rate mismatch
                warn!("Serial line longer than {} bytes, dropping it", MAX_LINE);
                self.read_buf.clear();
                self.overflowed = true;
            } else {
                self.read_buf.push(c);
            }
        }
    }
}

/// Reads lines from `input` until it closes, forwarding edges to `sink`.
fn pump(mut input: impl Read, shared: &Shared, sink: &EdgeSink) {
    let mut buffer = [0; 256];
    let mut lines = LineAssembler::default();

    loop {
        let read_len = match input.read(&mut buffer) {
            Ok(0) => {
                info!("Serial device closed the connection");
                return;
            }
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::TimedOut) => continue,
            Err(e) => {
                warn!("Serial device disconnected: {}", e);
                return;
            }
        };

        lines.feed(&buffer[..read_len], |line| handle_line(line, shared, sink));
    }
}

fn handle_line(line: &[u8], shared: &Shared, sink: &EdgeSink) {
    let s = match str::from_utf8(line) {
        Ok(s) => s,
        // Often happens at the beginning of transmission when there is
        // still garbage in the hardware buffer
        Err(e) => {
            warn!("Failed to decode utf-8: {:?}", e);
            return;
        }
    };
    if s.trim().is_empty() {
        return;
    }

    match HardwareEvent::from_str(s) {
        Ok(HardwareEvent::Edge(edge)) => {
            let receiver = edge.channel as usize;
            if receiver >= sink.receiver_count() {
                warn!("Edge on unknown channel {}, dropping it", edge.channel);
                return;
            }
            match *shared.anchor.lock().unwrap() {
                Some(anchor) => {
                    sink.on_edge(receiver, anchor + edge.offset());
                }
                None => debug!("Edge on channel {} before any pulse, dropping it", edge.channel),
            }
        }
        Ok(HardwareEvent::Fault(code)) => {
            warn!("Device reported fault {}", code);
            *shared.fault.lock().unwrap() = Some(code);
        }
        Err(e) => {
            warn!("Was unable to parse hardware message: {}", e);
        }
    }
}

/// Points the pan/tilt head hanging off the capture microcontroller.
pub struct SerialActuator<W: Write> {
    commands: W,
}

impl<W: Write> SerialActuator<W> {
    /// An actuator that writes `+POINT` commands to `commands`.
    pub fn new(commands: W) -> Self {
        Self { commands }
    }

    /// The writer underneath.
    pub fn into_inner(self) -> W {
        self.commands
    }
}

impl<W: Write> Actuator for SerialActuator<W> {
    fn point(&mut self, angle_degrees: Degree) -> Result<(), ActuatorError> {
        let setpoints = ServoSetpoints::from_bearing(angle_degrees);
        self.commands
            .write_all(point_command(&setpoints).as_bytes())?;
        self.commands.flush()?;
        Ok(())
    }
}
