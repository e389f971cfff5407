//! The thread-safe buffer where the receivers' first arrivals for the current
//! cycle are stored.
//!
//! Hardware adapters only ever see an [`EdgeSink`], a cheap cloneable handle
//! that forwards `on_edge` calls into the buffer. The controller owns the
//! buffer itself and is the only one that resets, closes or waits on it.

use crate::beacon_hardware::ReceiverId;
use crate::clock::Timestamp;

use log::debug;
use std::{
    sync::{Arc, Condvar, Mutex},
    time::Instant,
};

/// What happened to an edge handed to [`ArrivalBuffer::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// First edge on this receiver this cycle; it was stored.
    Accepted,
    /// The receiver already has an arrival this cycle; the edge was dropped.
    AlreadyRecorded,
    /// No cycle is listening (the previous one ended); the edge was dropped.
    NotAccepting,
}

/// A point-in-time copy of the arrivals of one cycle, indexed by
/// [`ReceiverId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrivalRecord {
    arrivals: Vec<Option<Timestamp>>,
}

impl ArrivalRecord {
    /// An empty record with room for `receivers` arrivals.
    pub fn empty(receivers: usize) -> Self {
        Self {
            arrivals: vec![None; receivers],
        }
    }

    /// A record with every receiver present, in receiver order.
    pub fn complete(arrivals: impl IntoIterator<Item = Timestamp>) -> Self {
        Self {
            arrivals: arrivals.into_iter().map(Some).collect(),
        }
    }

    /// The first arrival on `receiver`, if there was one.
    pub fn get(&self, receiver: ReceiverId) -> Option<Timestamp> {
        self.arrivals.get(receiver).copied().flatten()
    }

    /// Number of slots, reported or not.
    pub fn receiver_count(&self) -> usize {
        self.arrivals.len()
    }

    /// Whether every receiver has an arrival.
    pub fn is_complete(&self) -> bool {
        self.arrivals.iter().all(Option::is_some)
    }

    /// Receivers that have not reported, in ascending order.
    pub fn missing(&self) -> Vec<ReceiverId> {
        self.arrivals
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    /// Every arrival in receiver order, or `None` if any is missing.
    pub fn arrivals(&self) -> Option<Vec<Timestamp>> {
        self.arrivals.iter().copied().collect()
    }
}

#[derive(Debug)]
struct Slots {
    record: ArrivalRecord,
    accepting: bool,
}

/// Arrival Capture Buffer: one slot per receiver, first arrival wins.
#[derive(Debug)]
pub struct ArrivalBuffer {
    receivers: usize,
    slots: Mutex<Slots>,
    completed: Condvar,
}

impl ArrivalBuffer {
    /// A closed buffer for `receivers` receivers. Nothing is recorded until
    /// the first [`ArrivalBuffer::reset`].
    pub fn new(receivers: usize) -> Self {
        ArrivalBuffer {
            receivers,
            slots: Mutex::new(Slots {
                record: ArrivalRecord::empty(receivers),
                accepting: false,
            }),
            completed: Condvar::new(),
        }
    }

    /// Number of receivers the buffer was built for.
    pub fn receiver_count(&self) -> usize {
        self.receivers
    }

    /// Clears every slot and starts accepting edges for a new cycle.
    pub fn reset(&self) {
        let mut slots = self.slots.lock().unwrap();
        slots.record = ArrivalRecord::empty(self.receivers);
        slots.accepting = true;
    }

    /// Stops accepting edges. The recorded arrivals stay readable until the
    /// next reset.
    pub fn close(&self) {
        self.slots.lock().unwrap().accepting = false;
    }

    /// Stores `timestamp` as the arrival on `receiver` if that receiver has
    /// none yet.
    ///
    /// Panics if `receiver` is not one of the configured receivers.
    pub fn record(&self, receiver: ReceiverId, timestamp: Timestamp) -> Recorded {
        // Checked before locking so a bad id cannot poison the buffer.
        assert!(
            receiver < self.receivers,
            "edge on receiver {} but only {} receivers are configured",
            receiver,
            self.receivers
        );
        let mut slots = self.slots.lock().unwrap();

        if !slots.accepting {
            debug!("Dropped edge on receiver {} at {}: no cycle in progress", receiver, timestamp);
            return Recorded::NotAccepting;
        }

        let slot = &mut slots.record.arrivals[receiver];
        if slot.is_some() {
            debug!("Dropped repeat edge on receiver {} at {}", receiver, timestamp);
            return Recorded::AlreadyRecorded;
        }
        *slot = Some(timestamp);
        debug!("Receiver {} arrival at {}", receiver, timestamp);

        if slots.record.is_complete() {
            self.completed.notify_all();
        }
        Recorded::Accepted
    }

    /// Whether every receiver has reported this cycle.
    pub fn is_complete(&self) -> bool {
        self.slots.lock().unwrap().record.is_complete()
    }

    /// A copy of the arrivals recorded so far.
    pub fn snapshot(&self) -> ArrivalRecord {
        self.slots.lock().unwrap().record.clone()
    }

    /// Blocks until every receiver has reported or `deadline` passes.
    /// Returns whether the buffer was complete when the wait ended.
    pub fn wait_complete(&self, deadline: Instant) -> bool {
        let slots = self.slots.lock().unwrap();
        let timeout = deadline.saturating_duration_since(Instant::now());
        let (slots, _) = self
            .completed
            .wait_timeout_while(slots, timeout, |s| !s.record.is_complete())
            .unwrap();
        slots.record.is_complete()
    }

    /// Ends the cycle: waits like [`ArrivalBuffer::wait_complete`], then
    /// closes the buffer and returns what was recorded, all under one lock.
    /// An edge that comes in after the deadline can never make it into the
    /// returned record.
    pub fn finish(&self, deadline: Instant) -> ArrivalRecord {
        let slots = self.slots.lock().unwrap();
        let timeout = deadline.saturating_duration_since(Instant::now());
        let (mut slots, _) = self
            .completed
            .wait_timeout_while(slots, timeout, |s| !s.record.is_complete())
            .unwrap();
        slots.accepting = false;
        slots.record.clone()
    }
}

/// The capture side's view of an [`ArrivalBuffer`]. Clone it into whatever
/// thread delivers edges.
#[derive(Debug, Clone)]
pub struct EdgeSink {
    buffer: Arc<ArrivalBuffer>,
}

impl EdgeSink {
    /// A sink that records into `buffer`.
    pub fn new(buffer: Arc<ArrivalBuffer>) -> Self {
        Self { buffer }
    }

    /// An edge occurred on `receiver` at `timestamp`.
    pub fn on_edge(&self, receiver: ReceiverId, timestamp: Timestamp) -> Recorded {
        self.buffer.record(receiver, timestamp)
    }

    /// How many receivers the buffer behind this sink has, so adapters can
    /// drop edges from channels they were never told about.
    pub fn receiver_count(&self) -> usize {
        self.buffer.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    fn ts(secs: f64) -> Timestamp {
        Timestamp::from_secs_f64(secs)
    }

    #[test]
    fn first_arrival_wins() {
        let buf = ArrivalBuffer::new(3);
        buf.reset();
        assert_eq!(buf.record(1, ts(0.002)), Recorded::Accepted);
        assert_eq!(buf.record(1, ts(0.001)), Recorded::AlreadyRecorded);
        assert_eq!(buf.snapshot().get(1), Some(ts(0.002)));
    }

    #[test]
    fn closed_buffer_drops_edges() {
        let buf = ArrivalBuffer::new(3);
        assert_eq!(buf.record(0, ts(0.1)), Recorded::NotAccepting);
        buf.reset();
        buf.record(0, ts(0.2));
        buf.close();
        assert_eq!(buf.record(1, ts(0.3)), Recorded::NotAccepting);
        assert_eq!(buf.snapshot().get(0), Some(ts(0.2)));
        assert_eq!(buf.snapshot().missing(), vec![1, 2]);
    }

    #[test]
    fn reset_clears_every_slot() {
        let buf = ArrivalBuffer::new(3);
        buf.reset();
        for id in 0..3 {
            buf.record(id, ts(0.01 * id as f64));
        }
        assert!(buf.is_complete());
        assert_eq!(buf.record(2, ts(0.5)), Recorded::AlreadyRecorded);

        buf.reset();
        assert!(!buf.is_complete());
        assert_eq!(buf.snapshot(), ArrivalRecord::empty(3));
    }

    #[test]
    #[should_panic]
    fn unknown_receiver_is_a_contract_violation() {
        let buf = ArrivalBuffer::new(3);
        buf.reset();
        buf.record(3, ts(0.0));
    }

    #[test]
    fn unknown_receiver_does_not_poison_the_buffer() {
        let buf = Arc::new(ArrivalBuffer::new(3));
        buf.reset();
        let sink = EdgeSink::new(Arc::clone(&buf));
        let res = thread::spawn(move || sink.on_edge(7, ts(0.0))).join();
        assert!(res.is_err());

        // Still usable from the controller's side.
        assert_eq!(buf.record(0, ts(0.1)), Recorded::Accepted);
        assert_eq!(buf.snapshot().missing(), vec![1, 2]);
    }

    #[test]
    fn finish_closes_at_the_deadline() {
        let buf = Arc::new(ArrivalBuffer::new(3));
        buf.reset();
        buf.record(0, ts(0.0));
        buf.record(1, ts(0.0));

        let deadline = Instant::now() + Duration::from_millis(20);
        let sink = EdgeSink::new(Arc::clone(&buf));
        let late = thread::spawn(move || {
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
            thread::sleep(Duration::from_millis(1));
            sink.on_edge(2, ts(0.0))
        });

        let record = buf.finish(deadline);
        assert_eq!(record.missing(), vec![2]);
        // The edge after the deadline is refused, not slipped in.
        assert_eq!(late.join().unwrap(), Recorded::NotAccepting);
        assert_eq!(buf.snapshot().missing(), vec![2]);
    }

    #[test]
    fn finish_returns_early_when_complete() {
        let buf = ArrivalBuffer::new(3);
        buf.reset();
        for id in 0..3 {
            buf.record(id, ts(0.001));
        }
        let start = Instant::now();
        let record = buf.finish(start + Duration::from_secs(5));
        assert!(record.is_complete());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(buf.record(0, ts(0.002)), Recorded::NotAccepting);
    }

    #[test]
    fn wait_times_out_when_incomplete() {
        let buf = ArrivalBuffer::new(3);
        buf.reset();
        buf.record(0, ts(0.0));
        let start = Instant::now();
        assert!(!buf.wait_complete(start + Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn wait_wakes_on_completion_from_other_threads() {
        let buf = Arc::new(ArrivalBuffer::new(3));
        buf.reset();

        let handles: Vec<_> = (0..3)
            .map(|id| {
                let sink = EdgeSink::new(Arc::clone(&buf));
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(5 * (id as u64 + 1)));
                    // Every thread hammers its own receiver; only the first
                    // edge may stick.
                    for k in 0..10 {
                        sink.on_edge(id, ts(id as f64 + k as f64));
                    }
                })
            })
            .collect();

        let start = Instant::now();
        assert!(buf.wait_complete(start + Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handles.into_iter().for_each(|h| h.join().unwrap());

        let record = buf.snapshot();
        assert_eq!(
            record.arrivals(),
            Some(vec![ts(0.0), ts(1.0), ts(2.0)])
        );
    }
}
