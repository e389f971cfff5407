//! Geometry Solver: turns one cycle's arrival times into a bearing and a
//! coarse range.
//!
//! Each receiver's time of flight becomes a pseudo-distance, the
//! pseudo-distances are summed as vectors along the receivers' directions,
//! and the direction of that sum is the bearing. The range is the mean
//! pseudo-distance. This is a deliberately simple estimate; it is good for
//! pointing at things, not for measuring them.

use crate::beacon_hardware::{Degree, Radian, ReceiverId};
use crate::clock::Timestamp;

use serde::{Deserialize, Serialize};

/// Arrival spreads at or below this many seconds count as simultaneous.
const SIMULTANEOUS_EPSILON_S: f64 = 1e-12;

/// A projected vector shorter than this fraction of the summed
/// pseudo-distances has no usable direction.
const DEGENERATE_RATIO: f64 = 1e-9;

/// Which way the reported bearing faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BearingSense {
    /// The direction of the distance-weighted sum itself. On a symmetric
    /// ring this faces away from the receiver that heard the pulse first.
    #[default]
    Projection,
    /// The projection turned around by 180°, facing the emitter.
    Source,
}

impl BearingSense {
    /// The direction of the emitter, given a bearing reported in this sense.
    pub fn toward_source(self, angle_degrees: Degree) -> Degree {
        match self {
            BearingSense::Projection => normalize_degrees(angle_degrees + 180.0),
            BearingSense::Source => normalize_degrees(angle_degrees),
        }
    }
}

/// The solved output of a complete cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BearingResult {
    /// In `[0, 360)`.
    pub angle_degrees: Degree,
    /// Mean of the receivers' pseudo-distances (speed times time of flight).
    pub distance_meters: f64,
}

/// What the arrivals of one cycle say.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Estimate {
    /// A direction and a distance.
    Bearing(BearingResult),
    /// Every receiver is equally far away (or the geometry cancels out), so
    /// there is no direction to report. The range is still meaningful.
    Indeterminate {
        /// Mean pseudo-distance.
        distance_meters: f64,
    },
}

/// The output of [`localize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// The bearing, or why there is none.
    pub estimate: Estimate,
    /// Receivers whose arrival was stamped before the pulse went out. Their
    /// time of flight was taken as zero.
    pub clamped: Vec<ReceiverId>,
}

/// Wraps any angle in degrees into `[0, 360)`.
pub fn normalize_degrees(angle: Degree) -> Degree {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/** localize()
 * @brief   Solves one cycle
 * @param   start           when the pulse was emitted
 * @param   arrivals        first arrival per receiver, in receiver order
 * @param   receiver_angles where each receiver sits on the ring, same order
 * @param   speed_mps       propagation speed of the pulse
 * @param   sense           which way the bearing should face
 * @returns The bearing (or why there is none) and any clamped receivers
 */
pub fn localize(
    start: Timestamp,
    arrivals: &[Timestamp],
    receiver_angles: &[Radian],
    speed_mps: f64,
    sense: BearingSense,
) -> Solution {
    assert_eq!(
        arrivals.len(),
        receiver_angles.len(),
        "one arrival per receiver"
    );

    let mut clamped = Vec::new();
    let flight_times: Vec<f64> = arrivals
        .iter()
        .enumerate()
        .map(|(id, arrival)| match arrival.checked_duration_since(start) {
            Some(dt) => dt.as_secs_f64(),
            None => {
                clamped.push(id);
                0.0
            }
        })
        .collect();

    let distances: Vec<f64> = flight_times.iter().map(|dt| dt * speed_mps).collect();
    let distance_meters = if distances.is_empty() {
        0.0
    } else {
        distances.iter().sum::<f64>() / distances.len() as f64
    };

    let (x, y) = distances
        .iter()
        .zip(receiver_angles)
        .fold((0.0, 0.0), |(x, y), (d, angle)| {
            (x + d * angle.cos(), y + d * angle.sin())
        });

    let spread = flight_times.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
        - flight_times.iter().cloned().fold(f64::INFINITY, f64::min);
    let total: f64 = distances.iter().map(|d| d.abs()).sum();
    let simultaneous = spread <= SIMULTANEOUS_EPSILON_S;
    let degenerate = x.hypot(y) <= DEGENERATE_RATIO * total;

    let estimate = if distances.is_empty() || simultaneous || degenerate {
        Estimate::Indeterminate { distance_meters }
    } else {
        let projection = y.atan2(x).to_degrees();
        let angle_degrees = match sense {
            BearingSense::Projection => normalize_degrees(projection),
            BearingSense::Source => normalize_degrees(projection + 180.0),
        };
        Estimate::Bearing(BearingResult {
            angle_degrees,
            distance_meters,
        })
    };

    Solution { estimate, clamped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use std::f64::consts::PI;

    const RING: [Radian; 3] = [0.0, 2.0 * PI / 3.0, 4.0 * PI / 3.0];

    fn ts(secs: f64) -> Timestamp {
        Timestamp::from_secs_f64(secs)
    }

    fn bearing(solution: &Solution) -> BearingResult {
        match solution.estimate {
            Estimate::Bearing(b) => b,
            Estimate::Indeterminate { .. } => panic!("expected a bearing, got {:?}", solution),
        }
    }

    fn angular_gap(a: Degree, b: Degree) -> Degree {
        let d = normalize_degrees(a - b);
        d.min(360.0 - d)
    }

    #[test]
    fn worked_example() {
        let arrivals = [ts(0.0005), ts(0.0007), ts(0.0009)];
        let solution = localize(Timestamp::ZERO, &arrivals, &RING, 343.0, BearingSense::Projection);

        let d = [0.1715, 0.2401, 0.3087];
        let x: f64 = d.iter().zip(RING).map(|(d, a)| d * a.cos()).sum();
        let y: f64 = d.iter().zip(RING).map(|(d, a)| d * a.sin()).sum();
        let expected = normalize_degrees(y.atan2(x).to_degrees());

        let b = bearing(&solution);
        assert!((b.angle_degrees - expected).abs() < 1e-3);
        assert!((b.angle_degrees - 210.0).abs() < 1e-3);
        assert!((b.distance_meters - 0.2401).abs() < 1e-6);
        assert!(solution.clamped.is_empty());
    }

    #[test]
    fn source_aligned_with_a_receiver_points_at_it() {
        for (i, &angle) in RING.iter().enumerate() {
            let arrivals: Vec<_> = (0..3)
                .map(|j| if j == i { ts(1.0) } else { ts(1.002) })
                .collect();
            let solution = localize(ts(1.0), &arrivals, &RING, 343.0, BearingSense::Source);
            let b = bearing(&solution);
            assert!(
                angular_gap(b.angle_degrees, angle.to_degrees()).to_radians() < 1e-6,
                "receiver {} at {} solved to {}",
                i,
                angle.to_degrees(),
                b.angle_degrees
            );
        }
    }

    #[test]
    fn projection_and_source_are_opposite() {
        let arrivals = [ts(0.0012), ts(0.0004), ts(0.0009)];
        let p = bearing(&localize(Timestamp::ZERO, &arrivals, &RING, 343.0, BearingSense::Projection));
        let s = bearing(&localize(Timestamp::ZERO, &arrivals, &RING, 343.0, BearingSense::Source));
        assert!((angular_gap(p.angle_degrees, s.angle_degrees) - 180.0).abs() < 1e-9);
        assert_eq!(p.distance_meters, s.distance_meters);
    }

    #[test]
    fn simultaneous_arrivals_are_indeterminate() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let start = rng.gen_range(0.0..100.0);
            let dt = rng.gen_range(0.0..0.05);
            let arrivals = [ts(start + dt); 3];
            let solution = localize(ts(start), &arrivals, &RING, 343.0, BearingSense::Projection);
            match solution.estimate {
                Estimate::Indeterminate { distance_meters } => assert!(distance_meters >= 0.0),
                Estimate::Bearing(b) => panic!("simultaneous arrivals gave {:?}", b),
            }
        }
    }

    #[test]
    fn simultaneous_arrivals_on_a_lopsided_ring_are_indeterminate() {
        let lopsided = [0.0, PI / 2.0, PI];
        let arrivals = [ts(0.003); 3];
        let solution = localize(Timestamp::ZERO, &arrivals, &lopsided, 343.0, BearingSense::Projection);
        assert!(matches!(solution.estimate, Estimate::Indeterminate { .. }));
    }

    #[test]
    fn bearings_are_always_normalized() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..2000 {
            let start = rng.gen_range(0.0..10.0);
            let arrivals: Vec<_> = (0..3)
                .map(|_| ts(start + rng.gen_range(0.0..0.01)))
                .collect();
            let sense = if rng.gen() {
                BearingSense::Projection
            } else {
                BearingSense::Source
            };
            let solution = localize(ts(start), &arrivals, &RING, 343.0, sense);
            if let Estimate::Bearing(b) = solution.estimate {
                assert!((0.0..360.0).contains(&b.angle_degrees), "{}", b.angle_degrees);
                assert!(b.distance_meters >= 0.0);
            }
        }
    }

    #[test]
    fn early_arrivals_are_clamped_to_zero() {
        let arrivals = [ts(0.9), ts(1.001), ts(1.002)];
        let solution = localize(ts(1.0), &arrivals, &RING, 343.0, BearingSense::Projection);
        assert_eq!(solution.clamped, vec![0]);
        let clamped = localize(
            ts(1.0),
            &[ts(1.0), ts(1.001), ts(1.002)],
            &RING,
            343.0,
            BearingSense::Projection,
        );
        assert_eq!(solution.estimate, clamped.estimate);
    }

    #[test]
    fn normalize_handles_edges() {
        assert_eq!(normalize_degrees(0.0), 0.0);
        assert_eq!(normalize_degrees(360.0), 0.0);
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(-1e-15), 0.0);
        assert!((normalize_degrees(725.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn toward_source_undoes_the_projection() {
        assert_eq!(BearingSense::Projection.toward_source(210.0), 30.0);
        assert_eq!(BearingSense::Projection.toward_source(180.0), 0.0);
        assert_eq!(BearingSense::Source.toward_source(30.0), 30.0);
    }
}
