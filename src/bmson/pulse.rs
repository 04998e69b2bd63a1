//! Pulse definition for bmson format. A pulse is only a position on the score, so the tempo and stop events before
//! it decide when it happens.

use gametime::TimeSpan;
use serde::{Deserialize, Serialize};

use crate::time::span_from_secs;

/// Note position for the chart [`super::Bmson`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PulseNumber(pub u64);

impl PulseNumber {
    /// Calculates an absolute difference of two pulses.
    #[must_use]
    pub const fn abs_diff(self, other: Self) -> u64 {
        self.0.abs_diff(other.0)
    }
}

/// A reference point of the pulse map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulsePoint {
    /// Where the point is.
    pub y: PulseNumber,
    /// Seconds from the start when the chart reaches `y`.
    pub seconds: f64,
    /// The tempo from `y` on.
    pub tempo: f64,
    /// Seconds the chart stays at `y` before moving on.
    pub pause: f64,
}

impl PulsePoint {
    fn seconds_after(&self, y: PulseNumber, resolution: u64) -> f64 {
        if y <= self.y {
            return self.seconds;
        }
        self.seconds + self.pause + pulses_to_secs(y.abs_diff(self.y), resolution, self.tempo)
    }
}

/// Seconds taken by `pulses` at `tempo`, where `resolution` pulses make a quarter note.
#[must_use]
pub fn pulses_to_secs(pulses: u64, resolution: u64, tempo: f64) -> f64 {
    pulses as f64 / resolution as f64 * 60.0 / tempo
}

/// Maps pulses into wall-clock time.
///
/// Tempo changes at the same pulse are applied in order, so the last one wins. Stops at a pulse then hold the chart
/// for their duration at that tempo; a note on the stop pulse happens before the stop.
#[derive(Debug, Clone)]
pub struct PulseMap {
    resolution: u64,
    points: Vec<PulsePoint>,
}

impl PulseMap {
    /// Creates a map. `resolution` must be nonzero and every tempo positive.
    #[must_use]
    pub fn new(
        resolution: u64,
        init_tempo: f64,
        tempos: &[(PulseNumber, f64)],
        stops: &[(PulseNumber, u64)],
    ) -> Self {
        let resolution = resolution.max(1);
        let mut changes: Vec<(PulseNumber, u8, f64, u64)> = tempos
            .iter()
            .map(|&(y, tempo)| (y, 0, tempo, 0))
            .chain(stops.iter().map(|&(y, duration)| (y, 1, 0.0, duration)))
            .collect();
        changes.sort_by_key(|&(y, rank, _, _)| (y, rank));

        let mut points = vec![PulsePoint {
            y: PulseNumber(0),
            seconds: 0.0,
            tempo: init_tempo,
            pause: 0.0,
        }];
        for (y, rank, tempo, duration) in changes {
            let Some(last) = points.last().copied() else {
                break;
            };
            if last.y != y {
                points.push(PulsePoint {
                    y,
                    seconds: last.seconds_after(y, resolution),
                    tempo: last.tempo,
                    pause: 0.0,
                });
            }
            let Some(point) = points.last_mut() else {
                break;
            };
            if rank == 0 {
                point.tempo = tempo;
            } else {
                point.pause += pulses_to_secs(duration, resolution, point.tempo);
            }
        }
        Self { resolution, points }
    }

    /// Pulses per quarter note.
    #[must_use]
    pub const fn resolution(&self) -> u64 {
        self.resolution
    }

    /// The reference points, ascending by pulse.
    #[must_use]
    pub fn points(&self) -> &[PulsePoint] {
        &self.points
    }

    fn point_at(&self, y: PulseNumber) -> &PulsePoint {
        let index = self.points.partition_point(|point| point.y <= y);
        &self.points[index.saturating_sub(1)]
    }

    /// Seconds from the start when the chart reaches `y`.
    #[must_use]
    pub fn seconds_at(&self, y: PulseNumber) -> f64 {
        self.point_at(y).seconds_after(y, self.resolution)
    }

    /// The wall-clock time of `y`.
    #[must_use]
    pub fn time_at(&self, y: PulseNumber) -> TimeSpan {
        span_from_secs(self.seconds_at(y))
    }

    /// The tempo in effect at `y`, after any change on `y` itself.
    #[must_use]
    pub fn tempo_at(&self, y: PulseNumber) -> f64 {
        self.point_at(y).tempo
    }

    /// Seconds a stop of `duration` pulses lasts at `y`.
    #[must_use]
    pub fn stop_seconds(&self, y: PulseNumber, duration: u64) -> f64 {
        pulses_to_secs(duration, self.resolution, self.tempo_at(y))
    }
}
