//! Definitions of time: musical positions, timing points and the conversion into wall-clock time.
//!
//! A position inside a chart is a measure plus a fraction of that measure ([`ObjTime`]). Before positions can be
//! compared against each other across measures of different lengths, they are aligned against the signature of their
//! measure ([`MeasureBeat`]). [`TimingResolver`] then maps aligned positions onto wall-clock time through a sorted
//! list of [`TimingPoint`]s.

use std::time::Duration;

use gametime::TimeSpan;
use num::Integer;

/// Beats in a measure of signature `1.0`.
pub const BEATS_PER_MEASURE: f64 = 4.0;

/// Nanoseconds in one cache tick.
pub const NANOS_PER_TICK: i64 = 100;

/// Converts seconds into a [`TimeSpan`], rounding to the nearest nanosecond.
#[must_use]
pub fn span_from_secs(secs: f64) -> TimeSpan {
    span_from_nanos((secs * 1e9).round() as i64)
}

/// Converts signed nanoseconds into a [`TimeSpan`].
#[must_use]
pub fn span_from_nanos(nanos: i64) -> TimeSpan {
    let magnitude = TimeSpan::from_duration(Duration::from_nanos(nanos.unsigned_abs()));
    if nanos < 0 {
        TimeSpan::ZERO - magnitude
    } else {
        magnitude
    }
}

/// Returns the signed nanoseconds of a [`TimeSpan`].
#[must_use]
pub fn span_nanos(span: TimeSpan) -> i64 {
    i64::try_from(span.as_nanos()).unwrap_or(i64::MAX)
}

/// Converts a [`TimeSpan`] into 100 ns ticks, truncating toward zero.
#[must_use]
pub fn span_to_ticks(span: TimeSpan) -> i64 {
    span_nanos(span) / NANOS_PER_TICK
}

/// Converts 100 ns ticks into a [`TimeSpan`].
#[must_use]
pub fn span_from_ticks(ticks: i64) -> TimeSpan {
    span_from_nanos(ticks.saturating_mul(NANOS_PER_TICK))
}

/// A raw position of an object: the measure and the fraction of it, as written in the source.
///
/// Ordering compares fractions exactly, so `1/2` and `2/4` are the same position.
#[derive(Debug, Clone, Copy, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjTime {
    /// The measure where the object is in.
    pub measure: u32,
    /// The offset numerator in the measure.
    pub numerator: u64,
    /// The offset denominator in the measure, never zero.
    pub denominator: u64,
}

impl ObjTime {
    /// Creates a position, reducing the fraction. Returns `None` if `denominator` is zero or the fraction is not
    /// less than one.
    #[must_use]
    pub fn new(measure: u32, numerator: u64, denominator: u64) -> Option<Self> {
        if denominator == 0 || numerator >= denominator {
            return None;
        }
        let gcd = numerator.gcd(&denominator);
        Some(Self {
            measure,
            numerator: numerator / gcd,
            denominator: denominator / gcd,
        })
    }

    /// The start of `measure`.
    #[must_use]
    pub const fn start_of(measure: u32) -> Self {
        Self {
            measure,
            numerator: 0,
            denominator: 1,
        }
    }

    /// The fraction of the measure as a float.
    #[must_use]
    pub fn fraction(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Converts into an unaligned [`MeasureBeat`].
    #[must_use]
    pub fn to_measure_beat(self) -> MeasureBeat {
        MeasureBeat::new(self.measure, self.fraction())
    }
}

impl PartialEq for ObjTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for ObjTime {}

impl PartialOrd for ObjTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjTime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let lhs = u128::from(self.numerator) * u128::from(other.denominator);
        let rhs = u128::from(other.numerator) * u128::from(self.denominator);
        self.measure.cmp(&other.measure).then(lhs.cmp(&rhs))
    }
}

/// A position in musical time.
///
/// An unaligned value holds the beat as a fraction `0..1` of its measure. An aligned value holds it scaled by the
/// signature of that measure, in units of a signature-1 measure. Only aligned values may be compared across measures
/// of different signatures.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeasureBeat {
    /// The measure number.
    pub measure: u32,
    /// The beat within the measure.
    pub beat: f64,
    /// Whether `beat` has been scaled by the signature.
    pub aligned: bool,
}

impl MeasureBeat {
    /// Creates an unaligned position.
    #[must_use]
    pub const fn new(measure: u32, beat: f64) -> Self {
        Self {
            measure,
            beat,
            aligned: false,
        }
    }

    /// Aligns the position against `signature`. Aligning twice is a no-op.
    #[must_use]
    pub fn align(self, signature: f64) -> Self {
        if self.aligned {
            return self;
        }
        Self {
            measure: self.measure,
            beat: self.beat * signature,
            aligned: true,
        }
    }
}

impl PartialOrd for MeasureBeat {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(
            self.measure
                .cmp(&other.measure)
                .then(self.beat.total_cmp(&other.beat)),
        )
    }
}

/// An anchor of the piecewise-linear mapping from musical position to wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingPoint {
    /// The aligned position of the point.
    pub position: MeasureBeat,
    /// The position in signature-1 measures since the origin.
    pub meter: f64,
    /// The wall-clock seconds when playback arrives at this point.
    pub seconds: f64,
    /// The tempo in beats per minute from this point on.
    pub tempo: f64,
    /// The signature of the measure of this point.
    pub signature: f64,
    /// The seconds playback halts at this point before continuing.
    pub pause: f64,
}

impl TimingPoint {
    /// The origin: measure 0, time 0, `tempo` and a signature of `1.0`.
    #[must_use]
    pub const fn origin(tempo: f64) -> Self {
        Self {
            position: MeasureBeat {
                measure: 0,
                beat: 0.0,
                aligned: true,
            },
            meter: 0.0,
            seconds: 0.0,
            tempo,
            signature: 1.0,
            pause: 0.0,
        }
    }

    /// The wall-clock time of arrival at this point.
    #[must_use]
    pub fn time(&self) -> TimeSpan {
        span_from_secs(self.seconds)
    }

    /// Seconds at `meter`, which must not be before this point.
    #[must_use]
    pub fn seconds_after(&self, meter: f64) -> f64 {
        if meter <= self.meter {
            return self.seconds;
        }
        self.seconds + self.pause + meter_to_secs(meter - self.meter, self.tempo)
    }
}

/// Seconds spent traversing `meter` signature-1 measures at `tempo`.
#[must_use]
pub fn meter_to_secs(meter: f64, tempo: f64) -> f64 {
    meter * BEATS_PER_MEASURE * 60.0 / tempo
}

/// Seconds spent traversing `beats` at `tempo`.
#[must_use]
pub fn beats_to_secs(beats: f64, tempo: f64) -> f64 {
    beats * 60.0 / tempo
}

/// A run of measures sharing one signature.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SignatureSegment {
    measure: u32,
    signature: f64,
    /// Meter at the start of `measure`.
    start_meter: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Change {
    Signature(f64),
    Tempo(f64),
    Pause(f64),
}

impl Change {
    /// Same-position application order.
    const fn rank(self) -> u8 {
        match self {
            Self::Signature(_) => 0,
            Self::Tempo(_) => 1,
            Self::Pause(_) => 2,
        }
    }
}

/// Resolves musical positions into wall-clock time under changing tempo, signature and pauses.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingResolver {
    segments: Vec<SignatureSegment>,
    points: Vec<TimingPoint>,
}

impl TimingResolver {
    /// Builds the resolver.
    ///
    /// - `signatures` are `(measure, ratio)`, each ratio staying in effect until the next one.
    /// - `tempos` are `(position, beats per minute)`; positions need not be aligned.
    /// - `pauses` are `(position, beats)`, converted to seconds with the tempo in effect there.
    ///
    /// Non-positive or non-finite tempos and signatures are skipped. Later entries for the same measure win.
    #[must_use]
    pub fn new(
        default_tempo: f64,
        signatures: &[(u32, f64)],
        tempos: &[(MeasureBeat, f64)],
        pauses: &[(MeasureBeat, f64)],
    ) -> Self {
        let segments = Self::build_segments(signatures);
        let mut resolver = Self {
            segments,
            points: Vec::new(),
        };

        let mut changes: Vec<(f64, MeasureBeat, Change)> = Vec::new();
        for segment in resolver.segments.iter().skip(1) {
            let position = MeasureBeat::new(segment.measure, 0.0).align(segment.signature);
            changes.push((segment.start_meter, position, Change::Signature(segment.signature)));
        }
        for &(position, tempo) in tempos {
            if tempo.is_finite() && tempo > 0.0 {
                let aligned = resolver.align(position);
                changes.push((resolver.meter_of(aligned), aligned, Change::Tempo(tempo)));
            }
        }
        for &(position, beats) in pauses {
            if beats.is_finite() && beats > 0.0 {
                let aligned = resolver.align(position);
                changes.push((resolver.meter_of(aligned), aligned, Change::Pause(beats)));
            }
        }
        changes.sort_by(|(lhs, _, lhs_change), (rhs, _, rhs_change)| {
            lhs.total_cmp(rhs)
                .then(lhs_change.rank().cmp(&rhs_change.rank()))
        });

        let default_tempo = if default_tempo.is_finite() && default_tempo > 0.0 {
            default_tempo
        } else {
            crate::DEFAULT_TEMPO
        };
        let mut points = vec![TimingPoint::origin(default_tempo)];
        if let Some(first) = resolver.segments.first() {
            points[0].signature = first.signature;
        }
        for (meter, position, change) in changes {
            let Some(last) = points.last_mut() else {
                continue;
            };
            if meter > last.meter {
                let next = TimingPoint {
                    position,
                    meter,
                    seconds: last.seconds_after(meter),
                    tempo: last.tempo,
                    signature: last.signature,
                    pause: 0.0,
                };
                points.push(next);
            }
            let Some(point) = points.last_mut() else {
                continue;
            };
            match change {
                Change::Signature(signature) => point.signature = signature,
                Change::Tempo(tempo) => point.tempo = tempo,
                Change::Pause(beats) => point.pause += beats_to_secs(beats, point.tempo),
            }
        }
        resolver.points = points;
        resolver
    }

    fn build_segments(signatures: &[(u32, f64)]) -> Vec<SignatureSegment> {
        let mut sorted: Vec<(u32, f64)> = signatures
            .iter()
            .copied()
            .filter(|(_, ratio)| ratio.is_finite() && *ratio > 0.0)
            .collect();
        sorted.sort_by_key(|(measure, _)| *measure);

        let mut segments = vec![SignatureSegment {
            measure: 0,
            signature: 1.0,
            start_meter: 0.0,
        }];
        for (measure, signature) in sorted {
            let Some(last) = segments.last_mut() else {
                continue;
            };
            if last.measure == measure {
                last.signature = signature;
                continue;
            }
            let start_meter =
                last.start_meter + f64::from(measure - last.measure) * last.signature;
            segments.push(SignatureSegment {
                measure,
                signature,
                start_meter,
            });
        }
        segments
    }

    fn segment_of(&self, measure: u32) -> SignatureSegment {
        let index = self
            .segments
            .partition_point(|segment| segment.measure <= measure);
        self.segments[index.saturating_sub(1)]
    }

    /// The signature in effect at `measure`.
    #[must_use]
    pub fn signature_of(&self, measure: u32) -> f64 {
        self.segment_of(measure).signature
    }

    /// Aligns `position` against the signature of its measure.
    #[must_use]
    pub fn align(&self, position: MeasureBeat) -> MeasureBeat {
        position.align(self.signature_of(position.measure))
    }

    /// The meter of the start of `measure`.
    #[must_use]
    pub fn measure_start_meter(&self, measure: u32) -> f64 {
        let segment = self.segment_of(measure);
        segment.start_meter + f64::from(measure - segment.measure) * segment.signature
    }

    /// The meter of `position`, aligning it first if needed.
    #[must_use]
    pub fn meter_of(&self, position: MeasureBeat) -> f64 {
        let aligned = self.align(position);
        self.measure_start_meter(aligned.measure) + aligned.beat
    }

    /// The timing point in effect at `meter`: the last one at or before it.
    #[must_use]
    pub fn point_at(&self, meter: f64) -> &TimingPoint {
        let index = self.points.partition_point(|point| point.meter <= meter);
        &self.points[index.saturating_sub(1)]
    }

    /// Resolves `position` into seconds.
    ///
    /// A position exactly on a timing point resolves to the arrival time of that point, before any pause there.
    #[must_use]
    pub fn seconds_at(&self, position: MeasureBeat) -> f64 {
        self.seconds_at_meter(self.meter_of(position))
    }

    /// Resolves a meter value into seconds.
    #[must_use]
    pub fn seconds_at_meter(&self, meter: f64) -> f64 {
        self.point_at(meter).seconds_after(meter)
    }

    /// Resolves `position` into a [`TimeSpan`].
    #[must_use]
    pub fn time_at(&self, position: MeasureBeat) -> TimeSpan {
        span_from_secs(self.seconds_at(position))
    }

    /// The tempo in effect at `position`.
    #[must_use]
    pub fn tempo_at(&self, position: MeasureBeat) -> f64 {
        self.point_at(self.meter_of(position)).tempo
    }

    /// The wall-clock time of the start of `measure`.
    #[must_use]
    pub fn measure_start(&self, measure: u32) -> TimeSpan {
        span_from_secs(self.seconds_at_meter(self.measure_start_meter(measure)))
    }

    /// All timing points, ascending.
    #[must_use]
    pub fn points(&self) -> &[TimingPoint] {
        &self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(measure: u32, beat: f64) -> MeasureBeat {
        MeasureBeat::new(measure, beat)
    }

    fn close(lhs: f64, rhs: f64) -> bool {
        (lhs - rhs).abs() < 1e-9
    }

    #[test]
    fn obj_time_compares_fractions() {
        let half = ObjTime::new(1, 1, 2).unwrap();
        let two_quarters = ObjTime::new(1, 2, 4).unwrap();
        assert_eq!(half, two_quarters);
        assert!(ObjTime::new(1, 1, 3).unwrap() < half);
        assert!(ObjTime::new(0, 3, 4).unwrap() < ObjTime::start_of(1));
        assert!(ObjTime::new(0, 4, 4).is_none());
        assert!(ObjTime::new(0, 0, 0).is_none());
    }

    #[test]
    fn constant_tempo() {
        let resolver = TimingResolver::new(130.0, &[], &[], &[]);
        assert!(close(resolver.seconds_at(at(1, 0.0)), 60.0 / 130.0 * 4.0));
        assert!(close(resolver.seconds_at(at(0, 0.5)), 60.0 / 130.0 * 2.0));
    }

    #[test]
    fn tempo_change_on_measure_boundary() {
        let resolver = TimingResolver::new(130.0, &[], &[(at(1, 0.0), 260.0)], &[]);
        let first = resolver.seconds_at(at(1, 0.0));
        let second = resolver.seconds_at(at(2, 0.0));
        assert!(close(first, 60.0 / 130.0 * 4.0));
        assert!(close(second - first, 60.0 / 130.0 * 2.0));
    }

    #[test]
    fn signature_scales_measure() {
        let resolver = TimingResolver::new(120.0, &[(1, 0.75), (2, 1.0)], &[], &[]);
        assert!(close(resolver.seconds_at(at(1, 0.0)), 2.0));
        assert!(close(resolver.seconds_at(at(2, 0.0)), 3.5));
        assert!(close(resolver.seconds_at(at(1, 0.5)), 2.75));
        assert!(close(resolver.seconds_at(at(3, 0.0)), 5.5));
    }

    #[test]
    fn pause_delays_only_later_positions() {
        let resolver = TimingResolver::new(120.0, &[], &[], &[(at(1, 0.0), 4.0)]);
        assert!(close(resolver.seconds_at(at(1, 0.0)), 2.0));
        assert!(close(resolver.seconds_at(at(2, 0.0)), 6.0));
    }

    #[test]
    fn pause_uses_tempo_changed_at_same_position() {
        let resolver = TimingResolver::new(
            120.0,
            &[],
            &[(at(1, 0.0), 240.0)],
            &[(at(1, 0.0), 4.0)],
        );
        assert!(close(resolver.seconds_at(at(1, 0.0)), 2.0));
        assert!(close(resolver.seconds_at(at(2, 0.0)), 2.0 + 1.0 + 1.0));
    }

    #[test]
    fn points_are_monotonic() {
        let resolver = TimingResolver::new(
            150.0,
            &[(3, 0.5), (4, 1.0)],
            &[(at(2, 0.25), 75.0), (at(5, 0.0), 300.0)],
            &[(at(3, 0.5), 2.0)],
        );
        for pair in resolver.points().windows(2) {
            assert!(pair[0].meter < pair[1].meter);
            assert!(pair[0].seconds <= pair[1].seconds);
        }
    }

    #[test]
    fn span_conversions() {
        assert_eq!(span_nanos(span_from_secs(1.5)), 1_500_000_000);
        assert_eq!(span_nanos(span_from_nanos(-42)), -42);
        assert_eq!(span_to_ticks(span_from_nanos(1_234)), 12);
        assert_eq!(span_nanos(span_from_ticks(12)), 1_200);
    }
}
