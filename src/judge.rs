//! Judging hit timing into a rank and an accumulated score.
//!
//! The score of a chart is split into a base part, shared evenly by every note, and a combo bonus that grows with
//! the combo. The bonus of the `i`-th combo position is proportional to `i + 1`, so the running bonus grows
//! quadratically, and the last position absorbs the rounding remainder. A full combo of perfect hits therefore sums
//! to the configured maximum bonus exactly.

use gametime::TimeSpan;
use itertools::Itertools;
use thiserror::Error;

/// A judging bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreTier {
    /// The rank reported for hits in this tier. Smaller is better.
    pub rank: i32,
    /// Portion of the note score awarded, from `0.0` to `1.0`.
    pub weight: f64,
    /// Hits whose absolute timing error is below this fall into this tier.
    pub max_error: TimeSpan,
}

impl ScoreTier {
    /// Creates a tier.
    #[must_use]
    pub const fn new(rank: i32, weight: f64, max_error: TimeSpan) -> Self {
        Self {
            rank,
            weight,
            max_error,
        }
    }
}

/// The configuration of a [`ScoreCalculator`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreConfig {
    /// Tiers ascending by `max_error`. Errors beyond the last tier are misses.
    pub tiers: Vec<ScoreTier>,
    /// The score of a full combo of the best tier.
    pub max_score: u64,
    /// The part of `max_score` distributed as combo bonus.
    pub combo_bonus_ratio: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        let millis = |ms: i64| TimeSpan::MILLISECOND * ms;
        Self {
            tiers: vec![
                ScoreTier::new(0, 1.0, millis(20)),
                ScoreTier::new(1, 0.7, millis(60)),
                ScoreTier::new(2, 0.4, millis(120)),
                ScoreTier::new(3, 0.0, millis(200)),
            ],
            max_score: 1_000_000,
            combo_bonus_ratio: 0.2,
        }
    }
}

/// An invalid [`ScoreConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ScoreConfigError {
    /// There is no tier.
    #[error("no score tier is configured")]
    EmptyTiers,
    /// The tier at the index does not have a larger `max_error` than the one before.
    #[error("score tier {0} is not sorted by its timing error")]
    UnsortedTiers(usize),
    /// The weight of the tier at the index is outside `0.0..=1.0`.
    #[error("weight of score tier {0} is out of range")]
    WeightOutOfRange(usize),
    /// `combo_bonus_ratio` is outside `0.0..=1.0`.
    #[error("combo bonus ratio is out of range")]
    RatioOutOfRange,
}

impl ScoreConfig {
    /// Checks the invariants of the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ScoreConfigError> {
        if self.tiers.is_empty() {
            return Err(ScoreConfigError::EmptyTiers);
        }
        for (index, tier) in self.tiers.iter().enumerate() {
            if !(0.0..=1.0).contains(&tier.weight) {
                return Err(ScoreConfigError::WeightOutOfRange(index));
            }
        }
        for (index, (before, after)) in self.tiers.iter().tuple_windows().enumerate() {
            if after.max_error <= before.max_error {
                return Err(ScoreConfigError::UnsortedTiers(index + 1));
            }
        }
        if !(0.0..=1.0).contains(&self.combo_bonus_ratio) {
            return Err(ScoreConfigError::RatioOutOfRange);
        }
        Ok(())
    }

    /// The timing error beyond which a note is missed.
    #[must_use]
    pub fn miss_boundary(&self) -> TimeSpan {
        self.tiers.last().map_or(TimeSpan::ZERO, |tier| tier.max_error)
    }
}

/// The outcome of [`ScoreCalculator::hit_note`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitResult {
    /// Nothing was judged.
    Pending,
    /// The note was hit.
    Hit {
        /// The rank of the tier.
        rank: i32,
        /// The timing error judged.
        error: TimeSpan,
        /// Score awarded for this note.
        score_added: u64,
        /// The score so far.
        total_score: u64,
        /// The combo including this note.
        combo: usize,
    },
    /// The note was missed. The combo is reset.
    Miss {
        /// The timing error judged.
        error: TimeSpan,
        /// The score so far.
        total_score: u64,
    },
}

/// A callback invoked for every judged note.
pub type ScoreListener = Box<dyn FnMut(&HitResult) + Send>;

/// Accumulates score and combo over the notes of a chart.
pub struct ScoreCalculator {
    config: ScoreConfig,
    max_notes: usize,
    base_score: u64,
    bonus: Vec<u64>,
    combo_score: Vec<u64>,
    score: u64,
    combo: usize,
    listeners: Vec<ScoreListener>,
}

impl std::fmt::Debug for ScoreCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreCalculator")
            .field("config", &self.config)
            .field("max_notes", &self.max_notes)
            .field("base_score", &self.base_score)
            .field("score", &self.score)
            .field("combo", &self.combo)
            .finish_non_exhaustive()
    }
}

/// Splits `max_bonus` over `notes` positions proportionally to `i + 1`, the last absorbing the remainder.
fn bonus_table(max_bonus: u64, notes: usize) -> Vec<u64> {
    if notes == 0 {
        return Vec::new();
    }
    let n = notes as u128;
    let triangle = n * (n + 1) / 2;
    let mut table: Vec<u64> = (1..=n)
        .map(|i| (u128::from(max_bonus) * i / triangle) as u64)
        .collect();
    let sum: u64 = table.iter().sum();
    if let Some(last) = table.last_mut() {
        *last += max_bonus - sum;
    }
    table
}

impl ScoreCalculator {
    /// Creates a calculator for a chart of `max_notes` notes.
    ///
    /// # Errors
    ///
    /// Returns a [`ScoreConfigError`] when `config` is invalid.
    pub fn new(config: ScoreConfig, max_notes: usize) -> Result<Self, ScoreConfigError> {
        config.validate()?;
        let mut calculator = Self {
            config,
            max_notes,
            base_score: 0,
            bonus: Vec::new(),
            combo_score: Vec::new(),
            score: 0,
            combo: 0,
            listeners: Vec::new(),
        };
        calculator.rebuild();
        Ok(calculator)
    }

    fn rebuild(&mut self) {
        let max_score = self.config.max_score as f64;
        let ratio = self.config.combo_bonus_ratio;
        let max_bonus = (max_score * ratio).floor() as u64;
        self.base_score = if self.max_notes == 0 {
            0
        } else {
            (max_score * (1.0 - ratio) / self.max_notes as f64).floor() as u64
        };
        self.bonus = bonus_table(max_bonus, self.max_notes);
        self.combo_score = self
            .bonus
            .iter()
            .map(|bonus| self.base_score + bonus)
            .collect();
        self.score = 0;
        self.combo = 0;
    }

    /// Changes the note count. The tables are rebuilt and the score and combo reset to zero.
    pub fn set_max_notes(&mut self, max_notes: usize) {
        self.max_notes = max_notes;
        self.rebuild();
    }

    /// Registers a listener invoked with every judged result.
    pub fn add_listener(&mut self, listener: impl FnMut(&HitResult) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &ScoreConfig {
        &self.config
    }

    /// The note count.
    #[must_use]
    pub const fn max_notes(&self) -> usize {
        self.max_notes
    }

    /// The base score of a note.
    #[must_use]
    pub const fn base_score_per_note(&self) -> u64 {
        self.base_score
    }

    /// The combo bonus per combo position.
    #[must_use]
    pub fn bonus_table(&self) -> &[u64] {
        &self.bonus
    }

    /// The score so far.
    #[must_use]
    pub const fn score(&self) -> u64 {
        self.score
    }

    /// The current combo.
    #[must_use]
    pub const fn combo(&self) -> usize {
        self.combo
    }

    /// Judges a note whose timing error is `error`, positive when the input came before the note.
    ///
    /// With `check_miss_only`, an early error (input before the note) is [`HitResult::Pending`] and nothing changes;
    /// any other error is judged as usual.
    pub fn hit_note(&mut self, error: TimeSpan, check_miss_only: bool) -> HitResult {
        let magnitude = if error < TimeSpan::ZERO {
            TimeSpan::ZERO - error
        } else {
            error
        };
        if check_miss_only && error > TimeSpan::ZERO {
            return HitResult::Pending;
        }
        let tier = self
            .config
            .tiers
            .iter()
            .find(|tier| magnitude < tier.max_error)
            .copied();
        let result = match tier {
            Some(tier) => {
                let index = self.combo.min(self.max_notes.saturating_sub(1));
                let combo_score = self.combo_score.get(index).copied().unwrap_or_default();
                let score_added = (combo_score as f64 * tier.weight).floor() as u64;
                self.combo += 1;
                self.score += score_added;
                HitResult::Hit {
                    rank: tier.rank,
                    error,
                    score_added,
                    total_score: self.score,
                    combo: self.combo,
                }
            }
            None => {
                self.combo = 0;
                HitResult::Miss {
                    error,
                    total_score: self.score,
                }
            }
        };
        for listener in &mut self.listeners {
            listener(&result);
        }
        result
    }
}
