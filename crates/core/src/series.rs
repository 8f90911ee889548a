//! Ordered, bounded observation series.
//!
//! The store owns the only copy of the series and is the only place it is
//! mutated. Observations are kept sorted by timestamp; the oldest ones are
//! evicted once `max_points` is exceeded. The store remembers which entries
//! were merged as canonical so that previews never displace them.

use std::collections::BTreeSet;

use tracing::debug;

use chain_price_sampler_types::Observation;

use crate::schedule::{TargetSchedule, SECONDS_PER_DAY};

/// Default retention bound: 30 days of canonical samples plus room for one
/// preview between each pair.
pub const DEFAULT_MAX_POINTS: usize = 240;

/// Default proximity window for deduplication (30 minutes).
pub const DEFAULT_DEDUPE_WINDOW_SECS: i64 = 30 * 60;

/// Default distance from a canonical time under which a stored observation
/// counts as canonical (15 minutes).
pub const DEFAULT_CANONICAL_TOLERANCE_SECS: i64 = 15 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesConfig {
    /// Maximum number of retained observations
    pub max_points: usize,

    /// Observations closer than this are considered the same sample
    pub dedupe_window_secs: i64,

    /// Tolerance used to classify loaded observations as canonical, and the
    /// furthest a canonical sample may sit from its instant
    pub canonical_tolerance_secs: i64,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_POINTS,
            dedupe_window_secs: DEFAULT_DEDUPE_WINDOW_SECS,
            canonical_tolerance_secs: DEFAULT_CANONICAL_TOLERANCE_SECS,
        }
    }
}

pub struct SeriesStore {
    observations: Vec<Observation>,
    /// Timestamps of entries merged (or loaded) as canonical
    canonical: BTreeSet<i64>,
    schedule: TargetSchedule,
    config: SeriesConfig,
}

impl SeriesStore {
    /// Create an empty store.
    pub fn new(schedule: TargetSchedule, config: SeriesConfig) -> Self {
        Self {
            observations: Vec::new(),
            canonical: BTreeSet::new(),
            schedule,
            config,
        }
    }

    /// Create a store from previously persisted observations.
    ///
    /// Input order is not trusted: rows are sorted, rows sharing a timestamp
    /// collapse to the last one, and the result is trimmed to `max_points`.
    /// The persisted form carries no canonical flag, so rows within
    /// `canonical_tolerance_secs` of a canonical time are treated as canonical.
    pub fn with_observations(
        schedule: TargetSchedule,
        config: SeriesConfig,
        mut observations: Vec<Observation>,
    ) -> Self {
        observations.sort_by_key(|o| o.timestamp);
        // dedup_by keeps the first of a run; swap so the later row wins.
        observations.dedup_by(|later, earlier| {
            if later.timestamp == earlier.timestamp {
                std::mem::swap(later, earlier);
                true
            } else {
                false
            }
        });
        let canonical = observations
            .iter()
            .map(|o| o.timestamp)
            .filter(|&t| schedule.is_canonical(t, config.canonical_tolerance_secs))
            .collect();
        let mut store = Self {
            observations,
            canonical,
            schedule,
            config,
        };
        store.evict();
        store
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }

    /// Most recent observation.
    pub fn latest(&self) -> Option<&Observation> {
        self.observations.last()
    }

    /// Prices of the last `n` observations, oldest first.
    pub fn recent_prices(&self, n: usize) -> Vec<f64> {
        let start = self.observations.len().saturating_sub(n);
        self.observations[start..].iter().map(|o| o.price).collect()
    }

    /// Insert `observation` in timestamp order.
    ///
    /// An existing observation with the same timestamp is replaced; the slot
    /// stays canonical if either side is. A non-canonical observation
    /// replaces the entry right before it when that entry was not merged as
    /// canonical, so previews between two canonical ticks never pile up.
    /// Oldest entries are evicted past `max_points`.
    pub fn merge(&mut self, observation: Observation, is_canonical: bool) -> &[Observation] {
        let pos = self
            .observations
            .partition_point(|o| o.timestamp < observation.timestamp);

        if pos < self.observations.len() && self.observations[pos].timestamp == observation.timestamp {
            debug!("Replacing observation at {}", observation.timestamp);
            self.observations[pos] = observation;
            if is_canonical {
                self.canonical.insert(observation.timestamp);
            }
        } else if !is_canonical && pos > 0 && !self.is_canonical_entry(&self.observations[pos - 1]) {
            // prev.timestamp < observation.timestamp < next.timestamp, so
            // overwriting in place keeps the order.
            debug!(
                "Preview at {} supersedes preview at {}",
                observation.timestamp,
                self.observations[pos - 1].timestamp
            );
            self.observations[pos - 1] = observation;
        } else {
            self.observations.insert(pos, observation);
            if is_canonical {
                self.canonical.insert(observation.timestamp);
            }
        }

        self.evict();
        &self.observations
    }

    /// Canonical instants of the last `lookback_days` UTC days (today
    /// included) that are before `now` and have no observation within the
    /// dedupe window, oldest first.
    ///
    /// When the series is full, instants older than its oldest observation
    /// are skipped: they would be evicted again right after being merged.
    pub fn missing_canonical_timestamps(&self, now: i64, lookback_days: u32) -> Vec<i64> {
        if lookback_days == 0 {
            return Vec::new();
        }

        let mut from =
            TargetSchedule::day_start(now) - (lookback_days as i64 - 1) * SECONDS_PER_DAY;
        if self.observations.len() >= self.config.max_points {
            if let Some(oldest) = self.observations.first() {
                from = from.max(oldest.timestamp);
            }
        }

        self.schedule
            .instants_between(from, now)
            .into_iter()
            .filter(|&t| !self.has_observation_near(t, self.config.dedupe_window_secs))
            .collect()
    }

    /// Smallest canonical instant strictly after `now`.
    pub fn next_canonical_timestamp(&self, now: i64) -> i64 {
        self.schedule.next_after(now)
    }

    /// Whether `timestamp` is within `tolerance` seconds of a canonical time
    /// of day.
    pub fn is_canonical_time(&self, timestamp: i64, tolerance: i64) -> bool {
        self.schedule.is_canonical(timestamp, tolerance)
    }

    /// Whether any observation lies within `window` seconds of `timestamp`.
    pub fn has_observation_near(&self, timestamp: i64, window: i64) -> bool {
        let pos = self
            .observations
            .partition_point(|o| o.timestamp < timestamp);
        let after = self.observations.get(pos);
        let before = pos.checked_sub(1).and_then(|i| self.observations.get(i));

        [before, after]
            .into_iter()
            .flatten()
            .any(|o| (o.timestamp - timestamp).abs() <= window)
    }

    /// Whether the stored entry at `observation.timestamp` counts as canonical.
    pub fn is_canonical_entry(&self, observation: &Observation) -> bool {
        self.canonical.contains(&observation.timestamp)
    }

    fn evict(&mut self) {
        let excess = self.observations.len().saturating_sub(self.config.max_points);
        if excess > 0 {
            for evicted in self.observations.drain(..excess) {
                self.canonical.remove(&evicted.timestamp);
            }
            debug!("Evicted {} oldest observations", excess);
        }
    }
}
