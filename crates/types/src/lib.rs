//! Data types for the chain price sampler.
//!
//! The in-memory series is a single ordered list of [`Observation`]s. The
//! persisted form ([`SeriesDocument`]) keeps the column layout of the series
//! file: three index-aligned arrays plus a last-updated epoch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single price sample taken at a chain block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Block timestamp (Unix seconds, UTC)
    pub timestamp: i64,

    /// Block number the price was read at (>= 1)
    pub block: u64,

    /// Price of the tracked token (>= 0)
    pub price: f64,
}

impl Observation {
    pub fn new(timestamp: i64, block: u64, price: f64) -> Self {
        Self {
            timestamp,
            block,
            price,
        }
    }

    /// The observation time as a UTC datetime, if representable.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.datetime() {
            Some(dt) => write!(
                f,
                "block {} @ {} ({}): {:.8}",
                self.block,
                dt.format("%Y-%m-%d %H:%M:%S"),
                self.timestamp,
                self.price
            ),
            None => write!(f, "block {} @ {}: {:.8}", self.block, self.timestamp, self.price),
        }
    }
}

/// The most recent chain head as seen by the chain reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    /// Latest block number
    pub block: u64,

    /// Timestamp of that block (Unix seconds)
    pub timestamp: i64,
}

/// Outcome of resolving a target timestamp to a block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// The timestamp that was asked for
    pub target: i64,

    /// Best block found
    pub block: u64,

    /// Actual timestamp of `block`
    pub timestamp: i64,

    /// `|timestamp - target|` in seconds
    pub residual: i64,

    /// Number of refinement steps taken after the initial estimate
    pub iterations: u32,

    /// Whether `residual` is within the requested tolerance
    pub converged: bool,

    /// Seconds-per-block rate the estimate was built from
    pub seconds_per_block: f64,
}

/// On-disk shape of the series.
///
/// The three arrays are index-aligned: entry `i` of each describes the same
/// observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesDocument {
    #[serde(default)]
    pub timestamps: Vec<i64>,

    #[serde(default)]
    pub blocks: Vec<u64>,

    #[serde(default)]
    pub prices: Vec<f64>,

    /// Unix time (fractional seconds) of the last save
    #[serde(default)]
    pub last_updated: f64,
}

impl SeriesDocument {
    /// Build a document from an ordered series.
    pub fn from_observations(observations: &[Observation], last_updated: f64) -> Self {
        Self {
            timestamps: observations.iter().map(|o| o.timestamp).collect(),
            blocks: observations.iter().map(|o| o.block).collect(),
            prices: observations.iter().map(|o| o.price).collect(),
            last_updated,
        }
    }

    /// Whether all three columns have the same length.
    pub fn is_aligned(&self) -> bool {
        self.timestamps.len() == self.blocks.len() && self.blocks.len() == self.prices.len()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Rows of the document, in stored order. Returns `None` when the columns
    /// are not aligned.
    pub fn observations(&self) -> Option<Vec<Observation>> {
        if !self.is_aligned() {
            return None;
        }
        Some(
            self.timestamps
                .iter()
                .zip(&self.blocks)
                .zip(&self.prices)
                .map(|((&timestamp, &block), &price)| Observation::new(timestamp, block, price))
                .collect(),
        )
    }

    /// The last save time as a UTC datetime.
    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        let secs = self.last_updated.trunc() as i64;
        let nanos = (self.last_updated.fract() * 1e9) as u32;
        DateTime::from_timestamp(secs, nanos)
    }
}
