//! Sampling loop.
//!
//! Each tick reads the chain head, backfills every missing canonical instant
//! in chronological order, then takes a live preview sample if nothing in the
//! series is close to the head. The series is saved after every merge.
//! Failures of a single step are logged and skipped; the next tick retries.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use chain_price_sampler_core::{
    BlockLocator, ChainError, ChainReader, LocatorConfig, OracleError, PriceOracle, SeriesConfig,
    SeriesStore, TargetSchedule,
};
use chain_price_sampler_types::{ChainTip, Observation};

use crate::persistence::{PersistenceError, SeriesPersistence};

/// Default backfill horizon.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

/// Default time between ticks (10 minutes).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Default pause between backfill steps.
pub const DEFAULT_BACKFILL_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The closest block found is further from the target than a canonical
    /// sample may be.
    #[error("no block close enough to {target}: best is {block} at {residual}s off")]
    ConvergenceIncomplete { target: i64, block: u64, residual: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerSettings {
    pub schedule: TargetSchedule,
    pub series: SeriesConfig,
    pub locator: LocatorConfig,
    pub lookback_days: u32,
    pub poll_interval: Duration,
    pub backfill_pause: Duration,
    pub preview_enabled: bool,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            schedule: TargetSchedule::default(),
            series: SeriesConfig::default(),
            locator: LocatorConfig::default(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            backfill_pause: DEFAULT_BACKFILL_PAUSE,
            preview_enabled: true,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Canonical samples merged
    pub backfilled: usize,

    /// Steps that failed and will be retried on a later tick
    pub failed: usize,

    /// Whether a preview sample was merged
    pub preview: bool,
}

pub struct Sampler<C, O, P> {
    chain: Arc<C>,
    locator: BlockLocator<Arc<C>>,
    oracle: O,
    persistence: P,
    store: SeriesStore,
    settings: SamplerSettings,
}

impl<C, O, P> Sampler<C, O, P>
where
    C: ChainReader,
    O: PriceOracle,
    P: SeriesPersistence,
{
    /// Build a sampler, loading the stored series from `persistence`.
    pub fn new(settings: SamplerSettings, chain: Arc<C>, oracle: O, persistence: P) -> Self {
        let store = SeriesStore::with_observations(
            settings.schedule.clone(),
            settings.series,
            persistence.load(),
        );
        Self {
            locator: BlockLocator::new(chain.clone(), settings.locator),
            chain,
            oracle,
            persistence,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }

    /// Read the chain head and report the loaded series. Failing here is
    /// fatal for the process.
    pub async fn start(&self) -> Result<ChainTip, ChainError> {
        let tip = self.chain.current_block_and_timestamp().await?;
        info!("Current block: {}, timestamp: {}", tip.block, tip.timestamp);
        info!(
            "Series: {} data points, canonical times {}",
            self.store.len(),
            self.settings.schedule
        );
        if let Some(latest) = self.store.latest() {
            info!("Latest: {}", latest);
            info!("Most recent prices: {:?}", self.store.recent_prices(5));
        }
        Ok(tip)
    }

    /// Run ticks forever.
    pub async fn run(&mut self) {
        loop {
            match self.tick().await {
                Ok(report) => {
                    info!(
                        "Tick done: {} backfilled, {} failed, preview: {}; {} data points",
                        report.backfilled,
                        report.failed,
                        report.preview,
                        self.store.len()
                    );
                    if let Some(latest) = self.store.latest() {
                        info!("Latest price: {:.8} (block {})", latest.price, latest.block);
                    }
                }
                Err(e) => error!("Tick failed: {}", e),
            }

            let wait = self.sleep_duration(chrono::Utc::now().timestamp());
            info!("Next check in {:.1} minutes", wait.as_secs_f64() / 60.0);
            tokio::time::sleep(wait).await;
        }
    }

    /// One pass: backfill, then preview.
    pub async fn tick(&mut self) -> Result<TickReport, SampleError> {
        let tip = self.chain.current_block_and_timestamp().await?;
        debug!("Tick at block {} ({})", tip.block, tip.timestamp);

        let mut report = TickReport::default();
        self.backfill(tip, &mut report).await;

        if self.settings.preview_enabled {
            match self.sample_preview(tip).await {
                Ok(merged) => report.preview = merged,
                Err(e) => {
                    warn!("Preview sample at block {} failed: {}", tip.block, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Time to sleep after a tick: the poll interval, cut short by the next
    /// canonical instant.
    pub fn sleep_duration(&self, now: i64) -> Duration {
        let until_next = (self.store.next_canonical_timestamp(now) - now).max(1) as u64;
        self.settings.poll_interval.min(Duration::from_secs(until_next))
    }

    async fn backfill(&mut self, tip: ChainTip, report: &mut TickReport) {
        let missing = self
            .store
            .missing_canonical_timestamps(tip.timestamp, self.settings.lookback_days);
        if missing.is_empty() {
            debug!("No canonical samples missing");
            return;
        }

        info!("Backfilling {} canonical samples", missing.len());
        let total = missing.len();
        for (i, target) in missing.into_iter().enumerate() {
            match self.sample_canonical(target).await {
                Ok(observation) => {
                    report.backfilled += 1;
                    info!("Backfilled {}/{}: {}", i + 1, total, observation);
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("Failed to backfill {}/{} (target {}): {}", i + 1, total, target, e);
                }
            }

            if i + 1 < total && !self.settings.backfill_pause.is_zero() {
                tokio::time::sleep(self.settings.backfill_pause).await;
            }
        }
    }

    async fn sample_canonical(&mut self, target: i64) -> Result<Observation, SampleError> {
        let resolution = self.locator.locate(target).await?;

        if !resolution.converged {
            warn!(
                "Block search for {} stopped after {} steps at block {}, {}s off (tolerance {}s)",
                target,
                resolution.iterations,
                resolution.block,
                resolution.residual,
                self.settings.locator.tolerance_secs
            );
            if resolution.residual > self.settings.series.canonical_tolerance_secs {
                return Err(SampleError::ConvergenceIncomplete {
                    target,
                    block: resolution.block,
                    residual: resolution.residual,
                });
            }
        }

        let price = self.oracle.price_at_block(resolution.block).await?;
        let observation = Observation::new(resolution.timestamp, resolution.block, price);
        self.merge_and_save(observation, true)?;
        Ok(observation)
    }

    /// Returns whether a preview was merged.
    async fn sample_preview(&mut self, tip: ChainTip) -> Result<bool, SampleError> {
        let window = self.settings.series.dedupe_window_secs;
        if self.store.has_observation_near(tip.timestamp, window) {
            if let Some(latest) = self.store.latest() {
                let remaining = (latest.timestamp + window - tip.timestamp).max(0);
                debug!("Next preview sample in {:.1} minutes", remaining as f64 / 60.0);
            }
            return Ok(false);
        }

        let price = self.oracle.price_at_block(tip.block).await?;
        let observation = Observation::new(tip.timestamp, tip.block, price);
        self.merge_and_save(observation, false)?;
        info!("Preview sample: {}", observation);
        Ok(true)
    }

    fn merge_and_save(&mut self, observation: Observation, is_canonical: bool) -> Result<(), SampleError> {
        let series = self.store.merge(observation, is_canonical);
        self.persistence.save(series)?;
        Ok(())
    }
}
