use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Context};

use chain_price_sampler_core::chain::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY};
use chain_price_sampler_core::oracle::{
    DEFAULT_BASE_POOL_SLOT, DEFAULT_POOL_MANAGER, DEFAULT_QUOTE_POOL_SLOT,
    DEFAULT_QUOTE_SCALE_DECIMALS,
};
use chain_price_sampler_core::series::{
    DEFAULT_CANONICAL_TOLERANCE_SECS, DEFAULT_DEDUPE_WINDOW_SECS, DEFAULT_MAX_POINTS,
};
use chain_price_sampler_core::{
    locator, LocatorConfig, PoolPair, RetryPolicy, SeriesConfig, TargetSchedule, DEFAULT_RPC_URL,
};

use crate::persistence::DEFAULT_SERIES_FILE;
use crate::sampler::{SamplerSettings, DEFAULT_BACKFILL_PAUSE, DEFAULT_LOOKBACK_DAYS, DEFAULT_POLL_INTERVAL};

/// Sampler configuration derived from `SAMPLER_*` environment variables.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub rpc_url: String,
    pub series_file: PathBuf,
    pub pair: PoolPair,
    pub retry: RetryPolicy,
    pub settings: SamplerSettings,
}

fn env_str(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"))
        .unwrap_or(default)
}

impl SamplerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let contract = env_str("SAMPLER_POOL_MANAGER", DEFAULT_POOL_MANAGER);
        let base_slot = env_str("SAMPLER_BASE_POOL_SLOT", DEFAULT_BASE_POOL_SLOT);
        let quote_slot = env_str("SAMPLER_QUOTE_POOL_SLOT", DEFAULT_QUOTE_POOL_SLOT);
        let hours = env_str("SAMPLER_CANONICAL_HOURS", "0,6,12,18");

        let pair = PoolPair {
            contract: contract
                .parse()
                .with_context(|| format!("SAMPLER_POOL_MANAGER: bad address {contract:?}"))?,
            base_slot: base_slot
                .parse()
                .with_context(|| format!("SAMPLER_BASE_POOL_SLOT: bad storage key {base_slot:?}"))?,
            quote_slot: quote_slot
                .parse()
                .with_context(|| format!("SAMPLER_QUOTE_POOL_SLOT: bad storage key {quote_slot:?}"))?,
            quote_scale_decimals: env_i64(
                "SAMPLER_QUOTE_SCALE_DECIMALS",
                DEFAULT_QUOTE_SCALE_DECIMALS.into(),
            )
            .try_into()
            .context("SAMPLER_QUOTE_SCALE_DECIMALS out of range")?,
        };

        let schedule: TargetSchedule = hours
            .parse()
            .with_context(|| format!("SAMPLER_CANONICAL_HOURS: bad hour list {hours:?}"))?;

        let settings = SamplerSettings {
            schedule,
            series: SeriesConfig {
                max_points: env_u64("SAMPLER_MAX_POINTS", DEFAULT_MAX_POINTS as u64)
                    .try_into()
                    .context("SAMPLER_MAX_POINTS out of range")?,
                dedupe_window_secs: env_i64("SAMPLER_DEDUPE_WINDOW_SECS", DEFAULT_DEDUPE_WINDOW_SECS),
                canonical_tolerance_secs: env_i64(
                    "SAMPLER_CANONICAL_TOLERANCE_SECS",
                    DEFAULT_CANONICAL_TOLERANCE_SECS,
                ),
            },
            locator: LocatorConfig {
                tolerance_secs: env_i64("SAMPLER_LOCATOR_TOLERANCE_SECS", locator::DEFAULT_TOLERANCE_SECS),
                max_iterations: env_u64(
                    "SAMPLER_LOCATOR_MAX_ITERATIONS",
                    locator::DEFAULT_MAX_ITERATIONS.into(),
                )
                .try_into()
                .context("SAMPLER_LOCATOR_MAX_ITERATIONS out of range")?,
            },
            lookback_days: env_u64("SAMPLER_LOOKBACK_DAYS", DEFAULT_LOOKBACK_DAYS.into())
                .try_into()
                .context("SAMPLER_LOOKBACK_DAYS out of range")?,
            poll_interval: Duration::from_secs(env_u64(
                "SAMPLER_POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL.as_secs(),
            )),
            backfill_pause: Duration::from_millis(env_u64(
                "SAMPLER_BACKFILL_PAUSE_MS",
                DEFAULT_BACKFILL_PAUSE.as_millis() as u64,
            )),
            preview_enabled: env_bool("SAMPLER_PREVIEW_ENABLED", true),
        };
        validate(&settings)?;

        Ok(Self {
            rpc_url: env_str("SAMPLER_RPC_URL", DEFAULT_RPC_URL),
            series_file: PathBuf::from(env_str("SAMPLER_SERIES_FILE", DEFAULT_SERIES_FILE)),
            pair,
            retry: RetryPolicy::new(
                env_u64("SAMPLER_RPC_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS.into())
                    .try_into()
                    .context("SAMPLER_RPC_RETRY_ATTEMPTS out of range")?,
                Duration::from_millis(env_u64(
                    "SAMPLER_RPC_RETRY_DELAY_MS",
                    DEFAULT_RETRY_DELAY.as_millis() as u64,
                )),
            ),
            settings,
        })
    }
}

/// Canonical samples must stay recognisable as canonical: the locator may
/// not accept more slack than the canonical tolerance, and that tolerance
/// must fit inside the dedupe window.
fn validate(settings: &SamplerSettings) -> anyhow::Result<()> {
    let series = &settings.series;
    ensure!(series.max_points > 0, "SAMPLER_MAX_POINTS must be at least 1");
    ensure!(
        series.dedupe_window_secs >= 0,
        "SAMPLER_DEDUPE_WINDOW_SECS must not be negative"
    );
    ensure!(
        settings.locator.tolerance_secs >= 0
            && settings.locator.tolerance_secs <= series.canonical_tolerance_secs,
        "SAMPLER_LOCATOR_TOLERANCE_SECS ({}) must be between 0 and SAMPLER_CANONICAL_TOLERANCE_SECS ({})",
        settings.locator.tolerance_secs,
        series.canonical_tolerance_secs
    );
    ensure!(
        series.canonical_tolerance_secs <= series.dedupe_window_secs,
        "SAMPLER_CANONICAL_TOLERANCE_SECS ({}) must not exceed SAMPLER_DEDUPE_WINDOW_SECS ({})",
        series.canonical_tolerance_secs,
        series.dedupe_window_secs
    );
    Ok(())
}
