//! # Outage Signal Aggregation
//!
//! Builds the two dashboard payloads from per-region upstream data:
//! raw signal series for every region and a severity-ranked outage score table.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::fanout::{FanOutSettings, run_bounded};
use crate::regions::Region;
use crate::upstream::OutageSource;

pub mod severity;

pub use severity::Severity;

/// Default lookback when `hours` is not supplied.
pub const DEFAULT_LOOKBACK_HOURS: u32 = 24;
/// Upper bound on the lookback (one week).
pub const MAX_LOOKBACK_HOURS: u32 = 168;

/// Upstream measurement source for raw signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum Datasource {
    #[default]
    #[serde(rename = "bgp")]
    Bgp,
    #[serde(rename = "ping-slash24")]
    PingSlash24,
    #[serde(rename = "merit-nt")]
    MeritNt,
}

impl Datasource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Datasource::Bgp => "bgp",
            Datasource::PingSlash24 => "ping-slash24",
            Datasource::MeritNt => "merit-nt",
        }
    }
}

impl fmt::Display for Datasource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Datasource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "bgp" => Ok(Datasource::Bgp),
            "ping-slash24" => Ok(Datasource::PingSlash24),
            "merit-nt" => Ok(Datasource::MeritNt),
            other => Err(format!(
                "unknown datasource '{}'; expected one of bgp, ping-slash24, merit-nt",
                other
            )),
        }
    }
}

/// Clamp a requested lookback to `1..=168` hours, defaulting to 24.
pub fn clamp_hours(requested: Option<i64>) -> u32 {
    match requested {
        None => DEFAULT_LOOKBACK_HOURS,
        Some(hours) => hours.clamp(1, MAX_LOOKBACK_HOURS as i64) as u32,
    }
}

/// Query window in unix seconds, shared by every request of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: i64,
    pub until: i64,
}

impl TimeWindow {
    /// `[now - hours, now]`.
    pub fn lookback(now: DateTime<Utc>, hours: u32) -> Self {
        let until = now.timestamp();
        Self {
            from: until - i64::from(hours) * 3600,
            until,
        }
    }
}

/// Raw signal series for one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegionSignal {
    #[schema(example = "VE-A")]
    pub region_code: String,
    #[schema(example = "Distrito Capital")]
    pub region_name: String,
    #[schema(example = "bgp")]
    pub datasource: String,
    /// Start of the series (unix seconds)
    pub from: i64,
    /// Seconds between samples
    pub step: i64,
    /// Samples; `null` where the upstream had no data
    pub values: Vec<Option<f64>>,
}

/// Raw signals for every region that answered
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignalBatch {
    pub datasource: Datasource,
    /// Sorted by region code
    pub regions: Vec<RegionSignal>,
    pub fetched_at: DateTime<Utc>,
    /// Joined per-region failures, `null` when every region succeeded
    pub error: Option<String>,
}

/// Outage score for one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StateOutageScore {
    pub region_code: String,
    pub region_name: String,
    pub score: f64,
    pub severity: Severity,
}

impl StateOutageScore {
    fn new(region: &Region, score: f64) -> Self {
        Self {
            region_code: region.code.clone(),
            region_name: region.display_name.clone(),
            score,
            severity: Severity::classify(score),
        }
    }
}

/// Outage scores for every region
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutageScoreBatch {
    /// Sorted by score, highest first
    pub scores: Vec<StateOutageScore>,
    pub fetched_at: DateTime<Utc>,
    /// Joined per-region failures, `null` when every region succeeded
    pub error: Option<String>,
}

/// Sort region signals by region code.
pub fn sort_region_signals(regions: &mut [RegionSignal]) {
    regions.sort_by(|a, b| a.region_code.cmp(&b.region_code));
}

/// Sort scores highest first; equal scores fall back to region code.
pub fn sort_outage_scores(scores: &mut [StateOutageScore]) {
    scores.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.region_code.cmp(&b.region_code))
    });
}

/// Fetch raw signals for every region. Regions that fail are left out of the result and named
/// in `error`.
#[instrument(skip(source, regions, settings), fields(regions = regions.len()))]
pub async fn collect_region_signals(
    source: Arc<dyn OutageSource>,
    regions: &[Region],
    datasource: Datasource,
    window: TimeWindow,
    settings: FanOutSettings,
) -> SignalBatch {
    let report = run_bounded(regions.to_vec(), settings, move |region: Region| {
        let source = Arc::clone(&source);
        async move {
            source
                .region_signals(&region, datasource, window)
                .await
        }
    })
    .await;

    let error = report.error_summary(Region::label);
    let mut signals: Vec<RegionSignal> = report
        .completed
        .into_iter()
        .map(|(region, series)| RegionSignal {
            region_code: region.code,
            region_name: region.display_name,
            datasource: series.datasource,
            from: series.from,
            step: series.step,
            values: series.values,
        })
        .collect();
    sort_region_signals(&mut signals);

    info!(
        returned = signals.len(),
        failed = regions.len() - signals.len(),
        "Collected region signals"
    );

    SignalBatch {
        datasource,
        regions: signals,
        fetched_at: Utc::now(),
        error,
    }
}

/// Fetch outage scores for every region. Regions that fail get a zero score (severity
/// `normal`) so the table always lists every region; failures are named in `error`.
#[instrument(skip(source, regions, settings), fields(regions = regions.len()))]
pub async fn collect_outage_scores(
    source: Arc<dyn OutageSource>,
    regions: &[Region],
    window: TimeWindow,
    settings: FanOutSettings,
) -> OutageScoreBatch {
    let report = run_bounded(regions.to_vec(), settings, move |region: Region| {
        let source = Arc::clone(&source);
        async move { source.region_outage_score(&region, window).await }
    })
    .await;

    let error = report.error_summary(Region::label);
    let failed = report.failed.len();
    let mut scores: Vec<StateOutageScore> = report
        .completed
        .iter()
        .map(|(region, score)| StateOutageScore::new(region, *score))
        .chain(
            report
                .failed
                .iter()
                .map(|(region, _)| StateOutageScore::new(region, 0.0)),
        )
        .collect();
    sort_outage_scores(&mut scores);

    info!(returned = scores.len(), failed, "Collected outage scores");

    OutageScoreBatch {
        scores,
        fetched_at: Utc::now(),
        error,
    }
}
