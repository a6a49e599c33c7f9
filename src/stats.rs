//! Reduces the outcomes of a finished run into a [`Summary`].
//!
//! Latency figures only ever look at successful attempts; a failed request has no
//! meaningful response time. When nothing succeeded there is no latency data at all, which
//! is reported as `None` rather than as zeros.
//!
//! Standard deviation uses the population formula (divide by the number of samples).

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serializer;
use serde_derive::Serialize;

use crate::dispatch::{Dispatch, Outcome};

/// Latency statistics over successful attempts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Latency {
    #[serde(rename = "mean_ms", serialize_with = "millis")]
    pub mean: Duration,
    #[serde(rename = "min_ms", serialize_with = "millis")]
    pub min: Duration,
    #[serde(rename = "max_ms", serialize_with = "millis")]
    pub max: Duration,
    #[serde(rename = "stddev_ms", serialize_with = "millis")]
    pub stddev: Duration,
    #[serde(rename = "p50_ms", serialize_with = "millis")]
    pub p50: Duration,
    #[serde(rename = "p95_ms", serialize_with = "millis")]
    pub p95: Duration,
    #[serde(rename = "p99_ms", serialize_with = "millis")]
    pub p99: Duration,
}

impl Latency {
    /// Returns `None` for an empty sample set.
    pub fn from_samples(mut samples: Vec<Duration>) -> Option<Latency> {
        if samples.is_empty() {
            return None;
        }

        samples.sort();

        let n = samples.len();
        let sum: u128 = samples.iter().map(Duration::as_nanos).sum();
        let mean_nanos = sum as f64 / n as f64;

        let variance = samples
            .iter()
            .map(|d| {
                let delta = d.as_nanos() as f64 - mean_nanos;
                delta * delta
            })
            .sum::<f64>()
            / n as f64;

        Some(Latency {
            mean: Duration::from_nanos((sum / n as u128) as u64),
            min: samples[0],
            max: samples[n - 1],
            stddev: Duration::from_nanos(variance.sqrt().round() as u64),
            p50: percentile(&samples, 50),
            p95: percentile(&samples, 95),
            p99: percentile(&samples, 99),
        })
    }
}

/// Nearest-rank percentile of an already sorted, non-empty slice. `p` is in percent.
fn percentile(sorted: &[Duration], p: usize) -> Duration {
    // ceil(p * n / 100) in integers
    let rank = (p * sorted.len() + 99) / 100;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

/// The final report of a run. Computed once from the complete set of outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    /// Includes cancelled attempts.
    pub failed: usize,
    pub cancelled: usize,
    /// Fraction of attempts that succeeded, `0.0..=1.0`.
    pub success_rate: f64,
    /// `None` when no attempt succeeded.
    pub latency: Option<Latency>,
    #[serde(rename = "wall_seconds", serialize_with = "seconds")]
    pub wall: Duration,
    /// Attempts per second of wall time.
    pub throughput: f64,
    /// Successful attempts per second of wall time.
    pub success_throughput: f64,
    /// How many responses came back with each status code.
    pub statuses: BTreeMap<u16, usize>,
}

impl Summary {
    /// Panics if `outcomes` is empty or `wall` is zero; both mean the caller never ran
    /// anything.
    pub fn new(outcomes: &[Outcome], wall: Duration) -> Summary {
        assert!(!outcomes.is_empty(), "cannot summarise a run without outcomes");
        assert!(wall > Duration::default(), "cannot summarise a run with zero wall time");

        let total = outcomes.len();
        let mut statuses = BTreeMap::new();
        let mut samples = Vec::with_capacity(total);
        let mut cancelled = 0;

        for outcome in outcomes {
            if let Some(code) = outcome.status {
                *statuses.entry(code).or_insert(0) += 1;
            }
            if outcome.succeeded() {
                samples.push(outcome.duration);
            } else if outcome.cancelled() {
                cancelled += 1;
            }
        }

        let succeeded = samples.len();
        let secs = wall.as_secs_f64();

        Summary {
            total,
            succeeded,
            failed: total - succeeded,
            cancelled,
            success_rate: succeeded as f64 / total as f64,
            latency: Latency::from_samples(samples),
            wall,
            throughput: total as f64 / secs,
            success_throughput: succeeded as f64 / secs,
            statuses,
        }
    }
}

impl From<&Dispatch> for Summary {
    fn from(run: &Dispatch) -> Summary {
        Summary::new(&run.outcomes, run.wall)
    }
}

fn millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1e3)
}

fn seconds<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
