//! # Bounded Fan-Out
//!
//! Runs one async fetch per item with a fixed ceiling on how many are in flight. A permit is
//! taken from a local [`Semaphore`] before each task is spawned and released when that task's
//! fetch settles, so the next pending item starts as soon as any slot frees up.
//!
//! Failures never abort the batch: each one is recorded against its item. Successes come back in
//! completion order and callers impose their own ordering; failures are listed in input order so
//! the same failures always summarize to the same string.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::upstream::UpstreamError;

/// Concurrency ceiling and per-item time budget for one batch.
#[derive(Debug, Clone, Copy)]
pub struct FanOutSettings {
    pub concurrency: usize,
    pub item_timeout: Duration,
}

impl Default for FanOutSettings {
    fn default() -> Self {
        Self::from(&UpstreamConfig::default())
    }
}

impl From<&UpstreamConfig> for FanOutSettings {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            concurrency: config.fanout_concurrency,
            item_timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// Outcome of a batch.
#[derive(Debug)]
pub struct FanOutReport<I, T> {
    /// Successful items, in completion order
    pub completed: Vec<(I, T)>,
    /// Failed items with the reason, in input order
    pub failed: Vec<(I, UpstreamError)>,
}

impl<I, T> FanOutReport<I, T> {
    /// Total number of items that settled.
    pub fn attempted(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    /// `"<label>: <reason>"` for every failure joined with `"; "`, or `None` if all succeeded.
    pub fn error_summary(&self, label: impl Fn(&I) -> String) -> Option<String> {
        if self.failed.is_empty() {
            return None;
        }
        Some(
            self.failed
                .iter()
                .map(|(item, error)| format!("{}: {}", label(item), error))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Fetch every item with at most `settings.concurrency` fetches in flight.
///
/// A concurrency of 0 is treated as 1. Each fetch is bounded by `settings.item_timeout`.
pub async fn run_bounded<I, T, F, Fut>(
    items: Vec<I>,
    settings: FanOutSettings,
    fetch: F,
) -> FanOutReport<I, T>
where
    I: Clone + Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
{
    let started = Instant::now();
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(settings.concurrency.max(1)));
    let fetch = Arc::new(fetch);
    let timeout = settings.item_timeout;

    // Items leave this map when their task reports back; anything left over never settled.
    let mut pending: HashMap<usize, I> = items.into_iter().enumerate().collect();
    let mut tasks = JoinSet::new();
    let mut completed = Vec::with_capacity(total);
    let mut failed: Vec<(usize, I, UpstreamError)> = Vec::new();

    for index in 0..total {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let Some(item) = pending.get(&index).cloned() else {
            continue;
        };
        let fetch = Arc::clone(&fetch);

        tasks.spawn(async move {
            let _permit = permit;
            let outcome = match tokio::time::timeout(timeout, fetch(item)).await {
                Ok(result) => result,
                Err(_) => Err(UpstreamError::Timeout(timeout.as_millis() as u64)),
            };
            (index, outcome)
        });

        // Collect whatever already finished so results do not pile up in the set.
        while let Some(joined) = tasks.try_join_next() {
            settle(joined, &mut pending, &mut completed, &mut failed);
        }
    }

    while let Some(joined) = tasks.join_next().await {
        settle(joined, &mut pending, &mut completed, &mut failed);
    }

    for (index, item) in pending.drain() {
        failed.push((
            index,
            item,
            UpstreamError::Aborted("task did not complete".to_string()),
        ));
    }
    failed.sort_by_key(|(index, _, _)| *index);

    let report = FanOutReport {
        completed,
        failed: failed
            .into_iter()
            .map(|(_, item, error)| (item, error))
            .collect(),
    };

    counter!("umbral_fanout_items_total").increment(total as u64);
    counter!("umbral_fanout_failures_total").increment(report.failed.len() as u64);
    histogram!("umbral_fanout_duration_ms").record(started.elapsed().as_secs_f64() * 1_000.0);
    debug!(
        items = total,
        failed = report.failed.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Fan-out batch settled"
    );

    report
}

fn settle<I, T>(
    joined: Result<(usize, Result<T, UpstreamError>), tokio::task::JoinError>,
    pending: &mut HashMap<usize, I>,
    completed: &mut Vec<(I, T)>,
    failed: &mut Vec<(usize, I, UpstreamError)>,
) {
    match joined {
        Ok((index, outcome)) => {
            let Some(item) = pending.remove(&index) else {
                return;
            };
            match outcome {
                Ok(value) => completed.push((item, value)),
                Err(error) => failed.push((index, item, error)),
            }
        }
        // The item stays in `pending` and is reported as aborted once the batch drains.
        Err(join_error) => warn!(error = %join_error, "Fan-out task failed to complete"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings(concurrency: usize) -> FanOutSettings {
        FanOutSettings {
            concurrency,
            item_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_ceiling() {
        for (items, limit) in [(25usize, 5usize), (3, 5), (10, 1), (12, 4)] {
            let in_flight = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));
            let calls = Arc::new(AtomicUsize::new(0));

            let (f, p, c) = (in_flight.clone(), peak.clone(), calls.clone());
            let report = run_bounded((0..items).collect(), settings(limit), move |i: usize| {
                let (f, p, c) = (f.clone(), p.clone(), c.clone());
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    let now = f.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5 + (i as u64 % 3) * 3)).await;
                    f.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, UpstreamError>(i)
                }
            })
            .await;

            assert!(peak.load(Ordering::SeqCst) <= limit.min(items));
            assert_eq!(calls.load(Ordering::SeqCst), items);
            assert_eq!(report.completed.len(), items);
            assert_eq!(in_flight.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_completes() {
        let report = run_bounded(vec![1, 2, 3], settings(0), |i: i32| async move {
            Ok::<_, UpstreamError>(i * 10)
        })
        .await;

        let mut values: Vec<i32> = report.completed.into_iter().map(|(_, v)| v).collect();
        values.sort();
        assert_eq!(values, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_partial_failure_is_collected() {
        let report = run_bounded(vec!["a", "b", "c", "d"], settings(2), |item: &'static str| async move {
            if item == "c" {
                Err(UpstreamError::Status {
                    status: 503,
                    body: None,
                })
            } else {
                Ok(item.len())
            }
        })
        .await;

        assert_eq!(report.attempted(), 4);
        assert_eq!(report.completed.len(), 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "c");

        let summary = report.error_summary(|item| format!("region {item}")).unwrap();
        assert_eq!(summary, "region c: upstream returned HTTP 503");
    }

    #[tokio::test]
    async fn test_failures_listed_in_input_order() {
        // Later items fail first, so completion order is the reverse of input order.
        let report = run_bounded(vec![0u64, 1, 2, 3], settings(4), |i: u64| async move {
            tokio::time::sleep(Duration::from_millis((3 - i) * 15)).await;
            Err::<(), _>(UpstreamError::Status {
                status: 500 + i as u16,
                body: None,
            })
        })
        .await;

        let order: Vec<u64> = report.failed.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(
            report.error_summary(|i| format!("r{i}")).unwrap(),
            "r0: upstream returned HTTP 500; r1: upstream returned HTTP 501; \
             r2: upstream returned HTTP 502; r3: upstream returned HTTP 503"
        );
    }

    #[tokio::test]
    async fn test_panics_and_errors_share_input_order() {
        let report = run_bounded(vec![0u8, 1, 2, 3], settings(4), |i: u8| async move {
            match i {
                0 => {
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    Err(UpstreamError::Transport("reset".to_string()))
                }
                1 | 3 => panic!("fetcher bug {i}"),
                _ => Ok(i),
            }
        })
        .await;

        let order: Vec<u8> = report.failed.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 3]);
        assert_eq!(report.completed.len(), 1);
    }

    #[tokio::test]
    async fn test_error_summary_none_when_clean() {
        let report = run_bounded(vec![1u8], settings(1), |i: u8| async move {
            Ok::<_, UpstreamError>(i)
        })
        .await;
        assert!(report.error_summary(|i| i.to_string()).is_none());
    }

    #[tokio::test]
    async fn test_slow_item_times_out_without_blocking_batch() {
        let report = run_bounded(
            vec![0u64, 1, 2],
            FanOutSettings {
                concurrency: 3,
                item_timeout: Duration::from_millis(50),
            },
            |i: u64| async move {
                if i == 1 {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                }
                Ok::<_, UpstreamError>(i)
            },
        )
        .await;

        assert_eq!(report.completed.len(), 2);
        assert!(matches!(
            report.failed.as_slice(),
            [(1, UpstreamError::Timeout(50))]
        ));
    }

    #[tokio::test]
    async fn test_panicking_fetch_reported_as_aborted() {
        let report = run_bounded(vec![0u8, 1], settings(2), |i: u8| async move {
            if i == 1 {
                panic!("fetcher bug");
            }
            Ok::<_, UpstreamError>(i)
        })
        .await;

        assert_eq!(report.completed.len(), 1);
        assert!(matches!(
            report.failed.as_slice(),
            [(1, UpstreamError::Aborted(_))]
        ));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let report = run_bounded(Vec::<u8>::new(), settings(5), |i: u8| async move {
            Ok::<_, UpstreamError>(i)
        })
        .await;
        assert_eq!(report.attempted(), 0);
    }
}
