//! # Scenario Votes
//!
//! One vote per voter per (poll, scenario). Every vote is appended to a log first; the
//! per-scenario counter only moves once the log entry is safely written, so a repeated vote
//! from the same voter is answered from the log and never counted twice.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::error::RepositoryError;

pub mod fingerprint;
pub mod store;

pub use fingerprint::{FingerprintError, VoteSalt, client_ip, voter_key};
pub use store::{DatabaseVoteStore, MemoryVoteStore};

/// Lowest and highest scenario numbers a poll offers.
pub const SCENARIO_RANGE: std::ops::RangeInclusive<i64> = 1..=5;

pub const INVALID_SCENARIO_MESSAGE: &str = "invalid scenario number";
pub const RECORD_FAILED_MESSAGE: &str = "failed to record vote";
pub const COUNT_FAILED_MESSAGE: &str = "failed to update vote count";

/// One entry of the vote log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VoteEntry {
    pub resource_id: String,
    pub voter_hash: String,
    pub scenario: u8,
}

/// Errors raised by a [`VoteStore`]
#[derive(Debug, Error)]
pub enum VoteStoreError {
    /// The exact log entry already exists
    #[error("vote already recorded")]
    Duplicate,
    #[error("poll not found: {0}")]
    NotFound(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<RepositoryError> for VoteStoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Conflict(_) => VoteStoreError::Duplicate,
            RepositoryError::NotFound(what) => VoteStoreError::NotFound(what),
            RepositoryError::Database(db_err) => VoteStoreError::Storage(db_err.to_string()),
        }
    }
}

/// Persistence for the vote log and the per-scenario counters.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Whether `entry` is already in the log.
    async fn has_voted(&self, entry: &VoteEntry) -> Result<bool, VoteStoreError>;

    /// Append `entry` to the log. A concurrent duplicate yields [`VoteStoreError::Duplicate`].
    async fn record_vote(&self, entry: &VoteEntry) -> Result<(), VoteStoreError>;

    /// Add one to the scenario counter and return the new value. Must be atomic with respect
    /// to other increments of the same counter.
    async fn increment_counter(
        &self,
        resource_id: &str,
        scenario: u8,
    ) -> Result<i64, VoteStoreError>;

    /// Counters for scenarios 1..=5.
    async fn tally(&self, resource_id: &str) -> Result<[i64; 5], VoteStoreError>;
}

/// What happened to a vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteResult {
    Counted { new_count: i64 },
    AlreadyVoted,
    Invalid,
    RecordFailed,
    CountFailed,
}

impl VoteResult {
    /// Label used for the `outcome` metric dimension.
    pub fn label(&self) -> &'static str {
        match self {
            VoteResult::Counted { .. } => "counted",
            VoteResult::AlreadyVoted => "already_voted",
            VoteResult::Invalid => "invalid",
            VoteResult::RecordFailed => "record_failed",
            VoteResult::CountFailed => "count_failed",
        }
    }

    pub fn outcome(&self) -> VoteOutcome {
        let failure = |message: &str| VoteOutcome {
            success: false,
            new_count: None,
            already_voted: None,
            error: Some(message.to_string()),
        };

        match self {
            VoteResult::Counted { new_count } => VoteOutcome {
                success: true,
                new_count: Some(*new_count),
                already_voted: None,
                error: None,
            },
            VoteResult::AlreadyVoted => VoteOutcome {
                success: false,
                new_count: None,
                already_voted: Some(true),
                error: None,
            },
            VoteResult::Invalid => failure(INVALID_SCENARIO_MESSAGE),
            VoteResult::RecordFailed => failure(RECORD_FAILED_MESSAGE),
            VoteResult::CountFailed => failure(COUNT_FAILED_MESSAGE),
        }
    }
}

/// Response body of a vote request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 42)]
    pub new_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_voted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Votes for one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScenarioCount {
    pub scenario: u8,
    pub votes: i64,
}

/// Current counters of a poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PollTally {
    pub poll_id: String,
    pub scenarios: Vec<ScenarioCount>,
    pub total: i64,
}

impl PollTally {
    fn new(poll_id: &str, counts: [i64; 5]) -> Self {
        Self {
            poll_id: poll_id.to_string(),
            scenarios: counts
                .iter()
                .zip(1u8..)
                .map(|(votes, scenario)| ScenarioCount {
                    scenario,
                    votes: *votes,
                })
                .collect(),
            total: counts.iter().sum(),
        }
    }
}

/// Casts and reports votes against an injected [`VoteStore`].
pub struct VoteService {
    store: Arc<dyn VoteStore>,
    salt: VoteSalt,
}

impl VoteService {
    pub fn new(store: Arc<dyn VoteStore>, salt: VoteSalt) -> Self {
        Self { store, salt }
    }

    /// Voter key for the client behind `headers`.
    pub fn voter_key_for(&self, headers: &HeaderMap) -> Result<String, FingerprintError> {
        voter_key(&client_ip(headers), &self.salt)
    }

    /// Cast one vote: validate, check the log, append to the log, then bump the counter.
    ///
    /// Invalid input is rejected before the store is touched. If the log write fails the
    /// counter is left alone.
    pub async fn cast_vote(&self, resource_id: &str, scenario: i64, voter_hash: &str) -> VoteResult {
        let result = self.try_cast(resource_id, scenario, voter_hash).await;
        counter!("umbral_votes_total", "outcome" => result.label()).increment(1);
        result
    }

    async fn try_cast(&self, resource_id: &str, scenario: i64, voter_hash: &str) -> VoteResult {
        let resource_id = resource_id.trim();
        if resource_id.is_empty() || !SCENARIO_RANGE.contains(&scenario) {
            debug!(resource_id, scenario, "Rejected vote with invalid input");
            return VoteResult::Invalid;
        }
        let Ok(scenario) = u8::try_from(scenario) else {
            return VoteResult::Invalid;
        };

        let entry = VoteEntry {
            resource_id: resource_id.to_string(),
            voter_hash: voter_hash.to_string(),
            scenario,
        };

        match self.store.has_voted(&entry).await {
            Ok(true) => return VoteResult::AlreadyVoted,
            Ok(false) => {}
            Err(err) => {
                error!(resource_id, scenario, error = %err, "Vote log lookup failed");
                return VoteResult::RecordFailed;
            }
        }

        if let Err(err) = self.store.record_vote(&entry).await {
            match err {
                VoteStoreError::Duplicate => {
                    warn!(resource_id, scenario, "Lost race on vote log insert")
                }
                other => error!(resource_id, scenario, error = %other, "Failed to record vote"),
            }
            return VoteResult::RecordFailed;
        }

        match self.store.increment_counter(resource_id, scenario).await {
            Ok(new_count) => {
                info!(resource_id, scenario, new_count, "Vote counted");
                VoteResult::Counted { new_count }
            }
            Err(err) => {
                error!(resource_id, scenario, error = %err, "Failed to update vote count");
                VoteResult::CountFailed
            }
        }
    }

    /// Current counters for `resource_id`.
    pub async fn tally(&self, resource_id: &str) -> Result<PollTally, VoteStoreError> {
        let counts = self.store.tally(resource_id).await?;
        Ok(PollTally::new(resource_id, counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps the memory store, counting calls and optionally failing a step.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryVoteStore,
        calls: AtomicUsize,
        increments: AtomicUsize,
        fail_record: bool,
        fail_increment: bool,
    }

    #[async_trait]
    impl VoteStore for CountingStore {
        async fn has_voted(&self, entry: &VoteEntry) -> Result<bool, VoteStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.has_voted(entry).await
        }

        async fn record_vote(&self, entry: &VoteEntry) -> Result<(), VoteStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_record {
                return Err(VoteStoreError::Storage("disk full".to_string()));
            }
            self.inner.record_vote(entry).await
        }

        async fn increment_counter(
            &self,
            resource_id: &str,
            scenario: u8,
        ) -> Result<i64, VoteStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.increments.fetch_add(1, Ordering::SeqCst);
            if self.fail_increment {
                return Err(VoteStoreError::Storage("timeout".to_string()));
            }
            self.inner.increment_counter(resource_id, scenario).await
        }

        async fn tally(&self, resource_id: &str) -> Result<[i64; 5], VoteStoreError> {
            self.inner.tally(resource_id).await
        }
    }

    fn service(store: Arc<CountingStore>) -> VoteService {
        VoteService::new(store, VoteSalt::new("test-salt"))
    }

    #[tokio::test]
    async fn test_out_of_range_scenarios_touch_nothing() {
        let store = Arc::new(CountingStore::default());
        let votes = service(store.clone());

        for scenario in [0, 6, -1, 300] {
            let result = votes.cast_vote("poll-1", scenario, "voter").await;
            assert_eq!(result, VoteResult::Invalid);
            assert_eq!(
                result.outcome().error.as_deref(),
                Some("invalid scenario number")
            );
        }
        assert_eq!(votes.cast_vote("  ", 3, "voter").await, VoteResult::Invalid);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeat_vote_counts_once() {
        let store = Arc::new(CountingStore::default());
        let votes = service(store.clone());

        assert_eq!(
            votes.cast_vote("poll-1", 2, "voter-a").await,
            VoteResult::Counted { new_count: 1 }
        );
        let repeat = votes.cast_vote("poll-1", 2, "voter-a").await;
        assert_eq!(repeat, VoteResult::AlreadyVoted);
        assert_eq!(repeat.outcome().already_voted, Some(true));
        assert!(!repeat.outcome().success);

        assert_eq!(store.increments.load(Ordering::SeqCst), 1);
        assert_eq!(votes.tally("poll-1").await.unwrap().scenarios[1].votes, 1);
    }

    #[tokio::test]
    async fn test_same_voter_other_scenario_is_counted() {
        let votes = service(Arc::new(CountingStore::default()));

        votes.cast_vote("poll-1", 1, "voter-a").await;
        assert_eq!(
            votes.cast_vote("poll-1", 4, "voter-a").await,
            VoteResult::Counted { new_count: 1 }
        );
        assert_eq!(
            votes.cast_vote("poll-1", 4, "voter-b").await,
            VoteResult::Counted { new_count: 2 }
        );
    }

    #[tokio::test]
    async fn test_record_failure_leaves_counter_alone() {
        let store = Arc::new(CountingStore {
            fail_record: true,
            ..Default::default()
        });
        let votes = service(store.clone());

        let result = votes.cast_vote("poll-1", 3, "voter-a").await;
        assert_eq!(result, VoteResult::RecordFailed);
        assert_eq!(result.outcome().error.as_deref(), Some("failed to record vote"));
        assert_eq!(store.increments.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_increment_failure_reported() {
        let store = Arc::new(CountingStore {
            fail_increment: true,
            ..Default::default()
        });
        let votes = service(store);

        let result = votes.cast_vote("poll-1", 3, "voter-a").await;
        assert_eq!(result, VoteResult::CountFailed);
        assert_eq!(
            result.outcome().error.as_deref(),
            Some("failed to update vote count")
        );
    }

    #[tokio::test]
    async fn test_concurrent_distinct_voters_never_lose_increments() {
        let votes = Arc::new(service(Arc::new(CountingStore::default())));

        let mut handles = Vec::new();
        for i in 0..50 {
            let votes = votes.clone();
            handles.push(tokio::spawn(async move {
                votes.cast_vote("poll-1", 5, &format!("voter-{i}")).await
            }));
        }
        for handle in handles {
            assert!(matches!(handle.await.unwrap(), VoteResult::Counted { .. }));
        }

        let tally = votes.tally("poll-1").await.unwrap();
        assert_eq!(tally.scenarios[4].votes, 50);
        assert_eq!(tally.total, 50);
    }

    #[test]
    fn test_outcome_serialization_omits_absent_fields() {
        let json = serde_json::to_value(VoteResult::Counted { new_count: 7 }.outcome()).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "newCount": 7}));

        let json = serde_json::to_value(VoteResult::AlreadyVoted.outcome()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"success": false, "alreadyVoted": true})
        );
    }
}
