//! Vote store implementations.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use tokio::sync::Mutex;

use super::{VoteEntry, VoteStore, VoteStoreError};
use crate::repositories::{PollRepository, PollVoteRepository};

/// Vote store backed by the `polls` and `poll_votes` tables.
#[derive(Debug, Clone)]
pub struct DatabaseVoteStore {
    polls: PollRepository,
    votes: PollVoteRepository,
}

impl DatabaseVoteStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            polls: PollRepository::new(db.clone()),
            votes: PollVoteRepository::new(db),
        }
    }
}

#[async_trait]
impl VoteStore for DatabaseVoteStore {
    async fn has_voted(&self, entry: &VoteEntry) -> Result<bool, VoteStoreError> {
        Ok(self
            .votes
            .exists(&entry.resource_id, &entry.voter_hash, entry.scenario)
            .await?)
    }

    async fn record_vote(&self, entry: &VoteEntry) -> Result<(), VoteStoreError> {
        // A vote for an unknown poll must not leave an orphaned log entry.
        if self.polls.find_by_id(&entry.resource_id).await?.is_none() {
            return Err(VoteStoreError::NotFound(entry.resource_id.clone()));
        }

        self.votes
            .insert(&entry.resource_id, &entry.voter_hash, entry.scenario)
            .await?;
        Ok(())
    }

    async fn increment_counter(
        &self,
        resource_id: &str,
        scenario: u8,
    ) -> Result<i64, VoteStoreError> {
        Ok(self.polls.increment_scenario(resource_id, scenario).await?)
    }

    async fn tally(&self, resource_id: &str) -> Result<[i64; 5], VoteStoreError> {
        Ok(self.polls.tally(resource_id).await?)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    log: HashSet<VoteEntry>,
    counters: HashMap<String, [i64; 5]>,
}

/// In-process vote store used when no database is configured. Polls spring into existence
/// on their first vote and unknown polls tally as all zeros.
#[derive(Debug, Default)]
pub struct MemoryVoteStore {
    state: Mutex<MemoryState>,
}

impl MemoryVoteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn slot(scenario: u8) -> Result<usize, VoteStoreError> {
    match scenario {
        1..=5 => Ok(usize::from(scenario - 1)),
        other => Err(VoteStoreError::NotFound(format!("scenario {}", other))),
    }
}

#[async_trait]
impl VoteStore for MemoryVoteStore {
    async fn has_voted(&self, entry: &VoteEntry) -> Result<bool, VoteStoreError> {
        Ok(self.state.lock().await.log.contains(entry))
    }

    async fn record_vote(&self, entry: &VoteEntry) -> Result<(), VoteStoreError> {
        if self.state.lock().await.log.insert(entry.clone()) {
            Ok(())
        } else {
            Err(VoteStoreError::Duplicate)
        }
    }

    async fn increment_counter(
        &self,
        resource_id: &str,
        scenario: u8,
    ) -> Result<i64, VoteStoreError> {
        let index = slot(scenario)?;
        let mut state = self.state.lock().await;
        let counters = state.counters.entry(resource_id.to_string()).or_default();
        counters[index] += 1;
        Ok(counters[index])
    }

    async fn tally(&self, resource_id: &str) -> Result<[i64; 5], VoteStoreError> {
        Ok(self
            .state
            .lock()
            .await
            .counters
            .get(resource_id)
            .copied()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(voter: &str, scenario: u8) -> VoteEntry {
        VoteEntry {
            resource_id: "poll-1".to_string(),
            voter_hash: voter.to_string(),
            scenario,
        }
    }

    #[tokio::test]
    async fn test_memory_log_rejects_duplicates() {
        let store = MemoryVoteStore::new();

        assert!(!store.has_voted(&entry("a", 1)).await.unwrap());
        store.record_vote(&entry("a", 1)).await.unwrap();
        assert!(store.has_voted(&entry("a", 1)).await.unwrap());
        assert!(matches!(
            store.record_vote(&entry("a", 1)).await,
            Err(VoteStoreError::Duplicate)
        ));
        assert!(!store.has_voted(&entry("a", 2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_counters() {
        let store = MemoryVoteStore::new();

        assert_eq!(store.tally("poll-1").await.unwrap(), [0; 5]);
        assert_eq!(store.increment_counter("poll-1", 3).await.unwrap(), 1);
        assert_eq!(store.increment_counter("poll-1", 3).await.unwrap(), 2);
        assert_eq!(store.increment_counter("poll-1", 5).await.unwrap(), 1);
        assert_eq!(store.tally("poll-1").await.unwrap(), [0, 0, 2, 0, 1]);
        assert!(store.increment_counter("poll-1", 6).await.is_err());
    }
}
