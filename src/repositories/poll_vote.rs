//! # Poll Vote Repository
//!
//! Append-only access to the poll_votes log.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::poll_vote::{self, Entity as PollVote};

/// Repository for the vote log
#[derive(Debug, Clone)]
pub struct PollVoteRepository {
    db: Arc<DatabaseConnection>,
}

impl PollVoteRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Whether the exact (poll, voter, scenario) triple is already logged
    pub async fn exists(
        &self,
        poll_id: &str,
        voter_hash: &str,
        scenario: u8,
    ) -> Result<bool, RepositoryError> {
        let count = PollVote::find()
            .filter(poll_vote::Column::PollId.eq(poll_id))
            .filter(poll_vote::Column::VoterHash.eq(voter_hash))
            .filter(poll_vote::Column::ScenarioNumber.eq(i16::from(scenario)))
            .count(self.db.as_ref())
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(count > 0)
    }

    /// Append a vote. A duplicate triple surfaces as [`RepositoryError::Conflict`].
    pub async fn insert(
        &self,
        poll_id: &str,
        voter_hash: &str,
        scenario: u8,
    ) -> Result<(), RepositoryError> {
        let model = poll_vote::ActiveModel {
            id: Set(Uuid::new_v4()),
            poll_id: Set(poll_id.to_string()),
            voter_hash: Set(voter_hash.to_string()),
            scenario_number: Set(i16::from(scenario)),
            created_at: Set(Utc::now().into()),
        };

        PollVote::insert(model)
            .exec(self.db.as_ref())
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(())
    }
}
