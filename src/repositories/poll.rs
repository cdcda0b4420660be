//! # Poll Repository
//!
//! SeaORM operations for the polls table: lookup, creation and the per-scenario counters.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait,
    prelude::DateTimeWithTimeZone, sea_query::Expr,
};

use crate::error::RepositoryError;
use crate::models::poll::{self, Entity as Poll};

/// Repository for poll database operations
#[derive(Debug, Clone)]
pub struct PollRepository {
    db: Arc<DatabaseConnection>,
}

impl PollRepository {
    /// Creates a new PollRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Finds a poll by its identifier
    pub async fn find_by_id(&self, id: &str) -> Result<Option<poll::Model>, RepositoryError> {
        Poll::find_by_id(id.to_string())
            .one(self.db.as_ref())
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Creates a poll with all counters at zero
    pub async fn create(&self, id: &str, title: &str) -> Result<poll::Model, RepositoryError> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let model = poll::ActiveModel {
            id: Set(id.to_string()),
            title: Set(title.to_string()),
            scenario_1_votes: Set(0),
            scenario_2_votes: Set(0),
            scenario_3_votes: Set(0),
            scenario_4_votes: Set(0),
            scenario_5_votes: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Poll::insert(model)
            .exec(self.db.as_ref())
            .await
            .map_err(RepositoryError::database_error)?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("poll '{}' not persisted", id)))
    }

    /// Atomically add one to the counter for `scenario` and return the new value.
    ///
    /// The increment is a single `SET col = col + 1` statement, so concurrent voters never
    /// overwrite each other. The read-back happens in the same transaction, while the row is
    /// still locked by the update.
    pub async fn increment_scenario(&self, id: &str, scenario: u8) -> Result<i64, RepositoryError> {
        let column = poll::Column::scenario_votes(scenario).ok_or_else(|| {
            RepositoryError::NotFound(format!("scenario {} on poll '{}'", scenario, id))
        })?;
        let now: DateTimeWithTimeZone = Utc::now().into();

        let txn = self
            .db
            .begin()
            .await
            .map_err(RepositoryError::database_error)?;

        let result = Poll::update_many()
            .col_expr(column, Expr::col(column).add(1))
            .col_expr(poll::Column::UpdatedAt, Expr::value(now))
            .filter(poll::Column::Id.eq(id))
            .exec(&txn)
            .await
            .map_err(RepositoryError::database_error)?;

        if result.rows_affected == 0 {
            txn.rollback()
                .await
                .map_err(RepositoryError::database_error)?;
            return Err(RepositoryError::NotFound(format!("poll '{}'", id)));
        }

        let updated = Poll::find_by_id(id.to_string())
            .one(&txn)
            .await
            .map_err(RepositoryError::database_error)?
            .ok_or_else(|| RepositoryError::NotFound(format!("poll '{}'", id)))?;

        txn.commit()
            .await
            .map_err(RepositoryError::database_error)?;

        updated
            .votes_for(scenario)
            .ok_or_else(|| RepositoryError::NotFound(format!("scenario {}", scenario)))
    }

    /// Current counters for scenarios 1..=5
    pub async fn tally(&self, id: &str) -> Result<[i64; 5], RepositoryError> {
        self.find_by_id(id)
            .await?
            .map(|poll| poll.counts())
            .ok_or_else(|| RepositoryError::NotFound(format!("poll '{}'", id)))
    }
}
