//! Poll entity model
//!
//! This module contains the SeaORM entity model for the polls table. A poll is the resource
//! that scenario votes attach to; it keeps one denormalized counter per scenario.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Poll entity with per-scenario vote counters
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "polls")]
pub struct Model {
    /// Resource identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Question shown above the scenarios
    pub title: String,

    #[sea_orm(column_name = "scenario_1_votes")]
    pub scenario_1_votes: i64,

    #[sea_orm(column_name = "scenario_2_votes")]
    pub scenario_2_votes: i64,

    #[sea_orm(column_name = "scenario_3_votes")]
    pub scenario_3_votes: i64,

    #[sea_orm(column_name = "scenario_4_votes")]
    pub scenario_4_votes: i64,

    #[sea_orm(column_name = "scenario_5_votes")]
    pub scenario_5_votes: i64,

    /// Timestamp when the poll was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when a counter last changed
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::poll_vote::Entity")]
    Votes,
}

impl Related<super::poll_vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Votes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Counter value for `scenario` (1..=5); `None` for any other number.
    pub fn votes_for(&self, scenario: u8) -> Option<i64> {
        match scenario {
            1 => Some(self.scenario_1_votes),
            2 => Some(self.scenario_2_votes),
            3 => Some(self.scenario_3_votes),
            4 => Some(self.scenario_4_votes),
            5 => Some(self.scenario_5_votes),
            _ => None,
        }
    }

    /// All five counters, scenario 1 first.
    pub fn counts(&self) -> [i64; 5] {
        [
            self.scenario_1_votes,
            self.scenario_2_votes,
            self.scenario_3_votes,
            self.scenario_4_votes,
            self.scenario_5_votes,
        ]
    }
}

impl Column {
    /// Counter column for `scenario` (1..=5).
    pub fn scenario_votes(scenario: u8) -> Option<Self> {
        match scenario {
            1 => Some(Column::Scenario1Votes),
            2 => Some(Column::Scenario2Votes),
            3 => Some(Column::Scenario3Votes),
            4 => Some(Column::Scenario4Votes),
            5 => Some(Column::Scenario5Votes),
            _ => None,
        }
    }
}
