//! Migration to create the poll_votes table.
//!
//! The table is an append-only log of votes. The unique index on
//! (poll_id, voter_hash, scenario_number) is what makes a second vote from the
//! same voter for the same scenario fail at insert time.

use sea_orm_migration::prelude::*;

use crate::m2025_11_10_090000_create_polls::Polls;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PollVotes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PollVotes::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(PollVotes::PollId).text().not_null())
                    .col(ColumnDef::new(PollVotes::VoterHash).text().not_null())
                    .col(
                        ColumnDef::new(PollVotes::ScenarioNumber)
                            .small_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PollVotes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_poll_votes_poll_id")
                            .from(PollVotes::Table, PollVotes::PollId)
                            .to(Polls::Table, Polls::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_poll_votes_unique_voter_scenario")
                    .table(PollVotes::Table)
                    .col(PollVotes::PollId)
                    .col(PollVotes::VoterHash)
                    .col(PollVotes::ScenarioNumber)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_poll_votes_unique_voter_scenario")
                    .table(PollVotes::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(PollVotes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PollVotes {
    Table,
    Id,
    PollId,
    VoterHash,
    ScenarioNumber,
    CreatedAt,
}
