//! Migration to create the polls table.
//!
//! A poll is the parent resource that scenario votes attach to. It carries one
//! denormalized counter column per scenario number (1 through 5).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Polls::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Polls::Id).text().not_null().primary_key())
                    .col(ColumnDef::new(Polls::Title).text().not_null())
                    .col(
                        ColumnDef::new(Polls::Scenario1Votes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Polls::Scenario2Votes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Polls::Scenario3Votes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Polls::Scenario4Votes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Polls::Scenario5Votes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Polls::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Polls::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Polls::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Polls {
    Table,
    Id,
    Title,
    #[sea_orm(iden = "scenario_1_votes")]
    Scenario1Votes,
    #[sea_orm(iden = "scenario_2_votes")]
    Scenario2Votes,
    #[sea_orm(iden = "scenario_3_votes")]
    Scenario3Votes,
    #[sea_orm(iden = "scenario_4_votes")]
    Scenario4Votes,
    #[sea_orm(iden = "scenario_5_votes")]
    Scenario5Votes,
    CreatedAt,
    UpdatedAt,
}
