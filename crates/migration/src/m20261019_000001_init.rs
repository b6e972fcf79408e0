//! Initial schema.
//!
//! - `users`: credentials, running wallet balance, ride count, reward tier
//! - `rides`: booking lifecycle and pickup verification
//! - `transactions`: append-only wallet ledger
//! - `notifications`: durable copies of every pushed event

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Users {
    Table,
    Id,
    Username,
    PasswordHash,
    WalletBalanceMinor,
    RideCount,
    RewardTier,
    CreatedAt,
}

#[derive(Iden)]
enum Rides {
    Table,
    Id,
    UserId,
    Origin,
    Destination,
    FareMinor,
    Status,
    VerificationCode,
    PickupVerifiedAt,
    Rating,
    TipMinor,
    CreatedAt,
    CompletedAt,
    CancelledAt,
}

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    UserId,
    Kind,
    AmountMinor,
    Status,
    Reference,
    RideId,
    Description,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Notifications {
    Table,
    Id,
    UserId,
    Title,
    Message,
    IsRead,
    CreatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Users
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).string().not_null().primary_key())
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                    .col(
                        ColumnDef::new(Users::WalletBalanceMinor)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(Users::WalletBalanceMinor).gte(0)),
                    )
                    .col(
                        ColumnDef::new(Users::RideCount)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(Users::RideCount).gte(0)),
                    )
                    .col(
                        ColumnDef::new(Users::RewardTier)
                            .string()
                            .not_null()
                            .default("bronze"),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Rides
        manager
            .create_table(
                Table::create()
                    .table(Rides::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Rides::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Rides::UserId).string().not_null())
                    .col(ColumnDef::new(Rides::Origin).string().not_null())
                    .col(ColumnDef::new(Rides::Destination).string().not_null())
                    .col(
                        ColumnDef::new(Rides::FareMinor)
                            .big_integer()
                            .not_null()
                            .check(Expr::col(Rides::FareMinor).gt(0)),
                    )
                    .col(ColumnDef::new(Rides::Status).string().not_null())
                    .col(ColumnDef::new(Rides::VerificationCode).string().not_null())
                    .col(ColumnDef::new(Rides::PickupVerifiedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Rides::Rating).integer())
                    .col(ColumnDef::new(Rides::TipMinor).big_integer())
                    .col(
                        ColumnDef::new(Rides::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Rides::CompletedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Rides::CancelledAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-rides-user_id")
                            .from(Rides::Table, Rides::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-rides-user_id-created_at")
                    .table(Rides::Table)
                    .col(Rides::UserId)
                    .col(Rides::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Transactions
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::UserId).string().not_null())
                    .col(ColumnDef::new(Transactions::Kind).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::AmountMinor)
                            .big_integer()
                            .not_null()
                            .check(Expr::col(Transactions::AmountMinor).gt(0)),
                    )
                    .col(ColumnDef::new(Transactions::Status).string().not_null())
                    .col(ColumnDef::new(Transactions::Reference).string())
                    .col(ColumnDef::new(Transactions::RideId).string())
                    .col(ColumnDef::new(Transactions::Description).string())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transactions-user_id")
                            .from(Transactions::Table, Transactions::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transactions-ride_id")
                            .from(Transactions::Table, Transactions::RideId)
                            .to(Rides::Table, Rides::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-reference")
                    .table(Transactions::Table)
                    .col(Transactions::Reference)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-user_id-created_at")
                    .table(Transactions::Table)
                    .col(Transactions::UserId)
                    .col(Transactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Notifications
        manager
            .create_table(
                Table::create()
                    .table(Notifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Notifications::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Notifications::UserId).string().not_null())
                    .col(ColumnDef::new(Notifications::Title).string().not_null())
                    .col(ColumnDef::new(Notifications::Message).string().not_null())
                    .col(
                        ColumnDef::new(Notifications::IsRead)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Notifications::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-notifications-user_id")
                            .from(Notifications::Table, Notifications::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-notifications-user_id-created_at")
                    .table(Notifications::Table)
                    .col(Notifications::UserId)
                    .col(Notifications::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Reverse order of creation (FK dependencies)
        manager
            .drop_table(Table::drop().table(Notifications::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Rides::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}
