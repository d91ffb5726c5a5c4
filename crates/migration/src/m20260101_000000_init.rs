//! Initial schema migration.
//!
//! Creates every table the engine owns except the idempotency ledger:
//!
//! - `users`: chat members and their balance
//! - `discount_tiers`: percentage discounts referenced by shop items
//! - `shop_items`: per-chat (or global, `chat_id = 0`) catalog entries
//! - `purchases`: immutable receipts
//! - `quests`: recurring or one-off work with a scoring mode
//! - `quest_completions`: one row per awarded completion
//!
//! Money and points columns are stored as canonical decimal text.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Users {
    Table,
    Id,
    ChatId,
    DisplayName,
    Timezone,
    Balance,
    CreatedAt,
}

#[derive(Iden)]
enum DiscountTiers {
    Table,
    Id,
    Name,
    DiscountPercent,
    MinPurchases,
    CreatedAt,
}

#[derive(Iden)]
enum ShopItems {
    Table,
    Id,
    ChatId,
    Code,
    Name,
    Price,
    IsActive,
    Stock,
    DiscountTierId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Purchases {
    Table,
    Id,
    UserId,
    ItemId,
    ItemName,
    ItemPrice,
    Quantity,
    TotalCost,
    DiscountTierId,
    Status,
    PurchasedAt,
}

#[derive(Iden)]
enum Quests {
    Table,
    Id,
    ChatId,
    Title,
    Category,
    Mode,
    PointsAward,
    RatePerMinute,
    MinMinutes,
    MaxMinutes,
    DailyPointsCap,
    CooldownSec,
    StreakEnabled,
    Status,
    LastCompletedAt,
    StreakCount,
    Timezone,
    Revision,
    CreatedAt,
}

#[derive(Iden)]
enum QuestCompletions {
    Table,
    Id,
    QuestId,
    UserId,
    SubmittedAt,
    CompletionRatio,
    Minutes,
    AwardedPoints,
    IdempotencyKey,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Users
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::ChatId).big_integer().not_null())
                    .col(ColumnDef::new(Users::DisplayName).string().not_null())
                    .col(
                        ColumnDef::new(Users::Timezone)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Users::Balance)
                            .string()
                            .not_null()
                            .default("0"),
                    )
                    .col(ColumnDef::new(Users::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Discount tiers
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(DiscountTiers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DiscountTiers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DiscountTiers::Name).string().not_null())
                    .col(
                        ColumnDef::new(DiscountTiers::DiscountPercent)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscountTiers::MinPurchases)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DiscountTiers::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Shop items
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(ShopItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ShopItems::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ShopItems::ChatId).big_integer().not_null())
                    .col(ColumnDef::new(ShopItems::Code).string().not_null())
                    .col(ColumnDef::new(ShopItems::Name).string().not_null())
                    .col(ColumnDef::new(ShopItems::Price).string().not_null())
                    .col(ColumnDef::new(ShopItems::IsActive).boolean().not_null())
                    .col(ColumnDef::new(ShopItems::Stock).big_integer())
                    .col(ColumnDef::new(ShopItems::DiscountTierId).big_integer())
                    .col(ColumnDef::new(ShopItems::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(ShopItems::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-shop_items-discount_tier_id")
                            .from(ShopItems::Table, ShopItems::DiscountTierId)
                            .to(DiscountTiers::Table, DiscountTiers::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-shop_items-chat_id-code-unique")
                    .table(ShopItems::Table)
                    .col(ShopItems::ChatId)
                    .col(ShopItems::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Purchases
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Purchases::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Purchases::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Purchases::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Purchases::ItemId).big_integer().not_null())
                    .col(ColumnDef::new(Purchases::ItemName).string().not_null())
                    .col(ColumnDef::new(Purchases::ItemPrice).string().not_null())
                    .col(ColumnDef::new(Purchases::Quantity).big_integer().not_null())
                    .col(ColumnDef::new(Purchases::TotalCost).string().not_null())
                    .col(ColumnDef::new(Purchases::DiscountTierId).big_integer())
                    .col(ColumnDef::new(Purchases::Status).string().not_null())
                    .col(
                        ColumnDef::new(Purchases::PurchasedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-purchases-user_id")
                            .from(Purchases::Table, Purchases::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-purchases-item_id")
                            .from(Purchases::Table, Purchases::ItemId)
                            .to(ShopItems::Table, ShopItems::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-purchases-user_id")
                    .table(Purchases::Table)
                    .col(Purchases::UserId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Quests
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Quests::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Quests::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Quests::ChatId).big_integer().not_null())
                    .col(ColumnDef::new(Quests::Title).string().not_null())
                    .col(ColumnDef::new(Quests::Category).string().not_null())
                    .col(ColumnDef::new(Quests::Mode).string().not_null())
                    .col(ColumnDef::new(Quests::PointsAward).string().not_null())
                    .col(ColumnDef::new(Quests::RatePerMinute).string())
                    .col(ColumnDef::new(Quests::MinMinutes).big_integer())
                    .col(ColumnDef::new(Quests::MaxMinutes).big_integer())
                    .col(ColumnDef::new(Quests::DailyPointsCap).string())
                    .col(
                        ColumnDef::new(Quests::CooldownSec)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Quests::StreakEnabled).boolean().not_null())
                    .col(ColumnDef::new(Quests::Status).string().not_null())
                    .col(ColumnDef::new(Quests::LastCompletedAt).string())
                    .col(
                        ColumnDef::new(Quests::StreakCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Quests::Timezone)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Quests::Revision)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Quests::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 6. Quest completions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(QuestCompletions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(QuestCompletions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(QuestCompletions::QuestId).string().not_null())
                    .col(
                        ColumnDef::new(QuestCompletions::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(QuestCompletions::SubmittedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(QuestCompletions::CompletionRatio).string())
                    .col(ColumnDef::new(QuestCompletions::Minutes).big_integer())
                    .col(
                        ColumnDef::new(QuestCompletions::AwardedPoints)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(QuestCompletions::IdempotencyKey)
                            .string()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-quest_completions-quest_id")
                            .from(QuestCompletions::Table, QuestCompletions::QuestId)
                            .to(Quests::Table, Quests::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-quest_completions-quest_id-user_id-submitted_at")
                    .table(QuestCompletions::Table)
                    .col(QuestCompletions::QuestId)
                    .col(QuestCompletions::UserId)
                    .col(QuestCompletions::SubmittedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(QuestCompletions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Quests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Purchases::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ShopItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DiscountTiers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}
