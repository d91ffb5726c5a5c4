use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum IdempotencyKeys {
    Table,
    Key,
    Operation,
    UserId,
    Status,
    Result,
    ClaimId,
    CreatedAt,
    CompletedAt,
    ExpiresAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // The primary key is the uniqueness constraint the engine relies on to
        // decide which caller owns a key.
        manager
            .create_table(
                Table::create()
                    .table(IdempotencyKeys::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IdempotencyKeys::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IdempotencyKeys::Operation).string().not_null())
                    .col(
                        ColumnDef::new(IdempotencyKeys::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(IdempotencyKeys::Status).string().not_null())
                    .col(ColumnDef::new(IdempotencyKeys::Result).text())
                    .col(ColumnDef::new(IdempotencyKeys::ClaimId).string().not_null())
                    .col(
                        ColumnDef::new(IdempotencyKeys::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(IdempotencyKeys::CompletedAt).timestamp())
                    .col(
                        ColumnDef::new(IdempotencyKeys::ExpiresAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-idempotency_keys-expires_at")
                    .table(IdempotencyKeys::Table)
                    .col(IdempotencyKeys::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx-idempotency_keys-expires_at")
                    .table(IdempotencyKeys::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(IdempotencyKeys::Table).to_owned())
            .await?;

        Ok(())
    }
}
