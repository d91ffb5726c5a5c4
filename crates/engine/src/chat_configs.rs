//! Per-chat settings.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*, sea_query::OnConflict};

use crate::ResultEngine;

/// Name shown for balances in chats that never configured one.
pub const DEFAULT_CURRENCY_NAME: &str = "Points";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "chat_configs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub chat_id: i64,
    pub currency_name: String,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub async fn find_currency_name<C: ConnectionTrait>(
    db: &C,
    chat_id: i64,
) -> ResultEngine<Option<String>> {
    Ok(Entity::find_by_id(chat_id)
        .one(db)
        .await?
        .map(|model| model.currency_name))
}

/// Inserts or replaces the currency name of `chat_id`.
pub async fn upsert_currency_name<C: ConnectionTrait>(
    db: &C,
    chat_id: i64,
    currency_name: &str,
    now: DateTime<Utc>,
) -> ResultEngine<()> {
    let model = ActiveModel {
        chat_id: ActiveValue::Set(chat_id),
        currency_name: ActiveValue::Set(currency_name.to_string()),
        updated_at: ActiveValue::Set(now),
    };
    Entity::insert(model)
        .on_conflict(
            OnConflict::column(Column::ChatId)
                .update_columns([Column::CurrencyName, Column::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}
