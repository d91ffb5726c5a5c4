//! Purchase receipts. Rows are written once and never updated.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, PaginatorTrait, QueryFilter, QueryOrder, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{Decimal, EngineError, ResultEngine};

pub const STATUS_COMPLETED: &str = "completed";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: i64,
    pub user_id: i64,
    pub item_id: i64,
    /// Item name at purchase time.
    pub item_name: String,
    /// Unit price at purchase time, before any discount.
    pub item_price: Decimal,
    pub quantity: i64,
    pub total_cost: Decimal,
    pub discount_tier_id: Option<i64>,
    pub status: String,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "purchases")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub item_id: i64,
    pub item_name: String,
    pub item_price: String,
    pub quantity: i64,
    pub total_cost: String,
    pub discount_tier_id: Option<i64>,
    pub status: String,
    pub purchased_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Users,
    #[sea_orm(
        belongs_to = "super::shop_items::Entity",
        from = "Column::ItemId",
        to = "super::shop_items::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    ShopItems,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::shop_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShopItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Purchase {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            item_id: model.item_id,
            item_name: model.item_name,
            item_price: Decimal::parse(&model.item_price)?,
            quantity: model.quantity,
            total_cost: Decimal::parse(&model.total_cost)?,
            discount_tier_id: model.discount_tier_id,
            status: model.status,
            purchased_at: model.purchased_at,
        })
    }
}

/// Receipt fields known before the row is inserted.
#[derive(Clone, Debug)]
pub struct NewPurchase {
    pub user_id: i64,
    pub item_id: i64,
    pub item_name: String,
    pub item_price: Decimal,
    pub quantity: i64,
    pub total_cost: Decimal,
    pub discount_tier_id: Option<i64>,
    pub purchased_at: DateTime<Utc>,
}

pub async fn create<C: ConnectionTrait>(db: &C, purchase: NewPurchase) -> ResultEngine<Purchase> {
    let model = ActiveModel {
        id: ActiveValue::NotSet,
        user_id: ActiveValue::Set(purchase.user_id),
        item_id: ActiveValue::Set(purchase.item_id),
        item_name: ActiveValue::Set(purchase.item_name),
        item_price: ActiveValue::Set(purchase.item_price.to_string()),
        quantity: ActiveValue::Set(purchase.quantity),
        total_cost: ActiveValue::Set(purchase.total_cost.to_string()),
        discount_tier_id: ActiveValue::Set(purchase.discount_tier_id),
        status: ActiveValue::Set(STATUS_COMPLETED.to_string()),
        purchased_at: ActiveValue::Set(purchase.purchased_at),
    }
    .insert(db)
    .await?;
    Purchase::try_from(model)
}

pub async fn count_for_user<C: ConnectionTrait>(db: &C, user_id: i64) -> ResultEngine<u64> {
    Ok(Entity::find()
        .filter(Column::UserId.eq(user_id))
        .count(db)
        .await?)
}

/// Receipts of `user_id`, oldest first.
pub async fn list_for_user<C: ConnectionTrait>(db: &C, user_id: i64) -> ResultEngine<Vec<Purchase>> {
    Entity::find()
        .filter(Column::UserId.eq(user_id))
        .order_by_asc(Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(Purchase::try_from)
        .collect()
}
