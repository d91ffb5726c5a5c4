//! Catalog items.
//!
//! An item belongs to a chat, or to every chat when `chat_id` is `0`. Stock
//! is optional: `None` means unlimited.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, Condition, QueryFilter, QueryOrder, entity::prelude::*, sea_query::Expr};
use serde::{Deserialize, Serialize};

use crate::{Decimal, EngineError, NewShopItem, ResultEngine, util::is_unique_violation};

/// `chat_id` of items visible from every chat.
pub const GLOBAL_CHAT_ID: i64 = 0;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopItem {
    pub id: i64,
    pub chat_id: i64,
    pub code: String,
    pub name: String,
    pub price: Decimal,
    pub is_active: bool,
    pub stock: Option<i64>,
    pub discount_tier_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShopItem {
    /// Returns `true` if `quantity` units can be taken from stock.
    #[must_use]
    pub fn has_stock_for(&self, quantity: i64) -> bool {
        self.stock.is_none_or(|stock| stock >= quantity)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "shop_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub chat_id: i64,
    pub code: String,
    pub name: String,
    pub price: String,
    pub is_active: bool,
    pub stock: Option<i64>,
    pub discount_tier_id: Option<i64>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::discount_tiers::Entity",
        from = "Column::DiscountTierId",
        to = "super::discount_tiers::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    DiscountTiers,
}

impl Related<super::discount_tiers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiscountTiers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&ShopItem> for ActiveModel {
    fn from(item: &ShopItem) -> Self {
        Self {
            id: ActiveValue::Set(item.id),
            chat_id: ActiveValue::Set(item.chat_id),
            code: ActiveValue::Set(item.code.clone()),
            name: ActiveValue::Set(item.name.clone()),
            price: ActiveValue::Set(item.price.to_string()),
            is_active: ActiveValue::Set(item.is_active),
            stock: ActiveValue::Set(item.stock),
            discount_tier_id: ActiveValue::Set(item.discount_tier_id),
            created_at: ActiveValue::Set(item.created_at),
            updated_at: ActiveValue::Set(item.updated_at),
        }
    }
}

impl TryFrom<Model> for ShopItem {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            chat_id: model.chat_id,
            code: model.code,
            name: model.name,
            price: Decimal::parse(&model.price)?,
            is_active: model.is_active,
            stock: model.stock,
            discount_tier_id: model.discount_tier_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

pub async fn find_by_code<C: ConnectionTrait>(
    db: &C,
    chat_id: i64,
    code: &str,
) -> ResultEngine<Option<ShopItem>> {
    Entity::find()
        .filter(Column::ChatId.eq(chat_id))
        .filter(Column::Code.eq(code))
        .one(db)
        .await?
        .map(ShopItem::try_from)
        .transpose()
}

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i64) -> ResultEngine<Option<ShopItem>> {
    Entity::find_by_id(id)
        .one(db)
        .await?
        .map(ShopItem::try_from)
        .transpose()
}

/// Inserts a new item. A duplicated `(chat_id, code)` pair fails with
/// [`EngineError::InvalidRequest`].
pub async fn create<C: ConnectionTrait>(
    db: &C,
    item: &NewShopItem,
    now: DateTime<Utc>,
) -> ResultEngine<ShopItem> {
    let active = ActiveModel {
        id: ActiveValue::NotSet,
        chat_id: ActiveValue::Set(item.chat_id),
        code: ActiveValue::Set(item.code.clone()),
        name: ActiveValue::Set(item.name.clone()),
        price: ActiveValue::Set(item.price.to_string()),
        is_active: ActiveValue::Set(item.is_active),
        stock: ActiveValue::Set(item.stock),
        discount_tier_id: ActiveValue::Set(item.discount_tier_id),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
    };
    match active.insert(db).await {
        Ok(model) => ShopItem::try_from(model),
        Err(err) if is_unique_violation(&err) => Err(EngineError::InvalidRequest(format!(
            "item \"{}\" already exists in chat {}",
            item.code, item.chat_id
        ))),
        Err(err) => Err(err.into()),
    }
}

pub async fn update<C: ConnectionTrait>(db: &C, item: &ShopItem) -> ResultEngine<()> {
    ActiveModel::from(item).update(db).await?;
    Ok(())
}

/// Takes `quantity` units from a limited stock.
///
/// Returns `false` when the item has unlimited stock or fewer than
/// `quantity` units left; nothing is written in that case.
pub async fn decrement_stock<C: ConnectionTrait>(
    db: &C,
    id: i64,
    quantity: i64,
) -> ResultEngine<bool> {
    let res = Entity::update_many()
        .col_expr(Column::Stock, Expr::col(Column::Stock).sub(quantity))
        .filter(Column::Id.eq(id))
        .filter(Column::Stock.is_not_null())
        .filter(Column::Stock.gte(quantity))
        .exec(db)
        .await?;
    Ok(res.rows_affected == 1)
}

/// Active items visible from `chat_id`: the chat's own items first, then
/// the global ones, each group ordered by code.
pub async fn list_for_chat<C: ConnectionTrait>(db: &C, chat_id: i64) -> ResultEngine<Vec<ShopItem>> {
    let models = Entity::find()
        .filter(Column::IsActive.eq(true))
        .filter(
            Condition::any()
                .add(Column::ChatId.eq(chat_id))
                .add(Column::ChatId.eq(GLOBAL_CHAT_ID)),
        )
        .order_by_asc(Column::Code)
        .all(db)
        .await?;

    let mut items = models
        .into_iter()
        .map(ShopItem::try_from)
        .collect::<ResultEngine<Vec<_>>>()?;
    // Stable sort keeps the code order inside each group.
    items.sort_by_key(|item| item.chat_id != chat_id);
    Ok(items)
}
