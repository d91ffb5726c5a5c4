//! Discount tiers applied to catalog prices.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{Decimal, EngineError, ResultEngine};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountTier {
    pub id: i64,
    pub name: String,
    /// Percentage in `[0, 100]`.
    pub discount_percent: Decimal,
    /// Number of earlier purchases a user needs before the tier applies.
    pub min_purchases: i64,
    pub created_at: DateTime<Utc>,
}

impl DiscountTier {
    /// Returns `total` reduced by the tier percentage.
    pub fn apply(&self, total: Decimal) -> ResultEngine<Decimal> {
        let hundred = Decimal::from(100);
        let kept = hundred.checked_sub(self.discount_percent)?;
        total.checked_mul(kept)?.checked_div(hundred)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "discount_tiers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub discount_percent: String,
    pub min_purchases: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for DiscountTier {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            name: model.name,
            discount_percent: Decimal::parse(&model.discount_percent)?,
            min_purchases: model.min_purchases,
            created_at: model.created_at,
        })
    }
}

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i64) -> ResultEngine<Option<DiscountTier>> {
    Entity::find_by_id(id)
        .one(db)
        .await?
        .map(DiscountTier::try_from)
        .transpose()
}

pub async fn create<C: ConnectionTrait>(
    db: &C,
    name: &str,
    discount_percent: Decimal,
    min_purchases: i64,
    created_at: DateTime<Utc>,
) -> ResultEngine<DiscountTier> {
    let model = ActiveModel {
        id: ActiveValue::NotSet,
        name: ActiveValue::Set(name.to_string()),
        discount_percent: ActiveValue::Set(discount_percent.to_string()),
        min_purchases: ActiveValue::Set(min_purchases),
        created_at: ActiveValue::Set(created_at),
    }
    .insert(db)
    .await?;
    DiscountTier::try_from(model)
}
