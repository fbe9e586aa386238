use sea_orm::entity::prelude::*;

use super::text_from_json;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "offer")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub event_id: String,
    pub is_free: bool,
    pub text: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::models::Offer {
    fn from(model: Model) -> Self {
        Self {
            is_free: model.is_free,
            text: text_from_json(model.text),
        }
    }
}
