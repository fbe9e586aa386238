use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::text_from_json;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "language")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub text: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::models::Language {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            text: text_from_json(model.text),
        }
    }
}
