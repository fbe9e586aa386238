use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{text_from_json, utc};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "keyword")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub data_source: String,
    pub origin_id: Option<String>,
    pub aggregate: bool,
    pub last_modified_time: DateTimeWithTimeZone,
    /// Bare name column, mirrored from the default language.
    pub name: Option<String>,
    pub text: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::models::Keyword {
    fn from(model: Model) -> Self {
        let mut text = text_from_json(model.text);
        text.set("name", model.name);

        Self {
            id: model.id,
            data_source: model.data_source,
            origin_id: model.origin_id,
            aggregate: model.aggregate,
            last_modified_time: utc(model.last_modified_time),
            text,
        }
    }
}
