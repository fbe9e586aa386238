use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{text_from_json, utc};
use crate::models::Position;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "place")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub data_source: String,
    pub publisher: Option<String>,
    pub origin_id: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub email: Option<String>,
    pub postal_code: Option<String>,
    pub last_modified_time: DateTimeWithTimeZone,
    pub text: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::models::Place {
    fn from(model: Model) -> Self {
        let position = match (model.longitude, model.latitude) {
            (Some(longitude), Some(latitude)) => Some(Position { longitude, latitude }),
            _ => None,
        };

        Self {
            id: model.id,
            data_source: model.data_source,
            publisher: model.publisher,
            origin_id: model.origin_id,
            position,
            email: model.email,
            postal_code: model.postal_code,
            last_modified_time: utc(model.last_modified_time),
            text: text_from_json(model.text),
        }
    }
}
