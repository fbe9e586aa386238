use crate::models::EventStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "event")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub data_source: String,
    pub publisher: String,
    pub origin_id: Option<String>,
    pub created_time: DateTimeWithTimeZone,
    pub last_modified_time: DateTimeWithTimeZone,
    pub date_published: Option<DateTimeWithTimeZone>,
    pub start_time: Option<DateTimeWithTimeZone>,
    pub end_time: Option<DateTimeWithTimeZone>,
    pub has_start_time: bool,
    pub has_end_time: bool,
    pub event_status: EventStatus,
    pub is_recurring_super: bool,
    pub super_event_id: Option<String>,
    pub location_id: Option<String>,
    pub custom_data: Option<Json>,
    pub text: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
