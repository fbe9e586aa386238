//! Sea-ORM entities for the events directory tables.
//!
//! Translated columns live in a `text` JSONB object keyed by storage column
//! (`name`, `name_fi`, ...). Keywords also keep the bare `name` as a real
//! column so listings can filter on it.

pub mod event;
pub mod event_keyword;
pub mod event_link;
pub mod keyword;
pub mod language;
pub mod offer;
pub mod organization;
pub mod organization_member;
pub mod place;

use sea_orm::entity::prelude::{DateTimeWithTimeZone, Json};
use serde_json::Value;

use crate::models::TextColumns;

pub(crate) fn text_to_json(text: &TextColumns) -> Json {
    Value::Object(
        text.iter()
            .map(|(col, value)| (col.to_string(), Value::String(value.to_string())))
            .collect(),
    )
}

/// Read a `text` object. Non-string entries are skipped one by one so the
/// remaining columns survive.
pub(crate) fn text_from_json(json: Json) -> TextColumns {
    let Value::Object(entries) = json else {
        if !json.is_null() {
            tracing::warn!(value = %json, "Ignoring non-object text column");
        }
        return TextColumns::default();
    };

    let mut text = TextColumns::new();
    for (column, value) in entries {
        match value {
            Value::String(value) => text.set(&column, Some(value)),
            Value::Null => {}
            other => tracing::warn!(column = %column, value = %other, "Ignoring non-string text entry"),
        }
    }
    text
}

pub(crate) fn utc(at: DateTimeWithTimeZone) -> chrono::DateTime<chrono::Utc> {
    at.into()
}
