use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use strum::{Display, EnumString};
use utoipa::{IntoParams, ToSchema};

use crate::jsonld::JsonLdResource;
use crate::translation::{LanguageSet, SUPPORTED_LANGUAGES, column};

/// Storage columns of translated fields: the bare mirror column (`name`)
/// and one column per language (`name_fi`). Missing keys are null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextColumns(BTreeMap<String, String>);

impl TextColumns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: &str) -> Self {
        self.set(column, Some(value.to_string()));
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).map(String::as_str)
    }

    /// `None` clears the column.
    pub fn set(&mut self, column: &str, value: Option<String>) {
        match value {
            Some(value) => {
                self.0.insert(column.to_string(), value);
            }
            None => {
                self.0.remove(column);
            }
        }
    }

    /// Text of `field` in `lang`; the default language falls back to the
    /// bare column.
    pub fn translated(&self, field: &str, lang: &str, langs: &LanguageSet) -> Option<&str> {
        self.get(&column(field, lang)).or_else(|| {
            (lang == langs.default_language())
                .then(|| self.get(field))
                .flatten()
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Every stored value of `field`, over all supported languages.
    pub fn all_values<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        std::iter::once(field.to_string())
            .chain(SUPPORTED_LANGUAGES.iter().map(move |lang| column(field, lang)))
            .filter_map(move |col| self.get(&col))
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Default,
    DeriveActiveEnum,
    EnumIter,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "event_status")]
pub enum EventStatus {
    #[default]
    #[sea_orm(string_value = "EventScheduled")]
    EventScheduled,
    #[sea_orm(string_value = "EventCancelled")]
    EventCancelled,
    #[sea_orm(string_value = "EventPostponed")]
    EventPostponed,
    #[sea_orm(string_value = "EventRescheduled")]
    EventRescheduled,
}

/// Ticket or pricing information attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Offer {
    pub is_free: bool,
    /// `price`, `info_url` and `description` columns.
    #[serde(flatten)]
    pub text: TextColumns,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventLink {
    pub name: String,
    pub language: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: String,
    pub data_source: String,
    pub publisher: String,
    pub origin_id: Option<String>,
    pub created_time: DateTime<Utc>,
    pub last_modified_time: DateTime<Utc>,
    pub date_published: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub has_start_time: bool,
    pub has_end_time: bool,
    pub event_status: EventStatus,
    pub is_recurring_super: bool,
    pub super_event: Option<String>,
    pub location: Option<String>,
    pub keywords: Vec<String>,
    pub offers: Vec<Offer>,
    pub external_links: Vec<EventLink>,
    /// Ids of events whose `super_event` is this one.
    pub sub_events: Vec<String>,
    pub custom_data: Option<Value>,
    #[serde(flatten)]
    pub text: TextColumns,
}

impl Event {
    /// Length of the event, when both ends are known.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.end_time? - self.start_time?)
    }

    /// Whole days between start and end.
    pub fn days_left(&self) -> Option<i64> {
        self.duration().map(|d| d.num_days())
    }
}

impl JsonLdResource for Event {
    const TYPE: &'static str = "Event";
    const VIEW_NAME: &'static str = "event";
}

/// WGS84 coordinates, rendered as a GeoJSON point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub longitude: f64,
    pub latitude: f64,
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct GeoPoint {
            #[serde(rename = "type")]
            kind: &'static str,
            coordinates: [f64; 2],
        }

        GeoPoint {
            kind: "Point",
            coordinates: [self.longitude, self.latitude],
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    pub id: String,
    pub data_source: String,
    pub publisher: Option<String>,
    pub origin_id: Option<String>,
    pub position: Option<Position>,
    pub email: Option<String>,
    pub postal_code: Option<String>,
    pub last_modified_time: DateTime<Utc>,
    #[serde(flatten)]
    pub text: TextColumns,
}

impl JsonLdResource for Place {
    const TYPE: &'static str = "Place";
    const VIEW_NAME: &'static str = "place";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Keyword {
    pub id: String,
    pub data_source: String,
    pub origin_id: Option<String>,
    pub aggregate: bool,
    pub last_modified_time: DateTime<Utc>,
    #[serde(flatten)]
    pub text: TextColumns,
}

impl JsonLdResource for Keyword {
    const TYPE: &'static str = "Keyword";
    const VIEW_NAME: &'static str = "keyword";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Language {
    pub id: String,
    #[serde(flatten)]
    pub text: TextColumns,
}

impl JsonLdResource for Language {
    const TYPE: &'static str = "Language";
    const VIEW_NAME: &'static str = "language";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub data_source: String,
}

/// Event time as supplied by a client. A date without a time of day sets
/// `has_time` to false.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventTime {
    pub at: DateTime<Utc>,
    pub has_time: bool,
}

/// Writable event fields parsed from a request body.
///
/// `Option<Option<_>>` fields distinguish "absent" (outer `None`) from an
/// explicit `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFields {
    pub start_time: Option<Option<EventTime>>,
    pub end_time: Option<Option<EventTime>>,
    pub location: Option<Option<String>>,
    pub keywords: Vec<String>,
    pub offers: Option<Vec<Offer>>,
    pub external_links: Option<Vec<EventLink>>,
    pub super_event: Option<Option<String>>,
    pub event_status: Option<EventStatus>,
    pub custom_data: Option<Value>,
    /// Translated columns present in the payload; `None` writes null.
    pub text: BTreeMap<String, Option<String>>,
}

/// A fully resolved event ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub id: String,
    pub data_source: String,
    pub publisher: String,
    pub created_time: DateTime<Utc>,
    pub fields: EventFields,
}

impl NewEvent {
    pub fn into_event(self) -> Event {
        let NewEvent {
            id,
            data_source,
            publisher,
            created_time,
            fields,
        } = self;

        let start = fields.start_time.flatten();
        let end = fields.end_time.flatten();
        let mut text = TextColumns::new();
        for (col, value) in fields.text {
            text.set(&col, value);
        }

        Event {
            id,
            data_source,
            publisher,
            origin_id: None,
            created_time,
            last_modified_time: created_time,
            date_published: None,
            start_time: start.map(|t| t.at),
            end_time: end.map(|t| t.at),
            has_start_time: start.map(|t| t.has_time).unwrap_or(false),
            has_end_time: end.map(|t| t.has_time).unwrap_or(false),
            event_status: fields.event_status.unwrap_or_default(),
            is_recurring_super: false,
            super_event: fields.super_event.flatten(),
            location: fields.location.flatten(),
            keywords: fields.keywords,
            offers: fields.offers.unwrap_or_default(),
            external_links: fields.external_links.unwrap_or_default(),
            sub_events: Vec::new(),
            custom_data: fields.custom_data,
            text,
        }
    }
}

impl Event {
    /// Apply an update in place.
    ///
    /// Times, location and translated columns change only when present.
    /// Offers and links are replaced when present, keywords always.
    pub fn apply_update(&mut self, fields: EventFields, modified: DateTime<Utc>) {
        if let Some(start) = fields.start_time {
            self.start_time = start.map(|t| t.at);
            self.has_start_time = start.map(|t| t.has_time).unwrap_or(false);
        }
        if let Some(end) = fields.end_time {
            self.end_time = end.map(|t| t.at);
        }
        if self.end_time.is_some() {
            self.has_end_time = true;
        }
        if let Some(location) = fields.location {
            self.location = location;
        }
        for (col, value) in fields.text {
            self.text.set(&col, value);
        }
        if let Some(offers) = fields.offers {
            self.offers = offers;
        }
        if let Some(links) = fields.external_links {
            self.external_links = links;
        }
        self.keywords = fields.keywords;
        self.last_modified_time = modified;
    }
}

/// `page` / `page_size` query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
}

impl Pagination {
    pub const DEFAULT_PAGE_SIZE: u64 = 20;
    pub const MAX_PAGE_SIZE: u64 = 100;

    /// Rows before this page. Saturates instead of overflowing.
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }

    /// Rows up to and including this page.
    pub fn end(&self) -> u64 {
        self.page.saturating_mul(self.page_size)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PageMeta {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
}

/// Paginated list response body.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Page {
    pub meta: PageMeta,
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<Value>,
}

/// Query string of list endpoints, documented for OpenAPI. Handlers read
/// the raw map so unknown keys pass through to pagination links.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventListParams {
    /// Free text over every translated field and language.
    pub text: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub last_modified_since: Option<String>,
    /// `west,south,east,north`
    pub bbox: Option<String>,
    pub data_source: Option<String>,
    pub location: Option<String>,
    pub keyword: Option<String>,
    /// `super` or `sub`
    pub recurring: Option<String>,
    pub max_duration: Option<String>,
    pub min_duration: Option<String>,
    pub show_all: Option<String>,
    pub sort: Option<String>,
    pub include: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct KeywordListParams {
    pub show_all_keywords: Option<String>,
    pub data_source: Option<String>,
    /// Name prefix.
    pub filter: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PlaceListParams {
    pub show_all_places: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Full text query.
    pub q: Option<String>,
    /// Autocomplete prefix.
    pub input: Option<String>,
    pub language: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

/// Convert a serializable record into a JSON object.
pub(crate) fn to_object<T: Serialize>(record: &T) -> Map<String, Value> {
    match serde_json::to_value(record) {
        Ok(Value::Object(object)) => object,
        _ => Map::new(),
    }
}
