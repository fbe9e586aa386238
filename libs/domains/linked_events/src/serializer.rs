//! Record representations and inbound event payloads.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde_json::{Map, Value};

use crate::error::{LinkedEventsError, LinkedEventsResult};
use crate::filter::parse_time;
use crate::jsonld::{self, JsonLdContext, JsonLdResource, Placement, Related, relation_id};
use crate::models::{
    Event, EventFields, EventLink, EventStatus, EventTime, Keyword, Language, Offer, Place,
    TextColumns, to_object,
};
use crate::translation::{
    self, EVENT_TRANSLATED_FIELDS, KEYWORD_TRANSLATED_FIELDS, LANGUAGE_TRANSLATED_FIELDS,
    LanguageSet, OFFER_TRANSLATED_FIELDS, PLACE_TRANSLATED_FIELDS, SUPPORTED_LANGUAGES,
};

const HIDDEN_EVENT_FIELDS: &[&str] = &["has_start_time", "has_end_time", "is_recurring_super"];

/// Related records fetched for `include` expansion.
#[derive(Debug, Clone, Default)]
pub struct Expansions {
    pub places: HashMap<String, Place>,
    pub keywords: HashMap<String, Keyword>,
    pub sub_events: HashMap<String, Event>,
}

/// Ids the given events would expand under `ctx`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpansionIds {
    pub places: Vec<String>,
    pub keywords: Vec<String>,
    pub sub_events: Vec<String>,
}

impl ExpansionIds {
    pub fn collect<'a>(events: impl IntoIterator<Item = &'a Event>, ctx: &JsonLdContext) -> Self {
        let mut places = BTreeSet::new();
        let mut keywords = BTreeSet::new();
        let mut sub_events = BTreeSet::new();

        for event in events {
            if ctx.includes("location") {
                places.extend(event.location.iter().cloned());
            }
            if ctx.includes("keywords") {
                keywords.extend(event.keywords.iter().cloned());
            }
            if ctx.includes("sub_events") {
                sub_events.extend(event.sub_events.iter().cloned());
            }
        }

        Self {
            places: places.into_iter().collect(),
            keywords: keywords.into_iter().collect(),
            sub_events: sub_events.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty() && self.keywords.is_empty() && self.sub_events.is_empty()
    }
}

/// Renders records into their JSON-LD wire form.
#[derive(Debug, Clone, Copy)]
pub struct Renderer<'a> {
    pub ctx: &'a JsonLdContext,
    pub langs: &'a LanguageSet,
    pub tz: Tz,
}

impl<'a> Renderer<'a> {
    pub fn new(ctx: &'a JsonLdContext, langs: &'a LanguageSet, tz: Tz) -> Self {
        Self { ctx, langs, tz }
    }

    fn translated<T: serde::Serialize>(&self, record: &T, fields: &[&str]) -> Map<String, Value> {
        let mut object = to_object(record);
        translation::decode(&mut object, fields, self.langs);
        object
    }

    pub fn place(&self, place: &Place, placement: Placement) -> Map<String, Value> {
        let mut object = self.translated(place, PLACE_TRANSLATED_FIELDS);
        self.ctx.envelope::<Place>(&mut object, &place.id, placement);
        object
    }

    pub fn keyword(&self, keyword: &Keyword, placement: Placement) -> Map<String, Value> {
        let mut object = self.translated(keyword, KEYWORD_TRANSLATED_FIELDS);
        self.ctx.envelope::<Keyword>(&mut object, &keyword.id, placement);
        object
    }

    pub fn language(&self, language: &Language, placement: Placement) -> Map<String, Value> {
        let mut object = self.translated(language, LANGUAGE_TRANSLATED_FIELDS);
        self.ctx.envelope::<Language>(&mut object, &language.id, placement);
        object
    }

    fn offer(&self, offer: &Offer) -> Value {
        Value::Object(self.translated(offer, OFFER_TRANSLATED_FIELDS))
    }

    fn link(link: &EventLink) -> Value {
        let mut object = to_object(link);
        if link.name.is_empty() {
            object.insert("name".into(), Value::Null);
        }
        Value::Object(object)
    }

    fn related<R: JsonLdResource>(&self, id: &str, expanded: Option<Map<String, Value>>) -> Value {
        match expanded {
            Some(object) => Related::Expanded(object),
            None => Related::reference::<R>(self.ctx, id),
        }
        .into_value()
    }

    /// Full event representation.
    ///
    /// Date-only start times render as a local date; a date-only end time
    /// within a day of the start renders as null.
    pub fn event(
        &self,
        event: &Event,
        expansions: &Expansions,
        placement: Placement,
        days_left: bool,
    ) -> Map<String, Value> {
        let mut object = self.translated(event, EVENT_TRANSLATED_FIELDS);
        for field in HIDDEN_EVENT_FIELDS {
            object.remove(*field);
        }

        if let (false, Some(start)) = (event.has_start_time, event.start_time) {
            let local_date = start.with_timezone(&self.tz).format("%Y-%m-%d").to_string();
            object.insert("start_time".into(), Value::String(local_date));
        }
        if let (false, Some(start), Some(end)) = (event.has_end_time, event.start_time, event.end_time) {
            if end - start <= Duration::days(1) {
                object.insert("end_time".into(), Value::Null);
            }
        }
        if days_left {
            object.insert("days_left".into(), event.days_left().map(Value::from).unwrap_or(Value::Null));
        }

        object.insert(
            "offers".into(),
            Value::Array(event.offers.iter().map(|o| self.offer(o)).collect()),
        );
        object.insert(
            "external_links".into(),
            Value::Array(event.external_links.iter().map(Self::link).collect()),
        );

        let nested_ctx = self.ctx.nested();
        let nested = Renderer::new(&nested_ctx, self.langs, self.tz);
        let expand = |relation: &str| self.ctx.includes(relation);

        let location = match &event.location {
            Some(id) => {
                let expanded = expansions
                    .places
                    .get(id)
                    .filter(|_| expand("location"))
                    .map(|place| nested.place(place, Placement::Nested));
                self.related::<Place>(id, expanded)
            }
            None => Value::Null,
        };
        object.insert("location".into(), location);

        let keywords = event
            .keywords
            .iter()
            .map(|id| {
                let expanded = expansions
                    .keywords
                    .get(id)
                    .filter(|_| expand("keywords"))
                    .map(|keyword| nested.keyword(keyword, Placement::Nested));
                self.related::<Keyword>(id, expanded)
            })
            .collect();
        object.insert("keywords".into(), Value::Array(keywords));

        let sub_events = event
            .sub_events
            .iter()
            .map(|id| {
                let expanded = expansions
                    .sub_events
                    .get(id)
                    .filter(|_| expand("sub_events"))
                    .map(|child| nested.event(child, &Expansions::default(), Placement::Nested, false));
                self.related::<Event>(id, expanded)
            })
            .collect();
        object.insert("sub_events".into(), Value::Array(sub_events));

        let super_event = event
            .super_event
            .as_deref()
            .map(|id| Related::reference::<Event>(self.ctx, id).into_value())
            .unwrap_or(Value::Null);
        object.insert("super_event".into(), super_event);

        self.ctx.envelope::<Event>(&mut object, &event.id, placement);
        object
    }

    /// Final output form: camelCase keys when enabled.
    pub fn finish(&self, object: Map<String, Value>) -> Value {
        let value = Value::Object(object);
        if self.ctx.camelcase() {
            jsonld::camelize(value)
        } else {
            value
        }
    }
}

/// Parsed create or update body. Relation ids are not yet checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPayload {
    /// Client supplied `id`, if any.
    pub id: Option<String>,
    pub fields: EventFields,
}

fn invalid(message: impl Into<String>) -> LinkedEventsError {
    LinkedEventsError::InvalidPayload(message.into())
}

fn text_columns(
    object: &mut Map<String, Value>,
    fields: &[&str],
) -> LinkedEventsResult<BTreeMap<String, Option<String>>> {
    let mut columns = BTreeMap::new();
    for field in fields {
        let names = std::iter::once(field.to_string())
            .chain(SUPPORTED_LANGUAGES.iter().map(|lang| translation::column(field, lang)));
        for name in names {
            match object.remove(&name) {
                None => {}
                Some(Value::Null) => {
                    columns.insert(name, None);
                }
                Some(Value::String(text)) => {
                    columns.insert(name, Some(text));
                }
                Some(_) => return Err(invalid(format!("{name}: expected text"))),
            }
        }
    }
    Ok(columns)
}

fn optional_time(
    object: &mut Map<String, Value>,
    field: &str,
    tz: Tz,
    now: DateTime<Utc>,
) -> LinkedEventsResult<Option<Option<EventTime>>> {
    match object.remove(field) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(Value::String(raw)) => Ok(Some(Some(parse_time(&raw, true, tz, now)?))),
        Some(_) => Err(invalid(format!("{field}: expected a date or date-time string"))),
    }
}

fn optional_relation(
    object: &mut Map<String, Value>,
    field: &str,
) -> LinkedEventsResult<Option<Option<String>>> {
    match object.remove(field) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(value) => Ok(Some(Some(relation_id(field, &value)?))),
    }
}

/// Related ids in first-seen order, without repeats.
fn relation_list(object: &mut Map<String, Value>, field: &str) -> LinkedEventsResult<Vec<String>> {
    match object.remove(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => {
            let mut ids: Vec<String> = Vec::with_capacity(items.len());
            for item in &items {
                let id = relation_id(field, item)?;
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            Ok(ids)
        }
        Some(_) => Err(invalid(format!("{field}: expected a list"))),
    }
}

fn objects(value: Option<Value>, field: &str) -> LinkedEventsResult<Option<Vec<Map<String, Value>>>> {
    match value {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(Vec::new())),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(object) => Ok(object),
                _ => Err(invalid(format!("{field}: expected a list of objects"))),
            })
            .collect::<LinkedEventsResult<Vec<_>>>()
            .map(Some),
        Some(_) => Err(invalid(format!("{field}: expected a list"))),
    }
}

fn parse_offer(mut object: Map<String, Value>, langs: &LanguageSet) -> LinkedEventsResult<Offer> {
    let is_free = match object.remove("is_free") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => flag,
        Some(_) => return Err(invalid("offers.is_free: expected a boolean")),
    };
    translation::encode(&mut object, OFFER_TRANSLATED_FIELDS, langs)?;

    let mut text = TextColumns::new();
    for (column, value) in text_columns(&mut object, OFFER_TRANSLATED_FIELDS)? {
        text.set(&column, value);
    }
    Ok(Offer { is_free, text })
}

fn parse_link(object: Map<String, Value>) -> LinkedEventsResult<EventLink> {
    let string = |key: &str, required: bool| -> LinkedEventsResult<String> {
        match object.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            None | Some(Value::Null) if !required => Ok(String::new()),
            _ => Err(invalid(format!("external_links.{key}: expected text"))),
        }
    };
    Ok(EventLink {
        name: string("name", false)?,
        language: string("language", true)?,
        link: string("link", true)?,
    })
}

/// Parse an event create/update body.
///
/// Translated fields go through the codec, times through `parse_time`
/// (dates become date-only times), and relations must be `{"@id": …}`
/// objects.
pub fn parse_event_payload(
    body: Value,
    langs: &LanguageSet,
    tz: Tz,
    now: DateTime<Utc>,
    camelcase: bool,
) -> LinkedEventsResult<EventPayload> {
    let body = if camelcase { jsonld::underscoreize(body) } else { body };
    let Value::Object(mut object) = body else {
        return Err(invalid("Expected a JSON object"));
    };

    let id = match object.remove("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) => Some(id),
        Some(other) => Some(other.to_string()),
    };

    translation::encode(&mut object, EVENT_TRANSLATED_FIELDS, langs)?;
    let text = text_columns(&mut object, EVENT_TRANSLATED_FIELDS)?;

    let offers = objects(object.remove("offers"), "offers")?
        .map(|items| items.into_iter().map(|o| parse_offer(o, langs)).collect())
        .transpose()?;
    let external_links = objects(object.remove("external_links"), "external_links")?
        .map(|items| items.into_iter().map(parse_link).collect())
        .transpose()?;

    let event_status = match object.remove("event_status") {
        None | Some(Value::Null) => None,
        Some(Value::String(status)) => Some(
            EventStatus::from_str(&status)
                .map_err(|_| invalid(format!("event_status: unknown status '{status}'")))?,
        ),
        Some(_) => return Err(invalid("event_status: expected text")),
    };

    let custom_data = match object.remove("custom_data") {
        None | Some(Value::Null) => None,
        Some(data @ Value::Object(_)) => Some(data),
        Some(_) => return Err(invalid("custom_data: expected an object")),
    };

    let fields = EventFields {
        start_time: optional_time(&mut object, "start_time", tz, now)?,
        end_time: optional_time(&mut object, "end_time", tz, now)?,
        location: optional_relation(&mut object, "location")?,
        keywords: relation_list(&mut object, "keywords")?,
        offers,
        external_links,
        super_event: optional_relation(&mut object, "super_event")?,
        event_status,
        custom_data,
        text,
    };

    Ok(EventPayload { id, fields })
}
