//! JSON-LD envelope: `@id`, `@type` and `@context` decoration, relation
//! references and identifier quoting.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::error::{LinkedEventsError, LinkedEventsResult};

pub const SCHEMA_ORG_CONTEXT: &str = "http://schema.org";

/// Relations that may be expanded through `include`.
pub const EXPANDABLE_RELATIONS: &[&str] = &["location", "keywords", "sub_events"];

/// Percent-encode the last non-empty path segment of `link` when it holds a
/// colon, so `…/event/helsinki:1/` becomes `…/event/helsinki%3A1/`.
pub fn urlquote_id(link: &str) -> String {
    let mut parts: Vec<String> = link.split('/').map(str::to_string).collect();
    if let Some(segment) = parts.iter_mut().rev().find(|p| !p.is_empty()) {
        if segment.contains(':') {
            *segment = urlencoding::encode(segment).into_owned();
        }
    }
    parts.join("/")
}

/// Recover a record id from an `@id` URI.
///
/// Anything that isn't an `http(s)` URI is taken to be a bare id already.
pub fn parse_id_from_uri(uri: &str) -> String {
    if !uri.starts_with("http") {
        return uri.to_string();
    }

    let after_scheme = uri.split_once("://").map(|(_, rest)| rest).unwrap_or(uri);
    let path = after_scheme
        .find('/')
        .map(|idx| &after_scheme[idx..])
        .unwrap_or("");
    let path = path.split(['?', '#']).next().unwrap_or("");
    let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");

    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

/// A record type with its own API view.
pub trait JsonLdResource {
    /// `@type` label.
    const TYPE: &'static str;
    /// Path segment of the detail view.
    const VIEW_NAME: &'static str;

    fn ld_context() -> Value {
        Value::String(SCHEMA_ORG_CONTEXT.to_string())
    }
}

/// Where a representation ends up in the response document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Detail response body; carries `@context`.
    TopLevel,
    /// List item or embedded relation.
    Nested,
}

/// Per-request rendering settings.
#[derive(Debug, Clone, Default)]
pub struct JsonLdContext {
    base_url: String,
    include: BTreeSet<String>,
    hide_ld_context: bool,
    camelcase: bool,
}

impl JsonLdContext {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    /// Relations named by a comma separated `include` parameter. Names that
    /// can't be expanded are ignored.
    pub fn with_include(mut self, include: Option<&str>) -> Self {
        self.include = include
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|name| EXPANDABLE_RELATIONS.contains(name))
            .map(str::to_string)
            .collect();
        self
    }

    pub fn with_hide_ld_context(mut self, hide: bool) -> Self {
        self.hide_ld_context = hide;
        self
    }

    pub fn with_camelcase(mut self, camelcase: bool) -> Self {
        self.camelcase = camelcase;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn includes(&self, relation: &str) -> bool {
        self.include.contains(relation)
    }

    pub fn camelcase(&self) -> bool {
        self.camelcase
    }

    /// Embedded representations never expand further.
    pub fn nested(&self) -> Self {
        Self {
            include: BTreeSet::new(),
            ..self.clone()
        }
    }

    /// `<base>/<view>/`
    pub fn list_uri(&self, view: &str) -> String {
        format!("{}/{}/", self.base_url, view)
    }

    /// `<base>/<view>/<quoted id>/`
    pub fn id_uri(&self, view: &str, id: &str) -> String {
        urlquote_id(&format!("{}/{}/{}/", self.base_url, view, id))
    }

    pub fn resource_uri<R: JsonLdResource>(&self, id: &str) -> String {
        self.id_uri(R::VIEW_NAME, id)
    }

    /// Add `@id` and `@type`, plus `@context` for a top-level representation.
    pub fn envelope<R: JsonLdResource>(
        &self,
        object: &mut Map<String, Value>,
        id: &str,
        placement: Placement,
    ) {
        object.insert("@id".into(), Value::String(self.resource_uri::<R>(id)));
        if placement == Placement::TopLevel && !self.hide_ld_context {
            object.insert("@context".into(), R::ld_context());
        }
        object.insert("@type".into(), Value::String(R::TYPE.into()));
    }
}

/// A relation to another record.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    Reference(String),
    Expanded(Map<String, Value>),
}

impl Related {
    pub fn reference<R: JsonLdResource>(ctx: &JsonLdContext, id: &str) -> Self {
        Related::Reference(ctx.resource_uri::<R>(id))
    }

    pub fn into_value(self) -> Value {
        match self {
            Related::Reference(uri) => {
                let mut object = Map::new();
                object.insert("@id".into(), Value::String(uri));
                Value::Object(object)
            }
            Related::Expanded(object) => Value::Object(object),
        }
    }
}

/// Id of an inbound relation object such as `{"@id": "http://…/place/tprek%3A1/"}`.
pub fn relation_id(field: &str, value: &Value) -> LinkedEventsResult<String> {
    value
        .as_object()
        .and_then(|object| object.get("@id"))
        .and_then(Value::as_str)
        .map(parse_id_from_uri)
        .ok_or_else(|| LinkedEventsError::MissingRelationId(field.to_string()))
}

pub fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for (idx, c) in key.chars().enumerate() {
        if c == '_' && idx > 0 {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

pub fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Client-owned object whose keys are stored verbatim.
const FREE_FORM_FIELD: &str = "custom_data";

fn convert_keys(value: Value, convert: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(object) => Value::Object(
            object
                .into_iter()
                .map(|(key, value)| {
                    if key.starts_with('@') {
                        return (key, convert_keys(value, convert));
                    }
                    let free_form = to_snake_case(&key) == FREE_FORM_FIELD;
                    let key = convert(&key);
                    let value = if free_form { value } else { convert_keys(value, convert) };
                    (key, value)
                })
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| convert_keys(v, convert)).collect())
        }
        other => other,
    }
}

/// Rename output keys to camelCase. `@` keys and the contents of
/// `custom_data` are kept.
pub fn camelize(value: Value) -> Value {
    convert_keys(value, &to_camel_case)
}

/// Rename inbound camelCase keys back to snake_case.
pub fn underscoreize(value: Value) -> Value {
    convert_keys(value, &to_snake_case)
}
