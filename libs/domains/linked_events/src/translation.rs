//! Translated text fields.
//!
//! Storage keeps one column per language (`name_fi`, `name_sv`, `name_en`)
//! plus a bare mirror column (`name`) holding the default-language text. The
//! wire format nests them: `"name": {"fi": "...", "en": "..."}`, or `null`
//! when no language has a value.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::LinkedEventsError;

/// Languages that have storage columns.
pub const SUPPORTED_LANGUAGES: [&str; 3] = ["fi", "sv", "en"];

pub const EVENT_TRANSLATED_FIELDS: &[&str] = &[
    "name",
    "short_description",
    "description",
    "info_url",
    "location_extra_info",
    "provider",
];
pub const PLACE_TRANSLATED_FIELDS: &[&str] =
    &["name", "description", "street_address", "address_locality"];
pub const KEYWORD_TRANSLATED_FIELDS: &[&str] = &["name"];
pub const LANGUAGE_TRANSLATED_FIELDS: &[&str] = &["name"];
pub const OFFER_TRANSLATED_FIELDS: &[&str] = &["price", "info_url", "description"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LanguageSetError {
    #[error("at least one language must be configured")]
    Empty,
    #[error("language '{0}' is listed more than once")]
    Duplicate(String),
    #[error("language '{0}' is not supported (supported: fi, sv, en)")]
    Unsupported(String),
}

/// Ordered list of active languages; the first one is the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSet {
    codes: Vec<String>,
}

impl LanguageSet {
    pub fn new<I, S>(codes: I) -> Result<Self, LanguageSetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut validated: Vec<String> = Vec::new();
        for code in codes {
            let code = code.into().trim().to_ascii_lowercase();
            if !SUPPORTED_LANGUAGES.contains(&code.as_str()) {
                return Err(LanguageSetError::Unsupported(code));
            }
            if validated.contains(&code) {
                return Err(LanguageSetError::Duplicate(code));
            }
            validated.push(code);
        }
        if validated.is_empty() {
            return Err(LanguageSetError::Empty);
        }
        Ok(Self { codes: validated })
    }

    pub fn default_language(&self) -> &str {
        &self.codes[0]
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.iter().any(|c| c == code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(String::as_str)
    }

    /// Comma separated, in configured order.
    pub fn joined(&self) -> String {
        self.codes.join(",")
    }

    /// Check a `language` request parameter, defaulting to the first language.
    pub fn resolve(&self, requested: Option<&str>) -> Result<String, LinkedEventsError> {
        match requested.map(str::trim).filter(|l| !l.is_empty()) {
            None => Ok(self.default_language().to_string()),
            Some(lang) if self.contains(lang) => Ok(lang.to_string()),
            Some(_) => Err(LinkedEventsError::InvalidLanguage(self.joined())),
        }
    }
}

impl Default for LanguageSet {
    fn default() -> Self {
        Self {
            codes: SUPPORTED_LANGUAGES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Storage column name for `field` in `lang`.
pub fn column(field: &str, lang: &str) -> String {
    format!("{field}_{lang}")
}

fn present(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| !v.is_null()).cloned()
}

/// Storage form to wire form, in place.
///
/// Every per-language column of a translated field is removed and the bare
/// column is replaced by the nested language map (or `null`).
pub fn decode(flat: &mut Map<String, Value>, fields: &[&str], langs: &LanguageSet) {
    for field in fields {
        let mut nested = Map::new();
        for lang in langs.iter() {
            let mut value = present(flat.get(&column(field, lang)));
            if value.is_none() && lang == langs.default_language() {
                value = present(flat.get(*field));
            }
            if let Some(value) = value {
                nested.insert(lang.to_string(), value);
            }
        }

        for lang in SUPPORTED_LANGUAGES {
            flat.remove(&column(field, lang));
        }
        let decoded = if nested.is_empty() {
            Value::Null
        } else {
            Value::Object(nested)
        };
        flat.insert(field.to_string(), decoded);
    }
}

/// Wire form to storage form, in place.
///
/// A nested value writes `field_<lang>` for each configured language it
/// carries; the default language also writes the bare column. Other keys of
/// the nested object are dropped, as are per-language columns sent directly
/// by the client. Absent or `null` fields leave storage untouched.
pub fn encode(
    payload: &mut Map<String, Value>,
    fields: &[&str],
    langs: &LanguageSet,
) -> Result<(), LinkedEventsError> {
    for field in fields {
        for lang in SUPPORTED_LANGUAGES {
            payload.remove(&column(field, lang));
        }

        let nested = match payload.remove(*field) {
            None | Some(Value::Null) => continue,
            Some(Value::Object(nested)) => nested,
            Some(_) => {
                return Err(LinkedEventsError::InvalidPayload(format!(
                    "{field}: expected an object of language → text"
                )));
            }
        };

        for (lang, value) in nested {
            if !langs.contains(&lang) {
                continue;
            }
            if !(value.is_string() || value.is_null()) {
                return Err(LinkedEventsError::InvalidPayload(format!(
                    "{field}.{lang}: expected text"
                )));
            }
            if lang == langs.default_language() {
                payload.insert(field.to_string(), value.clone());
            }
            payload.insert(column(field, &lang), value);
        }
    }
    Ok(())
}
