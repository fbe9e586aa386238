//! Full text and autocomplete search over events, places and keywords.
//!
//! A [`SearchIndex`] returns scored hits of mixed record types. Each hit is
//! rendered by the serializer registered for its kind in a
//! [`SerializerRegistry`], which is checked against the searchable kinds at
//! startup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value, json};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tokio::sync::RwLock;

use crate::error::{LinkedEventsError, LinkedEventsResult};
use crate::filter::{EventFilter, param};
use crate::jsonld::Placement;
use crate::models::{Event, Keyword, Pagination, Place, TextColumns};
use crate::repository::{EventStore, KeywordQuery, PlaceQuery};
use crate::serializer::{Expansions, Renderer};
use crate::translation::{
    EVENT_TRANSLATED_FIELDS, KEYWORD_TRANSLATED_FIELDS, LanguageSet, PLACE_TRANSLATED_FIELDS,
};

/// Scale of the autocomplete date decay: a hit ending this far from now
/// keeps half its score.
pub const DATE_DECAY_SCALE_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum SearchEntityKind {
    Event,
    Place,
    Keyword,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchEntity {
    Event(Event),
    Place(Place),
    Keyword(Keyword),
}

impl SearchEntity {
    pub fn kind(&self) -> SearchEntityKind {
        match self {
            SearchEntity::Event(_) => SearchEntityKind::Event,
            SearchEntity::Place(_) => SearchEntityKind::Place,
            SearchEntity::Keyword(_) => SearchEntityKind::Keyword,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SearchEntity::Event(e) => &e.id,
            SearchEntity::Place(p) => &p.id,
            SearchEntity::Keyword(k) => &k.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub entity: SearchEntity,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchMode {
    /// Scored full text query.
    FullText(String),
    /// Name prefix; only upcoming events, decayed by end time.
    Autocomplete(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub mode: SearchMode,
    pub language: String,
    pub now: DateTime<Utc>,
    pub page: Pagination,
}

impl SearchQuery {
    /// Validate `q`, `input` and `language`.
    pub fn from_params(
        params: &HashMap<String, String>,
        langs: &LanguageSet,
        page: Pagination,
        now: DateTime<Utc>,
    ) -> LinkedEventsResult<Self> {
        let language = langs.resolve(params.get("language").map(String::as_str))?;

        let mode = match (param(params, "q"), param(params, "input")) {
            (None, None) => {
                return Err(LinkedEventsError::InvalidSearch(
                    "Supply search terms with 'q=' or autocomplete entry with 'input='".into(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(LinkedEventsError::InvalidSearch(
                    "Supply either 'q' or 'input', not both".into(),
                ));
            }
            (Some(q), None) => SearchMode::FullText(q.to_string()),
            (None, Some(input)) => SearchMode::Autocomplete(input.to_string()),
        };

        Ok(Self { mode, language, now, page })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub total: u64,
}

/// Search backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// One page of hits, best first, with the total hit count.
    async fn search(&self, query: &SearchQuery) -> LinkedEventsResult<SearchResults>;
}

/// Gaussian decay with value 0.5 at `scale` from the origin.
pub fn gauss_decay(distance: Duration, scale: Duration) -> f64 {
    let ratio = distance.num_milliseconds() as f64 / scale.num_milliseconds() as f64;
    0.5f64.powf(ratio * ratio)
}

/// Renders one kind of search hit.
pub type EntitySerializer = fn(&Renderer<'_>, &SearchEntity) -> LinkedEventsResult<Map<String, Value>>;

fn mismatched(entity: &SearchEntity) -> LinkedEventsError {
    LinkedEventsError::Internal(format!(
        "serializer received a {} hit",
        entity.kind()
    ))
}

fn serialize_event(renderer: &Renderer<'_>, entity: &SearchEntity) -> LinkedEventsResult<Map<String, Value>> {
    match entity {
        SearchEntity::Event(event) => {
            Ok(renderer.event(event, &Expansions::default(), Placement::Nested, false))
        }
        other => Err(mismatched(other)),
    }
}

fn serialize_place(renderer: &Renderer<'_>, entity: &SearchEntity) -> LinkedEventsResult<Map<String, Value>> {
    match entity {
        SearchEntity::Place(place) => Ok(renderer.place(place, Placement::Nested)),
        other => Err(mismatched(other)),
    }
}

fn serialize_keyword(renderer: &Renderer<'_>, entity: &SearchEntity) -> LinkedEventsResult<Map<String, Value>> {
    match entity {
        SearchEntity::Keyword(keyword) => Ok(renderer.keyword(keyword, Placement::Nested)),
        other => Err(mismatched(other)),
    }
}

/// Dispatch table from hit kind to serializer.
#[derive(Clone, Default)]
pub struct SerializerRegistry {
    serializers: HashMap<SearchEntityKind, EntitySerializer>,
}

impl std::fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.serializers.keys()).finish()
    }
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: SearchEntityKind, serializer: EntitySerializer) -> Self {
        self.serializers.insert(kind, serializer);
        self
    }

    /// Registry covering every searchable kind.
    pub fn standard() -> Self {
        Self::new()
            .register(SearchEntityKind::Event, serialize_event)
            .register(SearchEntityKind::Place, serialize_place)
            .register(SearchEntityKind::Keyword, serialize_keyword)
    }

    /// Fail unless every kind in `kinds` has a serializer.
    pub fn validate(&self, kinds: impl IntoIterator<Item = SearchEntityKind>) -> LinkedEventsResult<()> {
        for kind in kinds {
            if !self.serializers.contains_key(&kind) {
                return Err(LinkedEventsError::MissingSerializer(kind.to_string()));
            }
        }
        Ok(())
    }

    /// [`Self::validate`] against every kind a search can return.
    pub fn validate_all(&self) -> LinkedEventsResult<()> {
        self.validate(SearchEntityKind::iter())
    }

    /// Representation of a hit plus `object_type` and `score`.
    pub fn adapt(&self, renderer: &Renderer<'_>, hit: &SearchHit) -> LinkedEventsResult<Map<String, Value>> {
        let kind = hit.entity.kind();
        let serializer = self.serializers.get(&kind).ok_or_else(|| {
            LinkedEventsError::Internal(format!("no serializer registered for {kind} hits"))
        })?;

        let mut object = serializer(renderer, &hit.entity)?;
        object.insert("object_type".into(), Value::String(kind.to_string()));
        object.insert("score".into(), json!(hit.score));
        Ok(object)
    }
}

fn texts<'a>(text: &'a TextColumns, fields: &'a [&'a str], lang: &'a str, langs: &'a LanguageSet) -> Vec<String> {
    fields
        .iter()
        .filter_map(|field| text.translated(field, lang, langs))
        .map(str::to_lowercase)
        .collect()
}

/// Index kept in process memory; scores by term occurrences in the
/// requested language.
#[derive(Debug, Clone)]
pub struct InMemorySearchIndex {
    entities: Arc<RwLock<Vec<SearchEntity>>>,
    langs: LanguageSet,
}

impl InMemorySearchIndex {
    pub fn new(langs: LanguageSet) -> Self {
        Self {
            entities: Arc::new(RwLock::new(Vec::new())),
            langs,
        }
    }

    pub async fn index(&self, entity: SearchEntity) {
        let mut entities = self.entities.write().await;
        entities.retain(|e| !(e.kind() == entity.kind() && e.id() == entity.id()));
        entities.push(entity);
    }

    /// Index every event, place and keyword in `store`.
    pub async fn load_from<S: EventStore + ?Sized>(&self, store: &S) -> LinkedEventsResult<usize> {
        const BATCH: u64 = 100;
        let mut loaded = Vec::new();

        let everything = EventFilter::default();
        let mut page = Pagination { page: 1, page_size: BATCH };
        loop {
            let (events, count) = store.list_events(&everything, &page).await?;
            loaded.extend(events.into_iter().map(SearchEntity::Event));
            if page.end() >= count {
                break;
            }
            page.page += 1;
        }

        let mut page = Pagination { page: 1, page_size: BATCH };
        loop {
            let (places, count) = store.list_places(&PlaceQuery::default(), &page).await?;
            loaded.extend(places.into_iter().map(SearchEntity::Place));
            if page.end() >= count {
                break;
            }
            page.page += 1;
        }

        let mut page = Pagination { page: 1, page_size: BATCH };
        loop {
            let (keywords, count) = store.list_keywords(&KeywordQuery::default(), &page).await?;
            loaded.extend(keywords.into_iter().map(SearchEntity::Keyword));
            if page.end() >= count {
                break;
            }
            page.page += 1;
        }

        let total = loaded.len();
        *self.entities.write().await = loaded;
        tracing::info!(documents = total, "Loaded in-memory search index");
        Ok(total)
    }

    fn searchable_text(&self, entity: &SearchEntity, lang: &str) -> Vec<String> {
        match entity {
            SearchEntity::Event(e) => texts(&e.text, EVENT_TRANSLATED_FIELDS, lang, &self.langs),
            SearchEntity::Place(p) => texts(&p.text, PLACE_TRANSLATED_FIELDS, lang, &self.langs),
            SearchEntity::Keyword(k) => texts(&k.text, KEYWORD_TRANSLATED_FIELDS, lang, &self.langs),
        }
    }

    fn score(&self, entity: &SearchEntity, query: &SearchQuery) -> Option<f64> {
        match &query.mode {
            SearchMode::FullText(q) => {
                let haystack = self.searchable_text(entity, &query.language).join(" ");
                let mut score = 0.0;
                for term in q.to_lowercase().split_whitespace() {
                    let occurrences = haystack.matches(term).count();
                    if occurrences == 0 {
                        return None;
                    }
                    score += occurrences as f64;
                }
                (score > 0.0).then_some(score)
            }
            SearchMode::Autocomplete(input) => {
                let SearchEntity::Event(event) = entity else {
                    return None;
                };
                let end = event.end_time.filter(|end| *end > query.now)?;
                let prefix = input.to_lowercase();
                let name = event.text.translated("name", &query.language, &self.langs)?;
                let matched = name
                    .to_lowercase()
                    .split_whitespace()
                    .any(|word| word.starts_with(&prefix));
                matched.then(|| {
                    gauss_decay(end - query.now, Duration::days(DATE_DECAY_SCALE_DAYS))
                })
            }
        }
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn search(&self, query: &SearchQuery) -> LinkedEventsResult<SearchResults> {
        let entities = self.entities.read().await;

        let mut hits: Vec<SearchHit> = entities
            .iter()
            .filter_map(|entity| {
                self.score(entity, query).map(|score| SearchHit {
                    entity: entity.clone(),
                    score,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.entity.id().cmp(b.entity.id()))
        });

        let total = hits.len() as u64;
        let hits = hits
            .into_iter()
            .skip(query.page.offset() as usize)
            .take(query.page.page_size as usize)
            .collect();
        Ok(SearchResults { hits, total })
    }
}

/// Elasticsearch backed index.
///
/// Expects one index per language named `<prefix>-<lang>` whose documents
/// carry `object_type`, `id`, a `text` field, an `autosuggest` field and
/// `end_time`. Hits are loaded from the store by id.
pub struct ElasticsearchIndex<S: EventStore> {
    client: reqwest::Client,
    base_url: String,
    index_prefix: String,
    store: Arc<S>,
}

impl<S: EventStore> ElasticsearchIndex<S> {
    pub fn new(base_url: impl Into<String>, index_prefix: impl Into<String>, store: Arc<S>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index_prefix: index_prefix.into(),
            store,
        }
    }

    /// Request body for `_search`.
    pub fn request_body(query: &SearchQuery) -> Value {
        let from = query.page.offset();
        let size = query.page.page_size;
        match &query.mode {
            SearchMode::FullText(q) => json!({
                "from": from,
                "size": size,
                "query": {
                    "query_string": {
                        "query": q,
                        "default_field": "text",
                        "default_operator": "AND",
                    }
                },
            }),
            SearchMode::Autocomplete(input) => {
                let now = query.now.to_rfc3339();
                json!({
                    "from": from,
                    "size": size,
                    "query": {
                        "function_score": {
                            "query": {
                                "bool": {
                                    "must": {"match": {"autosuggest": input}},
                                    "filter": {"range": {"end_time": {"gt": now}}},
                                }
                            },
                            "functions": [{
                                "gauss": {
                                    "end_time": {
                                        "origin": now,
                                        "scale": format!("{DATE_DECAY_SCALE_DAYS}d"),
                                    }
                                }
                            }],
                        }
                    },
                })
            }
        }
    }

    async fn load(&self, kind: SearchEntityKind, id: &str) -> LinkedEventsResult<Option<SearchEntity>> {
        Ok(match kind {
            SearchEntityKind::Event => self.store.get_event(id).await?.map(SearchEntity::Event),
            SearchEntityKind::Place => self.store.get_place(id).await?.map(SearchEntity::Place),
            SearchEntityKind::Keyword => self.store.get_keyword(id).await?.map(SearchEntity::Keyword),
        })
    }
}

#[async_trait]
impl<S: EventStore> SearchIndex for ElasticsearchIndex<S> {
    #[tracing::instrument(skip(self, query), fields(language = %query.language))]
    async fn search(&self, query: &SearchQuery) -> LinkedEventsResult<SearchResults> {
        let url = format!("{}/{}-{}/_search", self.base_url, self.index_prefix, query.language);
        let backend = |e: reqwest::Error| LinkedEventsError::Search(e.to_string());

        let response: Value = self
            .client
            .post(&url)
            .json(&Self::request_body(query))
            .send()
            .await
            .map_err(backend)?
            .error_for_status()
            .map_err(backend)?
            .json()
            .await
            .map_err(backend)?;

        let total = match &response["hits"]["total"] {
            Value::Object(total) => total.get("value").and_then(Value::as_u64).unwrap_or(0),
            other => other.as_u64().unwrap_or(0),
        };

        let mut hits = Vec::new();
        for hit in response["hits"]["hits"].as_array().into_iter().flatten() {
            let source = &hit["_source"];
            let (Some(kind), Some(id)) = (
                source["object_type"].as_str().and_then(|k| k.parse().ok()),
                source["id"].as_str(),
            ) else {
                tracing::warn!(hit = %hit, "Skipping search hit without object_type or id");
                continue;
            };
            match self.load(kind, id).await? {
                Some(entity) => hits.push(SearchHit {
                    entity,
                    score: hit["_score"].as_f64().unwrap_or(0.0),
                }),
                None => tracing::warn!(%kind, id, "Search hit refers to a missing record"),
            }
        }

        Ok(SearchResults { hits, total })
    }
}
