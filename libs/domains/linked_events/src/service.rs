use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::instrument;

use crate::auth::Authorization;
use crate::error::{LinkedEventsError, LinkedEventsResult};
use crate::filter::{self, EventFilter, param};
use crate::ids::{SYSTEM_DATA_SOURCE, generate_id};
use crate::jsonld::{JsonLdContext, JsonLdResource, Placement};
use crate::models::{Event, EventFields, Keyword, Language, NewEvent, Page, PageMeta, Pagination, Place};
use crate::repository::{EventStore, KeywordQuery, PlaceQuery};
use crate::search::{SearchIndex, SearchQuery, SerializerRegistry};
use crate::serializer::{ExpansionIds, Expansions, Renderer, parse_event_payload};
use crate::translation::LanguageSet;

/// Rendering and parsing settings shared by every request.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub languages: LanguageSet,
    pub time_zone: Tz,
    /// Public API root including the version segment, e.g. `https://api.example.org/v1`.
    pub base_url: String,
    pub camelcase: bool,
}

/// A created event and the URI it lives at.
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub location: String,
    pub body: Value,
}

/// Service layer for the events directory
pub struct LinkedEventsService<S: EventStore> {
    store: Arc<S>,
    search: Arc<dyn SearchIndex>,
    registry: SerializerRegistry,
    settings: Arc<ServiceSettings>,
}

impl<S: EventStore> LinkedEventsService<S> {
    /// Fails when `registry` can't render every searchable kind.
    pub fn new(
        store: Arc<S>,
        search: Arc<dyn SearchIndex>,
        registry: SerializerRegistry,
        settings: ServiceSettings,
    ) -> LinkedEventsResult<Self> {
        registry.validate_all()?;
        Ok(Self {
            store,
            search,
            registry,
            settings: Arc::new(settings),
        })
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    fn context(&self, params: &HashMap<String, String>) -> JsonLdContext {
        JsonLdContext::new(&self.settings.base_url)
            .with_include(param(params, "include"))
            .with_camelcase(self.settings.camelcase)
    }

    fn renderer<'a>(&'a self, ctx: &'a JsonLdContext) -> Renderer<'a> {
        Renderer::new(ctx, &self.settings.languages, self.settings.time_zone)
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    /// `meta` block with links to neighbouring pages of `view`.
    fn page_meta(
        &self,
        ctx: &JsonLdContext,
        view: &str,
        params: &HashMap<String, String>,
        page: &Pagination,
        count: u64,
    ) -> PageMeta {
        let link = |target: Option<u64>| {
            let mut query: Vec<(String, String)> = params
                .iter()
                .filter(|(key, _)| key.as_str() != "page")
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            if let Some(target) = target {
                query.push(("page".to_string(), target.to_string()));
            }
            query.sort();
            let query = query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            if query.is_empty() {
                ctx.list_uri(view)
            } else {
                format!("{}?{}", ctx.list_uri(view), query)
            }
        };

        let next = (page.end() < count).then(|| link(Some(page.page + 1)));
        let previous = match page.page {
            1 => None,
            2 => Some(link(None)),
            n => Some(link(Some(n - 1))),
        };
        PageMeta { count, next, previous }
    }

    async fn expansions(&self, events: &[Event], ctx: &JsonLdContext) -> LinkedEventsResult<Expansions> {
        let ids = ExpansionIds::collect(events, ctx);
        if ids.is_empty() {
            return Ok(Expansions::default());
        }

        let places = self.store.get_places(&ids.places).await?;
        let keywords = self.store.get_keywords(&ids.keywords).await?;
        let sub_events = self.store.get_events(&ids.sub_events).await?;
        Ok(Expansions {
            places: places.into_iter().map(|p| (p.id.clone(), p)).collect(),
            keywords: keywords.into_iter().map(|k| (k.id.clone(), k)).collect(),
            sub_events: sub_events.into_iter().map(|e| (e.id.clone(), e)).collect(),
        })
    }

    /// Fail with the first relation id that doesn't exist.
    async fn check_relations(&self, fields: &EventFields) -> LinkedEventsResult<()> {
        if let Some(Some(location)) = &fields.location {
            if self.store.get_place(location).await?.is_none() {
                return Err(LinkedEventsError::RelatedNotFound {
                    kind: Place::TYPE,
                    id: location.clone(),
                });
            }
        }

        if !fields.keywords.is_empty() {
            let found = self.store.get_keywords(&fields.keywords).await?;
            if let Some(missing) = fields
                .keywords
                .iter()
                .find(|id| !found.iter().any(|k| &k.id == *id))
            {
                return Err(LinkedEventsError::RelatedNotFound {
                    kind: Keyword::TYPE,
                    id: missing.clone(),
                });
            }
        }

        if let Some(Some(parent)) = &fields.super_event {
            if self.store.get_event(parent).await?.is_none() {
                return Err(LinkedEventsError::RelatedNotFound {
                    kind: Event::TYPE,
                    id: parent.clone(),
                });
            }
        }
        Ok(())
    }

    async fn authorize(&self, caller: Option<&str>) -> LinkedEventsResult<Authorization> {
        let organizations = match caller {
            Some(user) => self.store.organizations_of(user).await?,
            None => Vec::new(),
        };
        Ok(Authorization::resolve(caller, &organizations))
    }

    #[instrument(skip(self, params))]
    pub async fn list_events(&self, params: &HashMap<String, String>) -> LinkedEventsResult<Page> {
        let page = filter::pagination(params)?;
        let filter = EventFilter::from_params(params, self.settings.time_zone, Self::now())?;
        let ctx = self.context(params);

        let (events, count) = self.store.list_events(&filter, &page).await?;
        filter::check_page(&page, count)?;

        let expansions = self.expansions(&events, &ctx).await?;
        let renderer = self.renderer(&ctx);
        let data = events
            .iter()
            .map(|e| {
                renderer.finish(renderer.event(e, &expansions, Placement::Nested, filter.emits_days_left()))
            })
            .collect();

        Ok(Page {
            meta: self.page_meta(&ctx, Event::VIEW_NAME, params, &page, count),
            data,
        })
    }

    #[instrument(skip(self, params), fields(event_id = %id))]
    pub async fn get_event(&self, id: &str, params: &HashMap<String, String>) -> LinkedEventsResult<Value> {
        let event = self
            .store
            .get_event(id)
            .await?
            .ok_or_else(|| LinkedEventsError::NotFound {
                kind: Event::TYPE,
                id: id.to_string(),
            })?;

        let ctx = self.context(params);
        let expansions = self.expansions(std::slice::from_ref(&event), &ctx).await?;
        let renderer = self.renderer(&ctx);
        Ok(renderer.finish(renderer.event(&event, &expansions, Placement::TopLevel, false)))
    }

    /// Create an event published by the caller's organization.
    #[instrument(skip(self, body))]
    pub async fn create_event(&self, caller: Option<&str>, body: Value) -> LinkedEventsResult<Created> {
        let publisher = self.authorize(caller).await?.publisher()?;

        let now = Self::now();
        let payload = parse_event_payload(
            body,
            &self.settings.languages,
            self.settings.time_zone,
            now,
            self.settings.camelcase,
        )?;
        if let Some(id) = payload.id {
            return Err(LinkedEventsError::ClientSuppliedId(id));
        }
        self.check_relations(&payload.fields).await?;

        let event = self
            .store
            .create_event(NewEvent {
                id: generate_id(SYSTEM_DATA_SOURCE, now),
                data_source: SYSTEM_DATA_SOURCE.to_string(),
                publisher,
                created_time: now,
                fields: payload.fields,
            })
            .await?;

        let ctx = self.context(&HashMap::new());
        let renderer = self.renderer(&ctx);
        Ok(Created {
            location: ctx.resource_uri::<Event>(&event.id),
            body: renderer.finish(renderer.event(&event, &Expansions::default(), Placement::TopLevel, false)),
        })
    }

    /// Replace the updatable fields of an existing event.
    #[instrument(skip(self, body), fields(event_id = %id))]
    pub async fn update_event(&self, caller: Option<&str>, id: &str, body: Value) -> LinkedEventsResult<Value> {
        self.authorize(caller).await?.publisher()?;

        if self.store.get_event(id).await?.is_none() {
            return Err(LinkedEventsError::NotFound {
                kind: Event::TYPE,
                id: id.to_string(),
            });
        }

        let now = Self::now();
        let payload = parse_event_payload(
            body,
            &self.settings.languages,
            self.settings.time_zone,
            now,
            self.settings.camelcase,
        )?;
        self.check_relations(&payload.fields).await?;

        let event = self.store.update_event(id, payload.fields, now).await?;

        let ctx = self.context(&HashMap::new());
        let renderer = self.renderer(&ctx);
        Ok(renderer.finish(renderer.event(&event, &Expansions::default(), Placement::TopLevel, false)))
    }

    /// Remove an event. Callers need the same standing as for updates.
    #[instrument(skip(self), fields(event_id = %id))]
    pub async fn delete_event(&self, caller: Option<&str>, id: &str) -> LinkedEventsResult<()> {
        self.authorize(caller).await?.publisher()?;

        if !self.store.delete_event(id).await? {
            return Err(LinkedEventsError::NotFound {
                kind: Event::TYPE,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Keywords attached to matching events, or every keyword with
    /// `show_all_keywords`.
    #[instrument(skip(self, params))]
    pub async fn list_keywords(&self, params: &HashMap<String, String>) -> LinkedEventsResult<Page> {
        let page = filter::pagination(params)?;
        let query = if param(params, "show_all_keywords").is_some() {
            KeywordQuery {
                data_source: param(params, "data_source").map(str::to_lowercase),
                ..Default::default()
            }
        } else {
            KeywordQuery {
                used_by: Some(EventFilter::for_used_records(params, self.settings.time_zone, Self::now())?),
                ..Default::default()
            }
        };
        let query = KeywordQuery {
            name_prefix: param(params, "filter").map(str::to_string),
            ..query
        };

        let (keywords, count) = self.store.list_keywords(&query, &page).await?;
        filter::check_page(&page, count)?;

        let ctx = self.context(params);
        let renderer = self.renderer(&ctx);
        Ok(Page {
            meta: self.page_meta(&ctx, Keyword::VIEW_NAME, params, &page, count),
            data: keywords
                .iter()
                .map(|k| renderer.finish(renderer.keyword(k, Placement::Nested)))
                .collect(),
        })
    }

    #[instrument(skip(self))]
    pub async fn get_keyword(&self, id: &str) -> LinkedEventsResult<Value> {
        let keyword = self
            .store
            .get_keyword(id)
            .await?
            .ok_or_else(|| LinkedEventsError::NotFound {
                kind: Keyword::TYPE,
                id: id.to_string(),
            })?;
        let ctx = self.context(&HashMap::new());
        let renderer = self.renderer(&ctx);
        Ok(renderer.finish(renderer.keyword(&keyword, Placement::TopLevel)))
    }

    /// Locations of matching events, or every place with `show_all_places`.
    #[instrument(skip(self, params))]
    pub async fn list_places(&self, params: &HashMap<String, String>) -> LinkedEventsResult<Page> {
        let page = filter::pagination(params)?;
        let query = if param(params, "show_all_places").is_some() {
            PlaceQuery::default()
        } else {
            PlaceQuery {
                used_by: Some(EventFilter::for_used_records(params, self.settings.time_zone, Self::now())?),
            }
        };

        let (places, count) = self.store.list_places(&query, &page).await?;
        filter::check_page(&page, count)?;

        let ctx = self.context(params);
        let renderer = self.renderer(&ctx);
        Ok(Page {
            meta: self.page_meta(&ctx, Place::VIEW_NAME, params, &page, count),
            data: places
                .iter()
                .map(|p| renderer.finish(renderer.place(p, Placement::Nested)))
                .collect(),
        })
    }

    #[instrument(skip(self))]
    pub async fn get_place(&self, id: &str) -> LinkedEventsResult<Value> {
        let place = self
            .store
            .get_place(id)
            .await?
            .ok_or_else(|| LinkedEventsError::NotFound {
                kind: Place::TYPE,
                id: id.to_string(),
            })?;
        let ctx = self.context(&HashMap::new());
        let renderer = self.renderer(&ctx);
        Ok(renderer.finish(renderer.place(&place, Placement::TopLevel)))
    }

    #[instrument(skip(self, params))]
    pub async fn list_languages(&self, params: &HashMap<String, String>) -> LinkedEventsResult<Page> {
        let page = filter::pagination(params)?;
        let languages = self.store.list_languages().await?;
        let count = languages.len() as u64;
        filter::check_page(&page, count)?;

        let ctx = self.context(params);
        let renderer = self.renderer(&ctx);
        Ok(Page {
            meta: self.page_meta(&ctx, Language::VIEW_NAME, params, &page, count),
            data: languages
                .iter()
                .skip(page.offset() as usize)
                .take(page.page_size as usize)
                .map(|l| renderer.finish(renderer.language(l, Placement::Nested)))
                .collect(),
        })
    }

    #[instrument(skip(self))]
    pub async fn get_language(&self, id: &str) -> LinkedEventsResult<Value> {
        let language = self
            .store
            .get_language(id)
            .await?
            .ok_or_else(|| LinkedEventsError::NotFound {
                kind: Language::TYPE,
                id: id.to_string(),
            })?;
        let ctx = self.context(&HashMap::new());
        let renderer = self.renderer(&ctx);
        Ok(renderer.finish(renderer.language(&language, Placement::TopLevel)))
    }

    /// Full text (`q`) or autocomplete (`input`) search in one language.
    #[instrument(skip(self, params))]
    pub async fn search(&self, params: &HashMap<String, String>) -> LinkedEventsResult<Page> {
        let page = filter::pagination(params)?;
        let query = SearchQuery::from_params(params, &self.settings.languages, page, Self::now())?;

        let results = self.search.search(&query).await?;
        filter::check_page(&page, results.total)?;

        let ctx = self.context(params);
        let renderer = self.renderer(&ctx);
        let data = results
            .hits
            .iter()
            .map(|hit| self.registry.adapt(&renderer, hit).map(|o| renderer.finish(o)))
            .collect::<LinkedEventsResult<Vec<_>>>()?;

        Ok(Page {
            meta: self.page_meta(&ctx, "search", params, &page, results.total),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Organization, TextColumns};
    use crate::repository::MockEventStore;
    use crate::search::{MockSearchIndex, SearchEntity, SearchHit, SearchResults};
    use chrono::TimeZone;
    use serde_json::json;

    fn settings() -> ServiceSettings {
        ServiceSettings {
            languages: LanguageSet::default(),
            time_zone: chrono_tz::Europe::Helsinki,
            base_url: "http://api.test/v1".into(),
            camelcase: false,
        }
    }

    fn service(store: MockEventStore) -> LinkedEventsService<MockEventStore> {
        LinkedEventsService::new(
            Arc::new(store),
            Arc::new(MockSearchIndex::new()),
            SerializerRegistry::standard(),
            settings(),
        )
        .unwrap()
    }

    fn org(id: &str) -> Organization {
        Organization {
            id: id.into(),
            name: id.into(),
            data_source: "system".into(),
        }
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_new_rejects_incomplete_registry() {
        let result = LinkedEventsService::new(
            Arc::new(MockEventStore::new()),
            Arc::new(MockSearchIndex::new()),
            SerializerRegistry::new(),
            settings(),
        );
        assert!(matches!(result, Err(LinkedEventsError::MissingSerializer(_))));
    }

    #[tokio::test]
    async fn test_create_uses_sole_organization_as_publisher() {
        let mut store = MockEventStore::new();
        store
            .expect_organizations_of()
            .withf(|user| user == "alice")
            .returning(|_| Ok(vec![org("org:1")]));
        store
            .expect_create_event()
            .withf(|event| event.publisher == "org:1" && event.data_source == "system" && event.id.starts_with("system:"))
            .returning(|event| Ok(event.into_event()));

        let created = service(store)
            .create_event(Some("alice"), json!({"name": {"fi": "Konsertti"}}))
            .await
            .unwrap();

        assert!(created.location.starts_with("http://api.test/v1/event/system%3A"));
        assert_eq!(created.body["publisher"], "org:1");
        assert_eq!(created.body["@id"], created.location.as_str());
        assert_eq!(created.body["name"], json!({"fi": "Konsertti"}));
    }

    #[tokio::test]
    async fn test_create_rejects_client_id() {
        let mut store = MockEventStore::new();
        store.expect_organizations_of().returning(|_| Ok(vec![org("org:1")]));
        store.expect_create_event().never();

        let err = service(store)
            .create_event(Some("alice"), json!({"id": "helsinki:1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkedEventsError::ClientSuppliedId(id) if id == "helsinki:1"));
    }

    #[tokio::test]
    async fn test_create_requires_exactly_one_organization() {
        let mut none = MockEventStore::new();
        none.expect_organizations_of().returning(|_| Ok(vec![]));
        let err = service(none).create_event(Some("bob"), json!({})).await.unwrap_err();
        assert!(matches!(err, LinkedEventsError::NoOrganization));

        let mut two = MockEventStore::new();
        two.expect_organizations_of().returning(|_| Ok(vec![org("org:1"), org("org:2")]));
        let err = service(two).create_event(Some("bob"), json!({})).await.unwrap_err();
        assert!(matches!(err, LinkedEventsError::MultipleOrganizations));

        let err = service(MockEventStore::new()).create_event(None, json!({})).await.unwrap_err();
        assert!(matches!(err, LinkedEventsError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_create_reports_missing_location() {
        let mut store = MockEventStore::new();
        store.expect_organizations_of().returning(|_| Ok(vec![org("org:1")]));
        store.expect_get_place().returning(|_| Ok(None));

        let err = service(store)
            .create_event(
                Some("alice"),
                json!({"location": {"@id": "http://api.test/v1/place/tprek%3A404/"}}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Place with id tprek:404 does not exist");
    }

    #[tokio::test]
    async fn test_update_missing_event() {
        let mut store = MockEventStore::new();
        store.expect_organizations_of().returning(|_| Ok(vec![org("org:1")]));
        store.expect_get_event().returning(|_| Ok(None));
        store.expect_update_event().never();

        let err = service(store)
            .update_event(Some("alice"), "system:nope", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkedEventsError::NotFound { kind: "Event", .. }));
    }

    #[tokio::test]
    async fn test_delete_event() {
        let err = service(MockEventStore::new())
            .delete_event(None, "helsinki:1")
            .await
            .unwrap_err();
        assert!(matches!(err, LinkedEventsError::Unauthenticated));

        let mut missing = MockEventStore::new();
        missing.expect_organizations_of().returning(|_| Ok(vec![org("org:1")]));
        missing.expect_delete_event().returning(|_| Ok(false));
        let err = service(missing)
            .delete_event(Some("alice"), "system:nope")
            .await
            .unwrap_err();
        assert!(matches!(err, LinkedEventsError::NotFound { kind: "Event", .. }));

        let mut store = MockEventStore::new();
        store.expect_organizations_of().returning(|_| Ok(vec![org("org:1")]));
        store
            .expect_delete_event()
            .withf(|id| id == "helsinki:1")
            .times(1)
            .returning(|_| Ok(true));
        service(store).delete_event(Some("alice"), "helsinki:1").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_events_meta_links() {
        let mut store = MockEventStore::new();
        store
            .expect_list_events()
            .withf(|filter, page| filter.only_scheduled && page.page == 2 && page.page_size == 1)
            .returning(|_, _| Ok((Vec::new(), 3)));

        let page = service(store)
            .list_events(&params(&[("page", "2"), ("page_size", "1"), ("text", "jazz")]))
            .await
            .unwrap();

        assert_eq!(page.meta.count, 3);
        assert_eq!(
            page.meta.next.as_deref(),
            Some("http://api.test/v1/event/?page=3&page_size=1&text=jazz")
        );
        assert_eq!(
            page.meta.previous.as_deref(),
            Some("http://api.test/v1/event/?page_size=1&text=jazz")
        );
    }

    #[tokio::test]
    async fn test_list_events_page_out_of_range() {
        let mut store = MockEventStore::new();
        store.expect_list_events().returning(|_, _| Ok((Vec::new(), 3)));

        let err = service(store).list_events(&params(&[("page", "9")])).await.unwrap_err();
        assert!(matches!(err, LinkedEventsError::InvalidPage));
    }

    #[tokio::test]
    async fn test_keyword_listing_modes() {
        let mut store = MockEventStore::new();
        store
            .expect_list_keywords()
            .withf(|query, _| query.used_by.is_none() && query.data_source.as_deref() == Some("yso"))
            .times(1)
            .returning(|_, _| Ok((Vec::new(), 0)));
        store
            .expect_list_keywords()
            .withf(|query, _| {
                query.used_by.as_ref().is_some_and(|f| !f.only_scheduled && f.start.is_some())
                    && query.name_prefix.as_deref() == Some("mus")
            })
            .times(1)
            .returning(|_, _| Ok((Vec::new(), 0)));

        let service = service(store);
        service
            .list_keywords(&params(&[("show_all_keywords", "1"), ("data_source", "YSO")]))
            .await
            .unwrap();
        service
            .list_keywords(&params(&[("event.start", "today"), ("filter", "mus")]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_search_adapts_hits() {
        let mut index = MockSearchIndex::new();
        index.expect_search().returning(|_| {
            Ok(SearchResults {
                hits: vec![SearchHit {
                    entity: SearchEntity::Keyword(Keyword {
                        id: "yso:p1".into(),
                        data_source: "yso".into(),
                        origin_id: None,
                        aggregate: false,
                        last_modified_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                        text: TextColumns::new().with("name_fi", "Musiikki"),
                    }),
                    score: 1.5,
                }],
                total: 1,
            })
        });

        let service = LinkedEventsService::new(
            Arc::new(MockEventStore::new()),
            Arc::new(index),
            SerializerRegistry::standard(),
            settings(),
        )
        .unwrap();

        let page = service.search(&params(&[("q", "musiikki")])).await.unwrap();
        assert_eq!(page.meta.count, 1);
        assert_eq!(page.data[0]["object_type"], "keyword");
        assert_eq!(page.data[0]["score"], 1.5);
        assert_eq!(page.data[0]["name"], json!({"fi": "Musiikki"}));
    }
}
