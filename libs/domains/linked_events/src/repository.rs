use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{LinkedEventsError, LinkedEventsResult};
use crate::filter::{self, EventFilter};
use crate::models::{
    Event, EventFields, Keyword, Language, NewEvent, Organization, Pagination, Place,
};

/// Place listing options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceQuery {
    /// Only places that are the location of a matching event.
    pub used_by: Option<EventFilter>,
}

/// Keyword listing options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordQuery {
    /// Only keywords attached to a matching event.
    pub used_by: Option<EventFilter>,
    pub data_source: Option<String>,
    /// Prefix of the bare name column, matched case-sensitively.
    pub name_prefix: Option<String>,
}

/// Storage for the events directory.
///
/// Writes are atomic: either every row of a create or update lands, or none.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Matching events in filter order, with the total match count.
    async fn list_events(
        &self,
        filter: &EventFilter,
        page: &Pagination,
    ) -> LinkedEventsResult<(Vec<Event>, u64)>;

    async fn get_event(&self, id: &str) -> LinkedEventsResult<Option<Event>>;

    async fn get_events(&self, ids: &[String]) -> LinkedEventsResult<Vec<Event>>;

    async fn create_event(&self, event: NewEvent) -> LinkedEventsResult<Event>;

    async fn update_event(
        &self,
        id: &str,
        fields: EventFields,
        modified: DateTime<Utc>,
    ) -> LinkedEventsResult<Event>;

    /// Remove an event with its keywords, offers and links. Sub-events lose
    /// their `super_event`. `false` when no such event exists.
    async fn delete_event(&self, id: &str) -> LinkedEventsResult<bool>;

    async fn get_place(&self, id: &str) -> LinkedEventsResult<Option<Place>>;

    async fn get_places(&self, ids: &[String]) -> LinkedEventsResult<Vec<Place>>;

    async fn list_places(
        &self,
        query: &PlaceQuery,
        page: &Pagination,
    ) -> LinkedEventsResult<(Vec<Place>, u64)>;

    async fn get_keyword(&self, id: &str) -> LinkedEventsResult<Option<Keyword>>;

    async fn get_keywords(&self, ids: &[String]) -> LinkedEventsResult<Vec<Keyword>>;

    async fn list_keywords(
        &self,
        query: &KeywordQuery,
        page: &Pagination,
    ) -> LinkedEventsResult<(Vec<Keyword>, u64)>;

    async fn list_languages(&self) -> LinkedEventsResult<Vec<Language>>;

    async fn get_language(&self, id: &str) -> LinkedEventsResult<Option<Language>>;

    /// Organizations the user is a member of.
    async fn organizations_of(&self, user_id: &str) -> LinkedEventsResult<Vec<Organization>>;
}

#[derive(Debug, Default)]
struct Directory {
    events: HashMap<String, Event>,
    places: HashMap<String, Place>,
    keywords: HashMap<String, Keyword>,
    languages: HashMap<String, Language>,
    organizations: HashMap<String, Organization>,
    /// `(organization_id, user_id)`
    members: Vec<(String, String)>,
}

impl Directory {
    fn with_sub_events(&self, mut event: Event) -> Event {
        let mut children: Vec<String> = self
            .events
            .values()
            .filter(|e| e.super_event.as_deref() == Some(event.id.as_str()))
            .map(|e| e.id.clone())
            .collect();
        children.sort();
        event.sub_events = children;
        event
    }

    fn matching_events(&self, filter: &EventFilter) -> impl Iterator<Item = &Event> {
        self.events
            .values()
            .filter(move |event| filter.matches(event, |id| self.places.get(id)?.position))
    }
}

fn page_of<T>(mut items: Vec<T>, page: &Pagination) -> (Vec<T>, u64) {
    let count = items.len() as u64;
    let start = (page.offset() as usize).min(items.len());
    let mut rest = items.split_off(start);
    rest.truncate(page.page_size as usize);
    (rest, count)
}

/// In-memory implementation of EventStore (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryEventStore {
    directory: Arc<RwLock<Directory>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_event(&self, event: Event) {
        let mut directory = self.directory.write().await;
        directory.events.insert(event.id.clone(), event);
    }

    pub async fn insert_place(&self, place: Place) {
        let mut directory = self.directory.write().await;
        directory.places.insert(place.id.clone(), place);
    }

    pub async fn insert_keyword(&self, keyword: Keyword) {
        let mut directory = self.directory.write().await;
        directory.keywords.insert(keyword.id.clone(), keyword);
    }

    pub async fn insert_language(&self, language: Language) {
        let mut directory = self.directory.write().await;
        directory.languages.insert(language.id.clone(), language);
    }

    pub async fn insert_organization(&self, organization: Organization, members: &[&str]) {
        let mut directory = self.directory.write().await;
        for user in members {
            directory
                .members
                .push((organization.id.clone(), user.to_string()));
        }
        directory
            .organizations
            .insert(organization.id.clone(), organization);
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn list_events(
        &self,
        filter: &EventFilter,
        page: &Pagination,
    ) -> LinkedEventsResult<(Vec<Event>, u64)> {
        let directory = self.directory.read().await;
        let (events, count) = filter::apply(
            directory.events.values().cloned(),
            filter,
            page,
            |id| directory.places.get(id)?.position,
        );
        let events = events
            .into_iter()
            .map(|e| directory.with_sub_events(e))
            .collect();
        Ok((events, count))
    }

    async fn get_event(&self, id: &str) -> LinkedEventsResult<Option<Event>> {
        let directory = self.directory.read().await;
        Ok(directory
            .events
            .get(id)
            .cloned()
            .map(|e| directory.with_sub_events(e)))
    }

    async fn get_events(&self, ids: &[String]) -> LinkedEventsResult<Vec<Event>> {
        let directory = self.directory.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| directory.events.get(id).cloned())
            .map(|e| directory.with_sub_events(e))
            .collect())
    }

    async fn create_event(&self, event: NewEvent) -> LinkedEventsResult<Event> {
        let mut directory = self.directory.write().await;

        if directory.events.contains_key(&event.id) {
            return Err(LinkedEventsError::Internal(format!(
                "event id {} already in use",
                event.id
            )));
        }

        let event = event.into_event();
        directory.events.insert(event.id.clone(), event.clone());

        tracing::info!(event_id = %event.id, publisher = %event.publisher, "Created event");
        Ok(directory.with_sub_events(event))
    }

    async fn update_event(
        &self,
        id: &str,
        fields: EventFields,
        modified: DateTime<Utc>,
    ) -> LinkedEventsResult<Event> {
        let mut directory = self.directory.write().await;

        let event = directory
            .events
            .get_mut(id)
            .ok_or_else(|| LinkedEventsError::NotFound {
                kind: "Event",
                id: id.to_string(),
            })?;
        event.apply_update(fields, modified);
        let updated = event.clone();

        tracing::info!(event_id = %id, "Updated event");
        Ok(directory.with_sub_events(updated))
    }

    async fn delete_event(&self, id: &str) -> LinkedEventsResult<bool> {
        let mut directory = self.directory.write().await;
        if directory.events.remove(id).is_none() {
            return Ok(false);
        }
        for child in directory.events.values_mut() {
            if child.super_event.as_deref() == Some(id) {
                child.super_event = None;
            }
        }

        tracing::info!(event_id = %id, "Deleted event");
        Ok(true)
    }

    async fn get_place(&self, id: &str) -> LinkedEventsResult<Option<Place>> {
        let directory = self.directory.read().await;
        Ok(directory.places.get(id).cloned())
    }

    async fn get_places(&self, ids: &[String]) -> LinkedEventsResult<Vec<Place>> {
        let directory = self.directory.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| directory.places.get(id).cloned())
            .collect())
    }

    async fn list_places(
        &self,
        query: &PlaceQuery,
        page: &Pagination,
    ) -> LinkedEventsResult<(Vec<Place>, u64)> {
        let directory = self.directory.read().await;

        let used: Option<BTreeSet<&str>> = query.used_by.as_ref().map(|filter| {
            directory
                .matching_events(filter)
                .filter_map(|e| e.location.as_deref())
                .collect()
        });

        let mut places: Vec<Place> = directory
            .places
            .values()
            .filter(|p| used.as_ref().is_none_or(|ids| ids.contains(p.id.as_str())))
            .cloned()
            .collect();
        places.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(page_of(places, page))
    }

    async fn get_keyword(&self, id: &str) -> LinkedEventsResult<Option<Keyword>> {
        let directory = self.directory.read().await;
        Ok(directory.keywords.get(id).cloned())
    }

    async fn get_keywords(&self, ids: &[String]) -> LinkedEventsResult<Vec<Keyword>> {
        let directory = self.directory.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| directory.keywords.get(id).cloned())
            .collect())
    }

    async fn list_keywords(
        &self,
        query: &KeywordQuery,
        page: &Pagination,
    ) -> LinkedEventsResult<(Vec<Keyword>, u64)> {
        let directory = self.directory.read().await;

        let used: Option<BTreeSet<&str>> = query.used_by.as_ref().map(|filter| {
            directory
                .matching_events(filter)
                .flat_map(|e| e.keywords.iter().map(String::as_str))
                .collect()
        });

        let mut keywords: Vec<Keyword> = directory
            .keywords
            .values()
            .filter(|k| used.as_ref().is_none_or(|ids| ids.contains(k.id.as_str())))
            .filter(|k| {
                query
                    .data_source
                    .as_ref()
                    .is_none_or(|ds| &k.data_source == ds)
            })
            .filter(|k| {
                query.name_prefix.as_ref().is_none_or(|p| {
                    k.text.get("name").is_some_and(|name| name.starts_with(p.as_str()))
                })
            })
            .cloned()
            .collect();
        keywords.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(page_of(keywords, page))
    }

    async fn list_languages(&self) -> LinkedEventsResult<Vec<Language>> {
        let directory = self.directory.read().await;
        let mut languages: Vec<Language> = directory.languages.values().cloned().collect();
        languages.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(languages)
    }

    async fn get_language(&self, id: &str) -> LinkedEventsResult<Option<Language>> {
        let directory = self.directory.read().await;
        Ok(directory.languages.get(id).cloned())
    }

    async fn organizations_of(&self, user_id: &str) -> LinkedEventsResult<Vec<Organization>> {
        let directory = self.directory.read().await;
        let mut organizations: Vec<Organization> = directory
            .members
            .iter()
            .filter(|(_, user)| user == user_id)
            .filter_map(|(org, _)| directory.organizations.get(org).cloned())
            .collect();
        organizations.sort_by(|a, b| a.id.cmp(&b.id));
        organizations.dedup();
        Ok(organizations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventStatus, EventTime, Position, TextColumns};
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
    }

    fn new_event(id: &str, location: Option<&str>, keywords: &[&str]) -> NewEvent {
        NewEvent {
            id: id.into(),
            data_source: "system".into(),
            publisher: "org:1".into(),
            created_time: at(1),
            fields: EventFields {
                start_time: Some(Some(EventTime { at: at(10), has_time: true })),
                location: Some(location.map(str::to_string)),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                ..Default::default()
            },
        }
    }

    fn place(id: &str, longitude: f64) -> Place {
        Place {
            id: id.into(),
            data_source: "tprek".into(),
            publisher: None,
            origin_id: None,
            position: Some(Position { longitude, latitude: 60.0 }),
            email: None,
            postal_code: None,
            last_modified_time: at(1),
            text: TextColumns::new().with("name", id),
        }
    }

    fn keyword(id: &str, name: &str) -> Keyword {
        Keyword {
            id: id.into(),
            data_source: id.split(':').next().unwrap_or_default().into(),
            origin_id: None,
            aggregate: false,
            last_modified_time: at(1),
            text: TextColumns::new().with("name", name),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_event() {
        let store = InMemoryEventStore::new();

        let created = store.create_event(new_event("system:a", None, &[])).await.unwrap();
        assert_eq!(created.id, "system:a");

        let fetched = store.get_event("system:a").await.unwrap();
        assert_eq!(fetched, Some(created));

        let duplicate = store.create_event(new_event("system:a", None, &[])).await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_sub_events_are_derived() {
        let store = InMemoryEventStore::new();
        store.create_event(new_event("system:parent", None, &[])).await.unwrap();
        let mut child = new_event("system:child", None, &[]);
        child.fields.super_event = Some(Some("system:parent".into()));
        store.create_event(child).await.unwrap();

        let parent = store.get_event("system:parent").await.unwrap().unwrap();
        assert_eq!(parent.sub_events, vec!["system:child".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_event_detaches_sub_events() {
        let store = InMemoryEventStore::new();
        store.create_event(new_event("system:parent", None, &[])).await.unwrap();
        let mut child = new_event("system:child", None, &[]);
        child.fields.super_event = Some(Some("system:parent".into()));
        store.create_event(child).await.unwrap();

        assert!(store.delete_event("system:parent").await.unwrap());
        assert!(store.get_event("system:parent").await.unwrap().is_none());
        let child = store.get_event("system:child").await.unwrap().unwrap();
        assert_eq!(child.super_event, None);

        assert!(!store.delete_event("system:parent").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_event() {
        let store = InMemoryEventStore::new();
        store.create_event(new_event("system:a", Some("tprek:1"), &["yso:p1"])).await.unwrap();

        let updated = store
            .update_event(
                "system:a",
                EventFields {
                    text: BTreeMap::from([("name_en".to_string(), Some("Gig".to_string()))]),
                    ..Default::default()
                },
                at(2),
            )
            .await
            .unwrap();

        assert_eq!(updated.location.as_deref(), Some("tprek:1"));
        assert!(updated.keywords.is_empty());
        assert_eq!(updated.text.get("name_en"), Some("Gig"));
        assert_eq!(updated.last_modified_time, at(2));

        let missing = store.update_event("system:nope", EventFields::default(), at(2)).await;
        assert!(matches!(missing, Err(LinkedEventsError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_events_counts_before_paging() {
        let store = InMemoryEventStore::new();
        for n in 0..5 {
            store.create_event(new_event(&format!("system:{n}"), None, &[])).await.unwrap();
        }

        let (events, count) = store
            .list_events(&EventFilter::default(), &Pagination { page: 2, page_size: 2 })
            .await
            .unwrap();
        assert_eq!(count, 5);
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_used_places_and_keywords() {
        let store = InMemoryEventStore::new();
        store.insert_place(place("tprek:1", 24.9)).await;
        store.insert_place(place("tprek:2", 25.0)).await;
        store.insert_keyword(keyword("yso:p1", "Musiikki")).await;
        store.insert_keyword(keyword("yso:p2", "Teatteri")).await;
        store.create_event(new_event("system:a", Some("tprek:1"), &["yso:p1"])).await.unwrap();
        let mut cancelled = new_event("system:b", Some("tprek:2"), &["yso:p2"]);
        cancelled.fields.event_status = Some(EventStatus::EventCancelled);
        store.create_event(cancelled).await.unwrap();

        let used_by = EventFilter {
            data_source: Some("system".into()),
            ..Default::default()
        };
        let (places, count) = store
            .list_places(&PlaceQuery { used_by: Some(used_by.clone()) }, &Pagination::default())
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(places[0].id, "tprek:1");

        let (all, _) = store.list_places(&PlaceQuery::default(), &Pagination::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let query = KeywordQuery {
            used_by: Some(used_by),
            name_prefix: Some("Musi".into()),
            ..Default::default()
        };
        let (keywords, _) = store.list_keywords(&query, &Pagination::default()).await.unwrap();
        assert_eq!(keywords.iter().map(|k| k.id.as_str()).collect::<Vec<_>>(), ["yso:p1"]);
    }

    #[tokio::test]
    async fn test_organizations_of() {
        let store = InMemoryEventStore::new();
        let org = Organization {
            id: "org:1".into(),
            name: "City".into(),
            data_source: "system".into(),
        };
        store.insert_organization(org.clone(), &["alice", "bob"]).await;

        assert_eq!(store.organizations_of("alice").await.unwrap(), vec![org]);
        assert!(store.organizations_of("carol").await.unwrap().is_empty());
    }
}
