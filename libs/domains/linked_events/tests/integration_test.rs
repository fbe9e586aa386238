//! Integration tests for the PostgreSQL event store
//!
//! These run against a real PostgreSQL started through testcontainers, with
//! the schema from `manifests/migrations/linkedevents`.

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, TimeZone, Utc};
use domain_linked_events::filter::SortKey;
use domain_linked_events::models::EventTime;
use domain_linked_events::*;
use test_utils::{TestDataBuilder, TestDatabase, assertions::*};

const SEED: &str = r#"
INSERT INTO place (id, data_source, longitude, latitude, text)
VALUES ('tprek:1', 'tprek', 24.94, 60.17, '{"name_fi": "Kirjasto", "name_en": "Library"}');
INSERT INTO place (id, data_source, text)
VALUES ('tprek:2', 'tprek', '{"name_fi": "Halli"}');

INSERT INTO keyword (id, data_source, name, text)
VALUES ('yso:p1808', 'yso', 'musiikki', '{"name_fi": "musiikki", "name_en": "music"}');
INSERT INTO keyword (id, data_source, name, text)
VALUES ('yso:p1235', 'yso', 'elokuvat', '{"name_fi": "elokuvat"}');

INSERT INTO language (id, text) VALUES ('fi', '{"name_fi": "suomi"}');

INSERT INTO organization (id, name, data_source) VALUES ('org:1', 'City', 'helsinki');
INSERT INTO organization_member (organization_id, user_id) VALUES ('org:1', 'alice');
"#;

async fn seeded_store() -> (TestDatabase, PgEventStore) {
    let db = TestDatabase::new().await;
    db.seed(SEED).await;
    let store = PgEventStore::new(db.connection());
    (db, store)
}

fn new_event(id: String, start_in_days: i64, keywords: &[&str]) -> NewEvent {
    let now = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();
    let start = now + Duration::days(start_in_days);

    let mut text = BTreeMap::new();
    text.insert("name_fi".to_string(), Some("Konsertti".to_string()));
    text.insert("name_en".to_string(), Some("Concert".to_string()));

    NewEvent {
        id,
        data_source: "helsinki".to_string(),
        publisher: "org:1".to_string(),
        created_time: now,
        fields: EventFields {
            start_time: Some(Some(EventTime { at: start, has_time: true })),
            end_time: Some(Some(EventTime {
                at: start + Duration::hours(2),
                has_time: true,
            })),
            location: Some(Some("tprek:1".to_string())),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            offers: Some(vec![Offer {
                is_free: true,
                text: TextColumns::default(),
            }]),
            external_links: Some(vec![EventLink {
                name: "extlink_facebook".to_string(),
                language: "fi".to_string(),
                link: "https://example.org/event".to_string(),
            }]),
            text,
            ..Default::default()
        },
    }
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_create_and_get_event() {
    let (_db, store) = seeded_store().await;
    let builder = TestDataBuilder::from_test_name("create_and_get_event");
    let id = builder.id("helsinki", "1");

    let created = store
        .create_event(new_event(id.clone(), 3, &["yso:p1808", "yso:p1235"]))
        .await
        .unwrap();
    assert_eq!(created.id, id);

    let stored = assert_some(store.get_event(&id).await.unwrap(), "event should exist");
    assert_eq!(stored.location.as_deref(), Some("tprek:1"));
    assert_eq!(stored.keywords, vec!["yso:p1808", "yso:p1235"]);
    assert_eq!(stored.offers.len(), 1);
    assert!(stored.offers[0].is_free);
    assert_eq!(stored.external_links.len(), 1);
    assert_eq!(stored.text.get("name_en"), Some("Concert"));
    assert!(stored.has_start_time);
}

#[tokio::test]
async fn test_update_replaces_children() {
    let (_db, store) = seeded_store().await;
    let builder = TestDataBuilder::from_test_name("update_replaces_children");
    let id = builder.id("helsinki", "1");
    store
        .create_event(new_event(id.clone(), 3, &["yso:p1808"]))
        .await
        .unwrap();

    let modified = Utc.with_ymd_and_hms(2030, 1, 2, 8, 0, 0).unwrap();
    let mut text = BTreeMap::new();
    text.insert("name_fi".to_string(), Some("Elokuvailta".to_string()));
    let fields = EventFields {
        keywords: vec!["yso:p1235".to_string()],
        offers: Some(vec![]),
        location: Some(Some("tprek:2".to_string())),
        text,
        ..Default::default()
    };

    let updated = store.update_event(&id, fields, modified).await.unwrap();
    assert_eq!(updated.keywords, vec!["yso:p1235"]);
    assert!(updated.offers.is_empty());
    assert_eq!(updated.external_links.len(), 1);
    assert_eq!(updated.location.as_deref(), Some("tprek:2"));
    assert_eq!(updated.text.get("name_fi"), Some("Elokuvailta"));
    assert_eq!(updated.text.get("name_en"), Some("Concert"));
    assert_eq!(updated.last_modified_time, modified);
}

#[tokio::test]
async fn test_delete_event_cascades_and_detaches_sub_events() {
    let (_db, store) = seeded_store().await;
    let builder = TestDataBuilder::from_test_name("delete_event");
    let parent = builder.id("helsinki", "parent");
    let child = builder.id("helsinki", "child");

    store
        .create_event(new_event(parent.clone(), 3, &["yso:p1808"]))
        .await
        .unwrap();
    let mut sub = new_event(child.clone(), 3, &[]);
    sub.fields.super_event = Some(Some(parent.clone()));
    store.create_event(sub).await.unwrap();

    assert!(store.delete_event(&parent).await.unwrap());
    assert!(store.get_event(&parent).await.unwrap().is_none());

    let orphan = assert_some(store.get_event(&child).await.unwrap(), "sub-event should survive");
    assert_eq!(orphan.super_event, None);

    let used_keywords = KeywordQuery {
        used_by: Some(EventFilter::default()),
        ..Default::default()
    };
    let (keywords, _) = store
        .list_keywords(&used_keywords, &Pagination::default())
        .await
        .unwrap();
    assert!(keywords.is_empty());

    assert!(!store.delete_event(&parent).await.unwrap());
}

#[tokio::test]
async fn test_list_events_filters_in_sql_and_memory() {
    let (_db, store) = seeded_store().await;
    let builder = TestDataBuilder::from_test_name("list_events");
    store
        .create_event(new_event(builder.id("helsinki", "soon"), 1, &["yso:p1808"]))
        .await
        .unwrap();
    store
        .create_event(new_event(builder.id("helsinki", "later"), 30, &["yso:p1235"]))
        .await
        .unwrap();

    let filter = EventFilter {
        keywords: Some(vec!["yso:p1808".to_string()]),
        ..Default::default()
    };
    let (events, count) = store.list_events(&filter, &Pagination::default()).await.unwrap();
    assert_eq!(count, 1);
    assert_eq!(events[0].id, builder.id("helsinki", "soon"));

    let window = EventFilter {
        start: Some(Utc.with_ymd_and_hms(2030, 1, 20, 0, 0, 0).unwrap()),
        ..Default::default()
    };
    let (events, count) = store.list_events(&window, &Pagination::default()).await.unwrap();
    assert_eq!(count, 1);
    assert_eq!(events[0].id, builder.id("helsinki", "later"));

    let paged = Pagination { page: 2, page_size: 1 };
    let (events, count) = store
        .list_events(&EventFilter::default(), &paged)
        .await
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(events.len(), 1);

    let by_start = EventFilter {
        sort: SortKey::parse_list("-start_time"),
        ..Default::default()
    };
    let first = Pagination { page: 1, page_size: 1 };
    let (events, count) = store.list_events(&by_start, &first).await.unwrap();
    assert_eq!(count, 2);
    assert_eq!(events[0].id, builder.id("helsinki", "later"));
    assert_eq!(events[0].keywords, vec!["yso:p1235"]);

    let by_text = EventFilter {
        text: Some("concert".to_string()),
        sort: SortKey::parse_list("start_time"),
        ..Default::default()
    };
    let (events, count) = store.list_events(&by_text, &first).await.unwrap();
    assert_eq!(count, 2);
    assert_eq!(events[0].id, builder.id("helsinki", "soon"));
}

// ============================================================================
// Places, keywords and organizations
// ============================================================================

#[tokio::test]
async fn test_used_places_and_keywords() {
    let (_db, store) = seeded_store().await;
    let builder = TestDataBuilder::from_test_name("used_records");
    store
        .create_event(new_event(builder.id("helsinki", "1"), 1, &["yso:p1808"]))
        .await
        .unwrap();

    let all_places = PlaceQuery::default();
    let (_, count) = store.list_places(&all_places, &Pagination::default()).await.unwrap();
    assert_eq!(count, 2);

    let used_places = PlaceQuery {
        used_by: Some(EventFilter::default()),
    };
    let (places, count) = store.list_places(&used_places, &Pagination::default()).await.unwrap();
    assert_eq!(count, 1);
    assert_eq!(places[0].id, "tprek:1");
    assert!(places[0].position.is_some());

    let used_keywords = KeywordQuery {
        used_by: Some(EventFilter::default()),
        ..Default::default()
    };
    let (keywords, _) = store
        .list_keywords(&used_keywords, &Pagination::default())
        .await
        .unwrap();
    assert_eq!(keywords.len(), 1);
    assert_eq!(keywords[0].id, "yso:p1808");

    let by_prefix = KeywordQuery {
        name_prefix: Some("elo".to_string()),
        ..Default::default()
    };
    let (keywords, _) = store.list_keywords(&by_prefix, &Pagination::default()).await.unwrap();
    assert_eq!(keywords.len(), 1);
    assert_eq!(keywords[0].id, "yso:p1235");
}

#[tokio::test]
async fn test_organizations_and_languages() {
    let (_db, store) = seeded_store().await;

    let orgs = store.organizations_of("alice").await.unwrap();
    assert_eq!(orgs.len(), 1);
    assert_eq!(orgs[0].id, "org:1");
    assert!(store.organizations_of("mallory").await.unwrap().is_empty());

    let languages = store.list_languages().await.unwrap();
    assert_eq!(languages.len(), 1);
    assert!(store.get_language("fi").await.unwrap().is_some());
    assert!(store.get_language("de").await.unwrap().is_none());
}

#[tokio::test]
async fn test_event_with_missing_place_is_rejected() {
    let (_db, store) = seeded_store().await;
    let builder = TestDataBuilder::from_test_name("missing_place");

    let mut event = new_event(builder.id("helsinki", "1"), 1, &[]);
    event.fields.location = Some(Some("tprek:404".to_string()));

    let result = store.create_event(event).await;
    assert!(matches!(result, Err(LinkedEventsError::Database(_))));
    assert!(store
        .get_event(&builder.id("helsinki", "1"))
        .await
        .unwrap()
        .is_none());
}
