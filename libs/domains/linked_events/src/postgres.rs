use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::sea_query::{Expr, Order, Query, SelectStatement};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, Select, TransactionTrait,
};

use crate::entity::{
    event, event_keyword, event_link, keyword, language, offer, organization,
    organization_member, place, text_from_json, text_to_json, utc,
};
use crate::error::{LinkedEventsError, LinkedEventsResult};
use crate::filter::{self, EventFilter, Recurring, SortField};
use crate::models::{
    Event, EventFields, EventStatus, Keyword, Language, NewEvent, Organization, Pagination, Place,
    Position,
};
use crate::repository::{EventStore, KeywordQuery, PlaceQuery};

/// Whole days between start and end, truncated like `Event::days_left`.
const DAYS_LEFT: &str = r#"EXTRACT(DAY FROM ("event"."end_time" - "event"."start_time"))"#;

/// PostgreSQL implementation of EventStore
///
/// Free text, bbox and duration predicates have no SQL form. Listings using
/// them filter, sort and page the SQL candidates in memory; every other
/// listing is ordered and paged by the database.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    db: DatabaseConnection,
}

impl PgEventStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn candidates(filter: &EventFilter) -> Select<event::Entity> {
        let mut query = event::Entity::find();

        if filter.only_scheduled {
            query = query.filter(event::Column::EventStatus.eq(EventStatus::EventScheduled));
        }
        if let Some(since) = filter.last_modified_since {
            query = query.filter(event::Column::LastModifiedTime.gte(since));
        }
        if let Some(start) = filter.start {
            query = query.filter(
                Condition::any()
                    .add(event::Column::EndTime.gt(start))
                    .add(event::Column::StartTime.gte(start)),
            );
        }
        if let Some(end) = filter.end {
            query = query.filter(
                Condition::any()
                    .add(event::Column::EndTime.lt(end))
                    .add(event::Column::StartTime.lte(end)),
            );
        }
        if let Some(data_source) = &filter.data_source {
            query = query.filter(event::Column::DataSource.eq(data_source.as_str()));
        }
        if let Some(locations) = &filter.locations {
            query = query.filter(event::Column::LocationId.is_in(locations.clone()));
        }
        if let Some(keywords) = &filter.keywords {
            query = query.filter(
                event::Column::Id.in_subquery(
                    Query::select()
                        .column(event_keyword::Column::EventId)
                        .from(event_keyword::Entity)
                        .and_where(event_keyword::Column::KeywordId.is_in(keywords.clone()))
                        .to_owned(),
                ),
            );
        }
        match filter.recurring {
            Some(Recurring::Super) => query = query.filter(event::Column::IsRecurringSuper.eq(true)),
            Some(Recurring::Sub) => query = query.filter(event::Column::IsRecurringSuper.eq(false)),
            None => {}
        }
        query
    }

    /// Postgres sorts nulls last ascending and first descending, the same
    /// as `SortKey::compare`.
    fn ordered(mut query: Select<event::Entity>, filter: &EventFilter) -> Select<event::Entity> {
        for key in filter.sort_keys() {
            let order = if key.descending { Order::Desc } else { Order::Asc };
            query = match key.field {
                SortField::StartTime => query.order_by(event::Column::StartTime, order),
                SortField::EndTime => query.order_by(event::Column::EndTime, order),
                SortField::LastModifiedTime => query.order_by(event::Column::LastModifiedTime, order),
                SortField::DaysLeft => query.order_by(Expr::cust(DAYS_LEFT), order),
            };
        }
        query.order_by_asc(event::Column::Id)
    }

    /// `column` of the events matching `filter`, or `None` when the filter
    /// can't be expressed in SQL.
    fn used_column(filter: &EventFilter, column: event::Column) -> Option<SelectStatement> {
        if filter.has_memory_predicates() {
            return None;
        }
        Some(
            Self::candidates(filter)
                .select_only()
                .column(column)
                .distinct()
                .into_query(),
        )
    }

    /// Candidates for `filter` with the coordinates its bbox test needs.
    async fn candidate_events(
        &self,
        filter: &EventFilter,
    ) -> LinkedEventsResult<(Vec<Event>, HashMap<String, Position>)> {
        let models = Self::candidates(filter).all(&self.db).await?;
        let events = self.hydrate(models).await?;
        let positions = self.positions(filter, &events).await?;
        Ok((events, positions))
    }

    /// Every event matching `filter`, unordered and unpaged.
    async fn matching(&self, filter: &EventFilter) -> LinkedEventsResult<Vec<Event>> {
        let (events, positions) = self.candidate_events(filter).await?;
        Ok(events
            .into_iter()
            .filter(|e| filter.matches(e, |id| positions.get(id).copied()))
            .collect())
    }

    /// Coordinates of the events' locations, when the filter needs them.
    async fn positions(
        &self,
        filter: &EventFilter,
        events: &[Event],
    ) -> LinkedEventsResult<HashMap<String, Position>> {
        if filter.bbox.is_none() {
            return Ok(HashMap::new());
        }
        let ids: BTreeSet<String> = events.iter().filter_map(|e| e.location.clone()).collect();
        Ok(self
            .get_places(&ids.into_iter().collect::<Vec<_>>())
            .await?
            .into_iter()
            .filter_map(|p| Some((p.id, p.position?)))
            .collect())
    }

    /// Attach keywords, offers, links and derived sub-events.
    async fn hydrate(&self, models: Vec<event::Model>) -> LinkedEventsResult<Vec<Event>> {
        if models.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = models.iter().map(|m| m.id.clone()).collect();

        let mut keywords: HashMap<String, Vec<String>> = HashMap::new();
        for row in event_keyword::Entity::find()
            .filter(event_keyword::Column::EventId.is_in(ids.clone()))
            .order_by_asc(event_keyword::Column::Position)
            .all(&self.db)
            .await?
        {
            keywords.entry(row.event_id).or_default().push(row.keyword_id);
        }

        let mut offers: HashMap<String, Vec<crate::models::Offer>> = HashMap::new();
        for row in offer::Entity::find()
            .filter(offer::Column::EventId.is_in(ids.clone()))
            .order_by_asc(offer::Column::Id)
            .all(&self.db)
            .await?
        {
            offers.entry(row.event_id.clone()).or_default().push(row.into());
        }

        let mut links: HashMap<String, Vec<crate::models::EventLink>> = HashMap::new();
        for row in event_link::Entity::find()
            .filter(event_link::Column::EventId.is_in(ids.clone()))
            .order_by_asc(event_link::Column::Id)
            .all(&self.db)
            .await?
        {
            links.entry(row.event_id.clone()).or_default().push(row.into());
        }

        let mut sub_events: HashMap<String, Vec<String>> = HashMap::new();
        for child in event::Entity::find()
            .filter(event::Column::SuperEventId.is_in(ids))
            .order_by_asc(event::Column::Id)
            .all(&self.db)
            .await?
        {
            if let Some(parent) = child.super_event_id {
                sub_events.entry(parent).or_default().push(child.id);
            }
        }

        Ok(models
            .into_iter()
            .map(|m| Event {
                keywords: keywords.remove(&m.id).unwrap_or_default(),
                offers: offers.remove(&m.id).unwrap_or_default(),
                external_links: links.remove(&m.id).unwrap_or_default(),
                sub_events: sub_events.remove(&m.id).unwrap_or_default(),
                id: m.id,
                data_source: m.data_source,
                publisher: m.publisher,
                origin_id: m.origin_id,
                created_time: utc(m.created_time),
                last_modified_time: utc(m.last_modified_time),
                date_published: m.date_published.map(utc),
                start_time: m.start_time.map(utc),
                end_time: m.end_time.map(utc),
                has_start_time: m.has_start_time,
                has_end_time: m.has_end_time,
                event_status: m.event_status,
                is_recurring_super: m.is_recurring_super,
                super_event: m.super_event_id,
                location: m.location_id,
                custom_data: m.custom_data,
                text: text_from_json(m.text),
            })
            .collect())
    }

    async fn load_event(&self, id: &str) -> LinkedEventsResult<Option<Event>> {
        match event::Entity::find_by_id(id.to_string()).one(&self.db).await? {
            Some(model) => Ok(self.hydrate(vec![model]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Replace the keyword, offer and link rows of `event`.
    async fn write_children<C: ConnectionTrait>(conn: &C, event: &Event) -> LinkedEventsResult<()> {
        event_keyword::Entity::delete_many()
            .filter(event_keyword::Column::EventId.eq(event.id.as_str()))
            .exec(conn)
            .await?;
        offer::Entity::delete_many()
            .filter(offer::Column::EventId.eq(event.id.as_str()))
            .exec(conn)
            .await?;
        event_link::Entity::delete_many()
            .filter(event_link::Column::EventId.eq(event.id.as_str()))
            .exec(conn)
            .await?;

        if !event.keywords.is_empty() {
            event_keyword::Entity::insert_many(event.keywords.iter().enumerate().map(|(i, k)| {
                event_keyword::ActiveModel {
                    event_id: Set(event.id.clone()),
                    keyword_id: Set(k.clone()),
                    position: Set(i as i32),
                }
            }))
            .exec(conn)
            .await?;
        }
        if !event.offers.is_empty() {
            offer::Entity::insert_many(event.offers.iter().map(|o| offer::ActiveModel {
                id: NotSet,
                event_id: Set(event.id.clone()),
                is_free: Set(o.is_free),
                text: Set(text_to_json(&o.text)),
            }))
            .exec(conn)
            .await?;
        }
        if !event.external_links.is_empty() {
            event_link::Entity::insert_many(event.external_links.iter().map(|l| event_link::ActiveModel {
                id: NotSet,
                event_id: Set(event.id.clone()),
                name: Set(l.name.clone()),
                language: Set(l.language.clone()),
                link: Set(l.link.clone()),
            }))
            .exec(conn)
            .await?;
        }
        Ok(())
    }
}

fn active_event(event: &Event) -> event::ActiveModel {
    event::ActiveModel {
        id: Set(event.id.clone()),
        data_source: Set(event.data_source.clone()),
        publisher: Set(event.publisher.clone()),
        origin_id: Set(event.origin_id.clone()),
        created_time: Set(event.created_time.into()),
        last_modified_time: Set(event.last_modified_time.into()),
        date_published: Set(event.date_published.map(Into::into)),
        start_time: Set(event.start_time.map(Into::into)),
        end_time: Set(event.end_time.map(Into::into)),
        has_start_time: Set(event.has_start_time),
        has_end_time: Set(event.has_end_time),
        event_status: Set(event.event_status),
        is_recurring_super: Set(event.is_recurring_super),
        super_event_id: Set(event.super_event.clone()),
        location_id: Set(event.location.clone()),
        custom_data: Set(event.custom_data.clone()),
        text: Set(text_to_json(&event.text)),
    }
}

async fn page_of<E, M>(
    query: Select<E>,
    db: &DatabaseConnection,
    page: &Pagination,
) -> LinkedEventsResult<(Vec<M>, u64)>
where
    E: EntityTrait<Model = M>,
    M: sea_orm::FromQueryResult + Send + Sync,
{
    let count = query.clone().count(db).await?;
    let items = query
        .offset(page.offset())
        .limit(page.page_size)
        .all(db)
        .await?;
    Ok((items, count))
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn list_events(
        &self,
        filter: &EventFilter,
        page: &Pagination,
    ) -> LinkedEventsResult<(Vec<Event>, u64)> {
        if filter.has_memory_predicates() {
            let (events, positions) = self.candidate_events(filter).await?;
            return Ok(filter::apply(events, filter, page, |id| positions.get(id).copied()));
        }

        let query = Self::ordered(Self::candidates(filter), filter);
        let (models, count) = page_of(query, &self.db, page).await?;
        Ok((self.hydrate(models).await?, count))
    }

    async fn get_event(&self, id: &str) -> LinkedEventsResult<Option<Event>> {
        self.load_event(id).await
    }

    async fn get_events(&self, ids: &[String]) -> LinkedEventsResult<Vec<Event>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let models = event::Entity::find()
            .filter(event::Column::Id.is_in(ids.to_vec()))
            .all(&self.db)
            .await?;
        let mut events = self.hydrate(models).await?;
        events.sort_by_key(|e| ids.iter().position(|id| id == &e.id));
        Ok(events)
    }

    async fn create_event(&self, new_event: NewEvent) -> LinkedEventsResult<Event> {
        let event = new_event.into_event();

        let txn = self.db.begin().await?;
        active_event(&event).insert(&txn).await?;
        Self::write_children(&txn, &event).await?;
        txn.commit().await?;

        tracing::info!(event_id = %event.id, publisher = %event.publisher, "Created event");
        Ok(event)
    }

    async fn update_event(
        &self,
        id: &str,
        fields: EventFields,
        modified: DateTime<Utc>,
    ) -> LinkedEventsResult<Event> {
        let mut event = self
            .load_event(id)
            .await?
            .ok_or_else(|| LinkedEventsError::NotFound {
                kind: "Event",
                id: id.to_string(),
            })?;
        event.apply_update(fields, modified);

        let txn = self.db.begin().await?;
        active_event(&event).update(&txn).await?;
        Self::write_children(&txn, &event).await?;
        txn.commit().await?;

        tracing::info!(event_id = %id, "Updated event");
        Ok(event)
    }

    /// Child rows go with the event through `ON DELETE CASCADE`; sub-events
    /// are detached by `ON DELETE SET NULL`.
    async fn delete_event(&self, id: &str) -> LinkedEventsResult<bool> {
        let result = event::Entity::delete_by_id(id.to_string())
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Ok(false);
        }

        tracing::info!(event_id = %id, "Deleted event");
        Ok(true)
    }

    async fn get_place(&self, id: &str) -> LinkedEventsResult<Option<Place>> {
        Ok(place::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .map(Into::into))
    }

    async fn get_places(&self, ids: &[String]) -> LinkedEventsResult<Vec<Place>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let models = place::Entity::find()
            .filter(place::Column::Id.is_in(ids.to_vec()))
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn list_places(
        &self,
        query: &PlaceQuery,
        page: &Pagination,
    ) -> LinkedEventsResult<(Vec<Place>, u64)> {
        let mut select = place::Entity::find().order_by_asc(place::Column::Id);
        if let Some(filter) = &query.used_by {
            select = match Self::used_column(filter, event::Column::LocationId) {
                Some(used) => select.filter(place::Column::Id.in_subquery(used)),
                None => {
                    let used: BTreeSet<String> = self
                        .matching(filter)
                        .await?
                        .into_iter()
                        .filter_map(|e| e.location)
                        .collect();
                    select.filter(place::Column::Id.is_in(used))
                }
            };
        }

        let (models, count) = page_of(select, &self.db, page).await?;
        Ok((models.into_iter().map(Into::into).collect(), count))
    }

    async fn get_keyword(&self, id: &str) -> LinkedEventsResult<Option<Keyword>> {
        Ok(keyword::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .map(Into::into))
    }

    async fn get_keywords(&self, ids: &[String]) -> LinkedEventsResult<Vec<Keyword>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let models = keyword::Entity::find()
            .filter(keyword::Column::Id.is_in(ids.to_vec()))
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn list_keywords(
        &self,
        query: &KeywordQuery,
        page: &Pagination,
    ) -> LinkedEventsResult<(Vec<Keyword>, u64)> {
        let mut select = keyword::Entity::find().order_by_asc(keyword::Column::Id);
        if let Some(filter) = &query.used_by {
            select = match Self::used_column(filter, event::Column::Id) {
                Some(events) => select.filter(
                    keyword::Column::Id.in_subquery(
                        Query::select()
                            .distinct()
                            .column(event_keyword::Column::KeywordId)
                            .from(event_keyword::Entity)
                            .and_where(event_keyword::Column::EventId.in_subquery(events))
                            .to_owned(),
                    ),
                ),
                None => {
                    let used: BTreeSet<String> = self
                        .matching(filter)
                        .await?
                        .into_iter()
                        .flat_map(|e| e.keywords)
                        .collect();
                    select.filter(keyword::Column::Id.is_in(used))
                }
            };
        }
        if let Some(data_source) = &query.data_source {
            select = select.filter(keyword::Column::DataSource.eq(data_source.as_str()));
        }
        if let Some(prefix) = &query.name_prefix {
            select = select.filter(keyword::Column::Name.starts_with(prefix.as_str()));
        }

        let (models, count) = page_of(select, &self.db, page).await?;
        Ok((models.into_iter().map(Into::into).collect(), count))
    }

    async fn list_languages(&self) -> LinkedEventsResult<Vec<Language>> {
        let models = language::Entity::find()
            .order_by_asc(language::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn get_language(&self, id: &str) -> LinkedEventsResult<Option<Language>> {
        Ok(language::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .map(Into::into))
    }

    async fn organizations_of(&self, user_id: &str) -> LinkedEventsResult<Vec<Organization>> {
        let memberships = organization_member::Entity::find()
            .filter(organization_member::Column::UserId.eq(user_id))
            .all(&self.db)
            .await?;
        if memberships.is_empty() {
            return Ok(Vec::new());
        }

        let models = organization::Entity::find()
            .filter(
                organization::Column::Id
                    .is_in(memberships.into_iter().map(|m| m.organization_id)),
            )
            .order_by_asc(organization::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }
}
