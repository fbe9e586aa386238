use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use axum_helpers::{ErrorResponse, MaybeClaims};
use serde_json::Value;
use utoipa::OpenApi;

use crate::error::LinkedEventsResult;
use crate::models::{
    EventListParams, KeywordListParams, Page, PageMeta, PlaceListParams, SearchParams,
};
use crate::repository::EventStore;
use crate::service::LinkedEventsService;

const EVENT_TAG: &str = "event";
const KEYWORD_TAG: &str = "keyword";
const PLACE_TAG: &str = "place";
const LANGUAGE_TAG: &str = "language";
const SEARCH_TAG: &str = "search";

/// OpenAPI documentation for the events directory API
#[derive(OpenApi)]
#[openapi(
    paths(
        list_events,
        create_event,
        get_event,
        update_event,
        delete_event,
        list_keywords,
        get_keyword,
        list_places,
        get_place,
        list_languages,
        get_language,
        search,
    ),
    components(schemas(Page, PageMeta, ErrorResponse)),
    tags(
        (name = EVENT_TAG, description = "Events, filtered by time, place and keyword"),
        (name = KEYWORD_TAG, description = "Keywords attached to events"),
        (name = PLACE_TAG, description = "Event locations"),
        (name = LANGUAGE_TAG, description = "Languages events are held in"),
        (name = SEARCH_TAG, description = "Full text search and autocomplete")
    )
)]
pub struct ApiDoc;

type SharedService<S> = State<Arc<LinkedEventsService<S>>>;

/// Create the API router. Paths keep their trailing slash.
pub fn router<S: EventStore + 'static>(service: LinkedEventsService<S>) -> Router {
    let shared_service = Arc::new(service);

    Router::new()
        .route("/event/", get(list_events).post(create_event))
        .route("/event/{id}/", get(get_event).put(update_event).delete(delete_event))
        .route("/keyword/", get(list_keywords))
        .route("/keyword/{id}/", get(get_keyword))
        .route("/place/", get(list_places))
        .route("/place/{id}/", get(get_place))
        .route("/language/", get(list_languages))
        .route("/language/{id}/", get(get_language))
        .route("/search/", get(search))
        .with_state(shared_service)
}

/// List events
#[utoipa::path(
    get,
    path = "/event/",
    tag = EVENT_TAG,
    params(EventListParams),
    responses(
        (status = 200, description = "Page of events", body = Page),
        (status = 400, description = "Malformed filter", body = ErrorResponse),
        (status = 404, description = "Page out of range", body = ErrorResponse)
    )
)]
async fn list_events<S: EventStore>(
    State(service): SharedService<S>,
    Query(params): Query<HashMap<String, String>>,
) -> LinkedEventsResult<Json<Page>> {
    Ok(Json(service.list_events(&params).await?))
}

/// Create an event published by the caller's organization
#[utoipa::path(
    post,
    path = "/event/",
    tag = EVENT_TAG,
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Event created", body = serde_json::Value),
        (status = 400, description = "Invalid event", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Caller can't publish", body = ErrorResponse)
    )
)]
async fn create_event<S: EventStore>(
    State(service): SharedService<S>,
    MaybeClaims(claims): MaybeClaims,
    Json(body): Json<Value>,
) -> LinkedEventsResult<impl IntoResponse> {
    let caller = claims.as_ref().map(|c| c.sub.as_str());
    let created = service.create_event(caller, body).await?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, created.location)],
        Json(created.body),
    ))
}

/// Get an event by id
#[utoipa::path(
    get,
    path = "/event/{id}/",
    tag = EVENT_TAG,
    params(
        ("id" = String, Path, description = "Event id, e.g. `helsinki:123`"),
        ("include" = Option<String>, Query, description = "Relations to expand")
    ),
    responses(
        (status = 200, description = "Event", body = serde_json::Value),
        (status = 404, description = "Event not found", body = ErrorResponse)
    )
)]
async fn get_event<S: EventStore>(
    State(service): SharedService<S>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> LinkedEventsResult<Json<Value>> {
    Ok(Json(service.get_event(&id, &params).await?))
}

/// Update an event
#[utoipa::path(
    put,
    path = "/event/{id}/",
    tag = EVENT_TAG,
    params(("id" = String, Path, description = "Event id")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Updated event", body = serde_json::Value),
        (status = 400, description = "Invalid event", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "Event not found", body = ErrorResponse)
    )
)]
async fn update_event<S: EventStore>(
    State(service): SharedService<S>,
    MaybeClaims(claims): MaybeClaims,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> LinkedEventsResult<Json<Value>> {
    let caller = claims.as_ref().map(|c| c.sub.as_str());
    Ok(Json(service.update_event(caller, &id, body).await?))
}

/// Delete an event
#[utoipa::path(
    delete,
    path = "/event/{id}/",
    tag = EVENT_TAG,
    params(("id" = String, Path, description = "Event id")),
    responses(
        (status = 204, description = "Event deleted"),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Caller can't publish", body = ErrorResponse),
        (status = 404, description = "Event not found", body = ErrorResponse)
    )
)]
async fn delete_event<S: EventStore>(
    State(service): SharedService<S>,
    MaybeClaims(claims): MaybeClaims,
    Path(id): Path<String>,
) -> LinkedEventsResult<StatusCode> {
    let caller = claims.as_ref().map(|c| c.sub.as_str());
    service.delete_event(caller, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List keywords in use, or all of them
#[utoipa::path(
    get,
    path = "/keyword/",
    tag = KEYWORD_TAG,
    params(KeywordListParams),
    responses(
        (status = 200, description = "Page of keywords", body = Page),
        (status = 404, description = "Page out of range", body = ErrorResponse)
    )
)]
async fn list_keywords<S: EventStore>(
    State(service): SharedService<S>,
    Query(params): Query<HashMap<String, String>>,
) -> LinkedEventsResult<Json<Page>> {
    Ok(Json(service.list_keywords(&params).await?))
}

#[utoipa::path(
    get,
    path = "/keyword/{id}/",
    tag = KEYWORD_TAG,
    params(("id" = String, Path, description = "Keyword id")),
    responses(
        (status = 200, description = "Keyword", body = serde_json::Value),
        (status = 404, description = "Keyword not found", body = ErrorResponse)
    )
)]
async fn get_keyword<S: EventStore>(
    State(service): SharedService<S>,
    Path(id): Path<String>,
) -> LinkedEventsResult<Json<Value>> {
    Ok(Json(service.get_keyword(&id).await?))
}

/// List places in use, or all of them
#[utoipa::path(
    get,
    path = "/place/",
    tag = PLACE_TAG,
    params(PlaceListParams),
    responses(
        (status = 200, description = "Page of places", body = Page),
        (status = 404, description = "Page out of range", body = ErrorResponse)
    )
)]
async fn list_places<S: EventStore>(
    State(service): SharedService<S>,
    Query(params): Query<HashMap<String, String>>,
) -> LinkedEventsResult<Json<Page>> {
    Ok(Json(service.list_places(&params).await?))
}

#[utoipa::path(
    get,
    path = "/place/{id}/",
    tag = PLACE_TAG,
    params(("id" = String, Path, description = "Place id")),
    responses(
        (status = 200, description = "Place", body = serde_json::Value),
        (status = 404, description = "Place not found", body = ErrorResponse)
    )
)]
async fn get_place<S: EventStore>(
    State(service): SharedService<S>,
    Path(id): Path<String>,
) -> LinkedEventsResult<Json<Value>> {
    Ok(Json(service.get_place(&id).await?))
}

#[utoipa::path(
    get,
    path = "/language/",
    tag = LANGUAGE_TAG,
    responses(
        (status = 200, description = "Page of languages", body = Page)
    )
)]
async fn list_languages<S: EventStore>(
    State(service): SharedService<S>,
    Query(params): Query<HashMap<String, String>>,
) -> LinkedEventsResult<Json<Page>> {
    Ok(Json(service.list_languages(&params).await?))
}

#[utoipa::path(
    get,
    path = "/language/{id}/",
    tag = LANGUAGE_TAG,
    params(("id" = String, Path, description = "Language code")),
    responses(
        (status = 200, description = "Language", body = serde_json::Value),
        (status = 404, description = "Language not found", body = ErrorResponse)
    )
)]
async fn get_language<S: EventStore>(
    State(service): SharedService<S>,
    Path(id): Path<String>,
) -> LinkedEventsResult<Json<Value>> {
    Ok(Json(service.get_language(&id).await?))
}

/// Search events, places and keywords
#[utoipa::path(
    get,
    path = "/search/",
    tag = SEARCH_TAG,
    params(SearchParams),
    responses(
        (status = 200, description = "Page of hits with `object_type` and `score`", body = Page),
        (status = 400, description = "Missing or conflicting terms", body = ErrorResponse)
    )
)]
async fn search<S: EventStore>(
    State(service): SharedService<S>,
    Query(params): Query<HashMap<String, String>>,
) -> LinkedEventsResult<Json<Page>> {
    Ok(Json(service.search(&params).await?))
}
