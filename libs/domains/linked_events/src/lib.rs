//! Linked Events Domain
//!
//! JSON-LD REST API over a directory of events, places, keywords and
//! languages.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  ← HTTP endpoints under /event/, /place/, /keyword/, ...
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Service   │  ← Query parsing, authorization, JSON-LD rendering
//! └──┬───────┬──┘
//!    │       │
//! ┌──▼───┐ ┌─▼──────┐
//! │Store │ │ Search │  ← Storage and search backends (trait + implementations)
//! └──┬───┘ └────────┘
//!    │
//! ┌──▼──────────┐
//! │   Models    │  ← Records, translated columns, pagination
//! └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use domain_linked_events::{
//!     handlers, InMemoryEventStore, InMemorySearchIndex, LanguageSet, LinkedEventsService,
//!     SerializerRegistry, ServiceSettings,
//! };
//!
//! # fn build() -> Result<(), domain_linked_events::LinkedEventsError> {
//! let settings = ServiceSettings {
//!     languages: LanguageSet::default(),
//!     time_zone: chrono_tz::Europe::Helsinki,
//!     base_url: "http://localhost:8080/v1".into(),
//!     camelcase: false,
//! };
//! let service = LinkedEventsService::new(
//!     Arc::new(InMemoryEventStore::new()),
//!     Arc::new(InMemorySearchIndex::new(settings.languages.clone())),
//!     SerializerRegistry::standard(),
//!     settings,
//! )?;
//!
//! let router = handlers::router(service);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod entity;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod ids;
pub mod jsonld;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod search;
pub mod serializer;
pub mod service;
pub mod translation;

// Re-export commonly used types
pub use error::{LinkedEventsError, LinkedEventsResult};
pub use filter::EventFilter;
pub use handlers::ApiDoc;
pub use models::{
    Event, EventFields, EventLink, EventStatus, EventTime, Keyword, Language, NewEvent, Offer,
    Organization, Page, PageMeta, Pagination, Place, Position, TextColumns,
};
pub use postgres::PgEventStore;
pub use repository::{EventStore, InMemoryEventStore, KeywordQuery, PlaceQuery};
pub use search::{
    ElasticsearchIndex, InMemorySearchIndex, SearchEntity, SearchIndex, SerializerRegistry,
};
pub use service::{Created, LinkedEventsService, ServiceSettings};
pub use translation::LanguageSet;
