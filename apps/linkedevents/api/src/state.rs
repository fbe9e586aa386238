//! Shared application state and service wiring.

use std::sync::Arc;

use domain_linked_events::{
    ElasticsearchIndex, InMemorySearchIndex, LinkedEventsService, PgEventStore, SearchIndex,
    SerializerRegistry,
};
use tracing::info;

use crate::config::Config;

/// State for the readiness check and shutdown cleanup.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded from environment variables
    pub config: Config,
    /// PostgreSQL connection pool, shared with the event store
    pub db: database::postgres::DatabaseConnection,
}

impl AppState {
    /// Build the events service on top of the PostgreSQL store.
    ///
    /// Without `ELASTICSEARCH_URL` the in-memory index is filled from the
    /// store once at startup.
    pub async fn linked_events_service(&self) -> eyre::Result<LinkedEventsService<PgEventStore>> {
        let store = Arc::new(PgEventStore::new(self.db.clone()));

        let search: Arc<dyn SearchIndex> = match &self.config.search.elasticsearch_url {
            Some(url) => {
                info!(url = %url, prefix = %self.config.search.index_prefix, "Using Elasticsearch index");
                Arc::new(ElasticsearchIndex::new(
                    url.clone(),
                    self.config.search.index_prefix.clone(),
                    store.clone(),
                ))
            }
            None => {
                let index = InMemorySearchIndex::new(self.config.api.languages.clone());
                index.load_from(store.as_ref()).await?;
                Arc::new(index)
            }
        };

        let service = LinkedEventsService::new(
            store,
            search,
            SerializerRegistry::standard(),
            self.config.api.service_settings(),
        )?;
        Ok(service)
    }
}
