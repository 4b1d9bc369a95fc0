pub mod action_dispatcher;
pub mod classifier;
pub mod config;
pub mod error;
pub mod event_store;
pub mod intent_router;
pub mod llm_classifier;
pub mod model;
pub mod publisher;
pub mod query_resolver;
pub mod rest_store;
pub mod time_format;

#[cfg(test)]
pub(crate) mod testing;

pub use action_dispatcher::*;
pub use classifier::*;
pub use config::*;
pub use error::*;
pub use event_store::*;
pub use intent_router::*;
pub use llm_classifier::*;
pub use model::*;
pub use publisher::*;
pub use query_resolver::*;
pub use rest_store::*;
pub use time_format::*;

use sqlx::PgPool;
use std::sync::Arc;

pub fn build_event_store(backend: &StoreBackend, pool: &PgPool) -> anyhow::Result<Arc<dyn EventStore>> {
    Ok(match backend {
        StoreBackend::Postgres => Arc::new(PgEventStore::new(pool.clone())),
        StoreBackend::Rest { url, api_key } => Arc::new(RestEventStore::new(url, api_key.clone())?),
    })
}

pub fn build_classifier(backend: &ClassifierBackend) -> anyhow::Result<Arc<dyn Classifier>> {
    Ok(match backend {
        ClassifierBackend::Llm(config) => Arc::new(LlmClassifier::new(config.clone())?),
        ClassifierBackend::Keyword => Arc::new(KeywordClassifier),
    })
}
