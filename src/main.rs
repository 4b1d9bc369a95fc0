use forge::prelude::*;
use std::sync::Arc;

mod functions;
mod schema;
mod services;

static HUB_CONFIG: tokio::sync::OnceCell<services::HubConfig> = tokio::sync::OnceCell::const_new();

static CLASSIFIER: tokio::sync::OnceCell<Arc<dyn services::Classifier>> =
    tokio::sync::OnceCell::const_new();

pub fn get_hub_config() -> Result<&'static services::HubConfig> {
    HUB_CONFIG
        .get()
        .ok_or_else(|| ForgeError::Internal("hub config not initialized".to_string()))
}

pub fn get_classifier() -> Result<Arc<dyn services::Classifier>> {
    CLASSIFIER
        .get()
        .cloned()
        .ok_or_else(|| ForgeError::Internal("classifier not initialized".to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let hub_config = services::HubConfig::from_env()
        .map_err(|e| ForgeError::Internal(format!("invalid hub configuration: {e:#}")))?;
    let classifier = services::build_classifier(&hub_config.classifier)
        .map_err(|e| ForgeError::Internal(format!("failed to create classifier: {e:#}")))?;
    tracing::info!(
        display_tz = %hub_config.display_tz,
        command_topic = %hub_config.topics.command,
        "hub configured"
    );
    HUB_CONFIG.set(hub_config).ok();
    CLASSIFIER.set(classifier).ok();

    let config = ForgeConfig::from_file("forge.toml")?;
    let mut builder = Forge::builder();

    let fns = builder.function_registry_mut();
    fns.register_query::<functions::ListSensorReadingsQuery>();
    fns.register_query::<functions::ListAccessLogsQuery>();
    fns.register_query::<functions::ListEventsQuery>();
    fns.register_query::<functions::ListOutboxQuery>();
    fns.register_query::<functions::GetHealthQuery>();

    let daemons = builder.daemon_registry_mut();
    daemons.register::<functions::BusDaemon>();

    builder.config(config).build()?.run().await
}
