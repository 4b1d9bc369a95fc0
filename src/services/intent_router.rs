use crate::services::action_dispatcher::ActionDispatcher;
use crate::services::classifier::Classifier;
use crate::services::config::HubConfig;
use crate::services::error::HubError;
use crate::services::event_store::EventStore;
use crate::services::model::{DeviceState, Intent, QueryFilter, Table};
use crate::services::publisher::Publisher;
use crate::services::query_resolver::QueryResolver;
use crate::services::time_format::TimeFormatter;
use std::sync::Arc;

const NOT_UNDERSTOOD: &str = "Sorry, I didn't understand that command.";

/// Entry point for natural-language commands. Never fails: every outcome,
/// including collaborator errors, becomes a sentence for the response topic.
pub struct IntentRouter {
    resolver: QueryResolver,
    dispatcher: ActionDispatcher,
    classifier: Arc<dyn Classifier>,
}

impl IntentRouter {
    pub fn new(
        resolver: QueryResolver,
        dispatcher: ActionDispatcher,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            resolver,
            dispatcher,
            classifier,
        }
    }

    pub fn from_config(
        config: &HubConfig,
        store: Arc<dyn EventStore>,
        publisher: Arc<dyn Publisher>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        let resolver = QueryResolver::new(
            store.clone(),
            TimeFormatter::new(config.display_tz),
            config.query_timeout,
        );
        let dispatcher = ActionDispatcher::new(
            publisher,
            store,
            config.topics.actuation.clone(),
            config.publish_timeout,
        );
        Self::new(resolver, dispatcher, classifier)
    }

    pub async fn handle_command(&self, text: &str) -> String {
        match self.classifier.classify(text).await {
            Ok(intent) => {
                tracing::info!(intent = intent.label(), "router: command classified");
                self.route(intent).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "router: classification failed");
                NOT_UNDERSTOOD.to_string()
            }
        }
    }

    pub async fn route(&self, intent: Intent) -> String {
        match intent {
            Intent::Actuate { device_id, state } => self.actuate(device_id, state).await,
            Intent::HistoryQuery {
                table,
                predicates,
                find_first,
            } => self.history(table, &predicates, find_first).await,
            Intent::Unknown => NOT_UNDERSTOOD.to_string(),
        }
    }

    async fn actuate(&self, device_id: i64, state: DeviceState) -> String {
        match self.dispatcher.dispatch(device_id, state).await {
            Ok(outcome) => {
                let mut phrase = format!(
                    "Okay, light {} is now {}.",
                    outcome.device.get(),
                    outcome.state.as_str()
                );
                if outcome.audit_warning.is_some() {
                    phrase.push_str(" I couldn't record it in the history, though.");
                }
                phrase
            }
            Err(e) => apology(&e),
        }
    }

    async fn history(&self, table: Table, predicates: &[(String, String)], find_first: bool) -> String {
        let filter = match QueryFilter::new(table, predicates, find_first) {
            Ok(filter) => filter,
            Err(e) => {
                tracing::info!(error = %e, table = table.name(), "router: rejected history query");
                return apology(&e);
            }
        };

        match self.resolver.resolve(&filter).await {
            Ok(answer) => answer.phrase,
            Err(e) => {
                tracing::warn!(error = %e, table = table.name(), "router: history lookup failed");
                apology(&e)
            }
        }
    }
}

fn apology(err: &HubError) -> String {
    match err {
        HubError::InvalidDevice(id) => {
            format!("Sorry, there is no light {id}. I can control lights 1 and 2.")
        }
        HubError::Classification(_) => NOT_UNDERSTOOD.to_string(),
        other => format!("Sorry, I couldn't complete that: {}.", other.reason()),
    }
}
