use crate::services::llm_classifier::LlmClassifierConfig;
use anyhow::Context;
use chrono_tz::Tz;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub command: String,
    pub response: String,
    pub actuation: String,
    pub light: String,
    pub rain: String,
    pub door: String,
}

#[derive(Debug, Clone)]
pub enum StoreBackend {
    Postgres,
    Rest { url: String, api_key: String },
}

#[derive(Debug, Clone)]
pub enum ClassifierBackend {
    Llm(LlmClassifierConfig),
    Keyword,
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub topics: Topics,
    pub query_timeout: Duration,
    pub publish_timeout: Duration,
    pub display_tz: Tz,
    pub store: StoreBackend,
    pub classifier: ClassifierBackend,
}

impl HubConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let text = |key: &str, default: &str| {
            var(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let required = |key: &str, needed_for: &str| {
            var(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{key} must be set when {needed_for}"))
        };
        let millis = |key: &str, default: u64| -> anyhow::Result<Duration> {
            match var(key) {
                None => Ok(Duration::from_millis(default)),
                Some(raw) => {
                    let ms: u64 = raw
                        .trim()
                        .parse()
                        .with_context(|| format!("{key}: `{raw}` is not a number of milliseconds"))?;
                    anyhow::ensure!(ms > 0, "{key} must be greater than zero");
                    Ok(Duration::from_millis(ms))
                }
            }
        };

        let topics = Topics {
            command: text("HOMEHUB_TOPIC_COMMAND", "home/commands/natural"),
            response: text("HOMEHUB_TOPIC_RESPONSE", "home/ai/response"),
            actuation: text("HOMEHUB_TOPIC_ACTUATION", "home/lights/voice"),
            light: text("HOMEHUB_TOPIC_LIGHT", "esp32/sensors/light"),
            rain: text("HOMEHUB_TOPIC_RAIN", "esp32/sensors/rain"),
            door: text("HOMEHUB_TOPIC_DOOR", "esp32/events/door"),
        };

        let tz_name = text("HOMEHUB_DISPLAY_TZ", "UTC");
        let display_tz: Tz = tz_name
            .parse()
            .map_err(|e| anyhow::anyhow!("HOMEHUB_DISPLAY_TZ: {e}"))?;

        let store = match text("HOMEHUB_STORE", "postgres").as_str() {
            "postgres" => StoreBackend::Postgres,
            "rest" => StoreBackend::Rest {
                url: required("SUPABASE_URL", "HOMEHUB_STORE=rest")?,
                api_key: required("SUPABASE_KEY", "HOMEHUB_STORE=rest")?,
            },
            other => anyhow::bail!("HOMEHUB_STORE: unknown backend `{other}` (expected postgres or rest)"),
        };

        let classifier = match text("HOMEHUB_CLASSIFIER", "llm").as_str() {
            "llm" => ClassifierBackend::Llm(LlmClassifierConfig {
                api_key: required("OPENROUTER_API_KEY", "HOMEHUB_CLASSIFIER=llm")?,
                model: required("OPENROUTER_MODEL", "HOMEHUB_CLASSIFIER=llm")?,
            }),
            "keyword" => ClassifierBackend::Keyword,
            other => anyhow::bail!("HOMEHUB_CLASSIFIER: unknown classifier `{other}` (expected llm or keyword)"),
        };

        Ok(Self {
            topics,
            query_timeout: millis("HOMEHUB_QUERY_TIMEOUT_MS", 5000)?,
            publish_timeout: millis("HOMEHUB_PUBLISH_TIMEOUT_MS", 3000)?,
            display_tz,
            store,
            classifier,
        })
    }
}
