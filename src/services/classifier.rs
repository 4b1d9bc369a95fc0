use crate::services::error::HubResult;
use crate::services::model::{DeviceState, Intent, Table};

/// Maps free text to a structured intent. Implementations may call out to a
/// model; the router only ever sees the closed `Intent` enum.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> HubResult<Intent>;
}

/// Offline classifier for a handful of fixed phrasings.
pub struct KeywordClassifier;

#[async_trait::async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> HubResult<Intent> {
        Ok(classify_keywords(text))
    }
}

fn pair(field: &str, value: &str) -> (String, String) {
    (field.to_string(), value.to_string())
}

fn device_number(tokens: &[&str], allow_ordinals: bool) -> Option<i64> {
    if let Some(n) = tokens.iter().find_map(|t| t.parse::<i64>().ok()) {
        return Some(n);
    }
    tokens.iter().find_map(|t| match *t {
        "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "first" if allow_ordinals => Some(1),
        "second" if allow_ordinals => Some(2),
        _ => None,
    })
}

pub fn classify_keywords(text: &str) -> Intent {
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let has = |word: &str| tokens.contains(&word);
    let mentions_light = has("light") || has("bulb") || has("lamp") || has("led");
    let switch_state = if has("off") {
        Some(DeviceState::Off)
    } else if has("on") {
        Some(DeviceState::On)
    } else {
        None
    };

    let is_question = has("when") || lower.contains("last time") || lower.contains("first time");
    if is_question {
        let find_first = has("first");
        let history = |table: Table, predicates: Vec<(String, String)>| Intent::HistoryQuery {
            table,
            predicates,
            find_first,
        };

        if has("door") || has("motion") || has("opened") {
            return history(Table::AccessLog, vec![pair("event_source", "opened_by_pir")]);
        }
        if mentions_light
            && let (Some(state), Some(device)) = (switch_state, device_number(&tokens, false))
        {
            let source = format!("voice_led_{device}_{}", state.as_str());
            return history(Table::AccessLog, vec![pair("event_source", &source)]);
        }
        if has("rain") || has("raining") || has("rained") {
            return history(
                Table::SensorReading,
                vec![pair("sensor_type", "rain"), pair("sensor_value", "raining")],
            );
        }
        if has("dry") {
            return history(
                Table::SensorReading,
                vec![pair("sensor_type", "rain"), pair("sensor_value", "dry")],
            );
        }
        if has("dark") {
            return history(
                Table::SensorReading,
                vec![pair("sensor_type", "light"), pair("sensor_value", "dark")],
            );
        }
        if has("bright") {
            return history(
                Table::SensorReading,
                vec![pair("sensor_type", "light"), pair("sensor_value", "bright")],
            );
        }
        return Intent::Unknown;
    }

    if mentions_light
        && let (Some(state), Some(device_id)) = (switch_state, device_number(&tokens, true))
    {
        return Intent::Actuate { device_id, state };
    }

    Intent::Unknown
}
