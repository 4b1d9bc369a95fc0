use crate::services::classifier::Classifier;
use crate::services::error::{HubError, HubResult};
use crate::services::model::{DeviceState, Intent, Table};
use serde::{Deserialize, Serialize};

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(20);
const MAX_RETRIES: u32 = 2;
const INTENT_TOOL_NAME: &str = "home_intent";

#[derive(Debug, Clone)]
pub struct LlmClassifierConfig {
    pub api_key: String,
    pub model: String,
}

pub struct LlmClassifier {
    client: reqwest::Client,
    config: LlmClassifierConfig,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    tools: Vec<ToolDefinition>,
    tool_choice: serde_json::Value,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ToolDefinition {
    #[serde(rename = "type")]
    kind: String,
    function: ToolFunction,
}

#[derive(Serialize)]
struct ToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Deserialize)]
struct ToolCall {
    #[serde(rename = "type")]
    kind: String,
    function: FunctionCall,
}

#[derive(Debug, Clone, Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct UsageInfo {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct LlmIntent {
    intent: String,
    #[serde(default)]
    device: Option<i64>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    predicates: Vec<LlmPredicate>,
    #[serde(default)]
    find_first: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct LlmPredicate {
    field: String,
    value: String,
}

impl LlmClassifier {
    pub fn new(config: LlmClassifierConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    async fn classify_with_retries(&self, text: &str) -> anyhow::Result<Intent> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            temperature: 0.1,
            max_tokens: 512,
            tools: vec![intent_tool_definition()],
            tool_choice: serde_json::json!({
                "type": "function",
                "function": { "name": INTENT_TOOL_NAME }
            }),
        };

        let mut last_error = anyhow::anyhow!("no classification attempt made");

        for attempt in 0..=MAX_RETRIES {
            match self.send_request(&request).await {
                Ok(message) => match decode_message(&message) {
                    Ok(intent) => {
                        tracing::info!(attempt, intent = intent.label(), "classifier responded");
                        return Ok(intent);
                    }
                    Err(err) => {
                        tracing::warn!(attempt, error = %err, "classifier reply unusable, retrying");
                        last_error = err;
                        if attempt < MAX_RETRIES {
                            tokio::time::sleep(retry_backoff(attempt)).await;
                        }
                    }
                },
                Err(err) if attempt < MAX_RETRIES && is_retryable(&err) => {
                    tracing::warn!(attempt, error = %err, "classifier request failed, retrying");
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    last_error = err;
                }
                Err(err) => {
                    last_error = err;
                    break;
                }
            }
        }

        Err(last_error)
    }

    async fn send_request(&self, request: &ChatRequest) -> anyhow::Result<ChoiceMessage> {
        let response = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenRouter returned {status}: {body}");
        }

        let body = response.text().await?;
        let chat_response: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            anyhow::anyhow!("failed to parse OpenRouter response: {e}\nraw: {body}")
        })?;
        if let Some(usage) = &chat_response.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "classifier token usage"
            );
        }

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| anyhow::anyhow!("no choices in LLM response"))
    }
}

#[async_trait::async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, text: &str) -> HubResult<Intent> {
        self.classify_with_retries(text).await.map_err(|e| {
            tracing::error!(error = %e, "classifier failed after retries");
            HubError::Classification(e.to_string())
        })
    }
}

fn retry_backoff(attempt: u32) -> std::time::Duration {
    std::time::Duration::from_millis(500 * 2u64.pow(attempt))
}

fn decode_message(message: &ChoiceMessage) -> anyhow::Result<Intent> {
    let payload = extract_payload(message)?;
    parse_intent(&payload)
}

fn is_retryable(err: &anyhow::Error) -> bool {
    let msg = err.to_string();
    msg.contains("429")
        || msg.contains("500")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("timeout")
        || msg.contains("connection")
        || msg.contains("failed to parse")
}

fn intent_tool_definition() -> ToolDefinition {
    ToolDefinition {
        kind: "function".to_string(),
        function: ToolFunction {
            name: INTENT_TOOL_NAME.to_string(),
            description: "Return the structured intent of a smart-home command.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "intent": {
                        "type": "string",
                        "enum": ["actuate", "history_query", "unknown"]
                    },
                    "device": { "type": "integer" },
                    "state": { "type": "string", "enum": ["on", "off"] },
                    "table": {
                        "type": "string",
                        "enum": ["sensor_readings", "access_logs"]
                    },
                    "predicates": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "field": {
                                    "type": "string",
                                    "enum": ["sensor_type", "sensor_value", "event_source"]
                                },
                                "value": { "type": "string" }
                            },
                            "required": ["field", "value"],
                            "additionalProperties": false
                        }
                    },
                    "find_first": { "type": "boolean" }
                },
                "required": ["intent"],
                "additionalProperties": false
            }),
        },
    }
}

const SYSTEM_PROMPT: &str = r#"You are a smart home assistant. Call the `home_intent` function exactly once to describe the user's command.

Devices: two lights. "bulb one", "light one", "the first light" are device 1. "bulb two", "light two", "the second light" are device 2.

Intents:
- {"intent":"actuate","device":1,"state":"on"} - switch a light on or off.
- {"intent":"history_query","table":"sensor_readings","predicates":[{"field":"sensor_type","value":"rain"},{"field":"sensor_value","value":"raining"}],"find_first":false} - ask when something happened.
- {"intent":"unknown"} - anything else.

History vocabulary:
- sensor_readings: sensor_type is "light" or "rain"; sensor_value is "dark", "bright", "raining" or "dry".
- access_logs: event_source is "opened_by_pir" (door opened by the motion sensor), or "voice_led_<1|2>_<on|off>" (a light switched by voice).

Set find_first to true only when the user asks for the first time something happened. "last time", "most recent" and plain "when" questions use false.
Never invent devices, fields or values outside this list; use "unknown" instead."#;

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

fn extract_payload(message: &ChoiceMessage) -> anyhow::Result<String> {
    if let Some(call) = message
        .tool_calls
        .iter()
        .find(|call| call.kind == "function" && call.function.name == INTENT_TOOL_NAME)
    {
        return Ok(call.function.arguments.clone());
    }

    message
        .content
        .as_deref()
        .map(strip_code_fence)
        .filter(|content| !content.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| anyhow::anyhow!("no content or tool call in LLM response"))
}

fn parse_intent(payload: &str) -> anyhow::Result<Intent> {
    let raw: LlmIntent = serde_json::from_str(payload)
        .map_err(|e| anyhow::anyhow!("failed to parse intent JSON: {e}\nraw: {payload}"))?;

    match raw.intent.as_str() {
        "actuate" => {
            let device_id = raw
                .device
                .ok_or_else(|| anyhow::anyhow!("actuate intent without device"))?;
            let state = match raw.state.as_deref() {
                Some("on" | "turn_on") => DeviceState::On,
                Some("off" | "turn_off") => DeviceState::Off,
                other => anyhow::bail!("actuate intent with state {other:?}"),
            };
            Ok(Intent::Actuate { device_id, state })
        }
        "history_query" => {
            let table = raw
                .table
                .as_deref()
                .and_then(Table::from_name)
                .ok_or_else(|| anyhow::anyhow!("history query with table {:?}", raw.table))?;
            Ok(Intent::HistoryQuery {
                table,
                predicates: raw
                    .predicates
                    .into_iter()
                    .map(|p| (p.field, p.value))
                    .collect(),
                find_first: raw.find_first.unwrap_or(false),
            })
        }
        "unknown" => Ok(Intent::Unknown),
        other => anyhow::bail!("unknown intent: {other}"),
    }
}
