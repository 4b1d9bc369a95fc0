use crate::services::error::{HubError, HubResult};
use crate::services::event_store::EventStore;
use crate::services::model::{EventRecord, Intent, QueryFilter, Table};
use crate::services::publisher::Publisher;
use crate::services::time_format::Clock;
use crate::services::Classifier;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn record(table: Table, created_at: DateTime<Utc>, attrs: &[(&str, &str)]) -> EventRecord {
    EventRecord {
        table,
        created_at: created_at.to_rfc3339_opts(SecondsFormat::Micros, false),
        attributes: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

#[derive(Default)]
pub struct MemoryEventStore {
    pub records: Mutex<Vec<EventRecord>>,
    pub queries: AtomicUsize,
    pub appends: AtomicUsize,
    pub fail_appends: bool,
    pub delay: Option<Duration>,
}

impl MemoryEventStore {
    pub fn with_records(records: Vec<EventRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl EventStore for MemoryEventStore {
    async fn query(&self, filter: &QueryFilter) -> HubResult<Vec<EventRecord>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut matching: Vec<EventRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        // stable sort keeps insertion order among equal timestamps
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        if !filter.ascending() {
            matching.reverse();
        }
        matching.truncate(filter.limit() as usize);
        Ok(matching)
    }

    async fn append(&self, table: Table, attributes: BTreeMap<String, String>) -> HubResult<()> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_appends {
            return Err(HubError::Store("disk full".to_string()));
        }
        self.records.lock().unwrap().push(EventRecord {
            table,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            attributes,
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: bool,
    pub delay: Option<Duration>,
}

impl RecordingPublisher {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> HubResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(HubError::Publish("broker unreachable".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

pub struct ScriptedClassifier(pub HubResult<Intent>);

#[async_trait::async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, _text: &str) -> HubResult<Intent> {
        match &self.0 {
            Ok(intent) => Ok(intent.clone()),
            Err(e) => Err(HubError::Classification(e.to_string())),
        }
    }
}
