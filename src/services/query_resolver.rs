use crate::services::error::{HubError, HubResult};
use crate::services::event_store::EventStore;
use crate::services::model::{
    EventRecord, EventSource, FormattedAnswer, Predicate, QueryFilter, SensorKind, SensorValue,
    Table,
};
use crate::services::time_format::{TimeFormatter, parse_timestamp};
use std::sync::Arc;
use std::time::Duration;

/// Most-recent lookups younger than this answer with the seconds count.
const IMMEDIACY_WINDOW_SECS: i64 = 30;

pub struct QueryResolver {
    store: Arc<dyn EventStore>,
    formatter: TimeFormatter,
    timeout: Duration,
}

impl QueryResolver {
    pub fn new(
        store: Arc<dyn EventStore>,
        formatter: TimeFormatter,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            formatter,
            timeout,
        }
    }

    pub async fn resolve(&self, filter: &QueryFilter) -> HubResult<FormattedAnswer> {
        let rows = tokio::time::timeout(self.timeout, self.store.query(filter))
            .await
            .map_err(|_| HubError::Timeout("history lookup"))??;

        let Some(record) = rows.first() else {
            return Ok(FormattedAnswer {
                found: false,
                phrase: not_found_phrase(filter.table()).to_string(),
            });
        };

        Ok(FormattedAnswer {
            found: true,
            phrase: self.answer_phrase(filter, record),
        })
    }

    fn answer_phrase(&self, filter: &QueryFilter, record: &EventRecord) -> String {
        let ordinal = if filter.ascending() { "first" } else { "last" };
        let description = describe(filter);

        let ts = match parse_timestamp(&record.created_at) {
            Ok(ts) => ts,
            Err(err) => {
                tracing::warn!(error = %err, table = filter.table().name(), "resolver: unreadable record timestamp");
                return format!("The {ordinal} time {description} was at a time I couldn't read.");
            }
        };

        if !filter.ascending() {
            let elapsed = (self.formatter.now() - ts).num_seconds().max(0);
            if elapsed < IMMEDIACY_WINDOW_SECS {
                return format!(
                    "Yes, the event '{}' happened just {elapsed} seconds ago.",
                    event_id(record, &description)
                );
            }
        }

        format!(
            "The {ordinal} time {description} was {}",
            self.formatter.format(ts)
        )
    }
}

fn not_found_phrase(table: Table) -> &'static str {
    match table {
        Table::SensorReading => "I have no record of that.",
        Table::AccessLog => "I have no record of that happening.",
    }
}

fn event_id<'a>(record: &'a EventRecord, description: &'a str) -> &'a str {
    let field = match record.table {
        Table::SensorReading => "sensor_value",
        Table::AccessLog => "event_source",
    };
    record.attribute(field).unwrap_or(description)
}

fn describe(filter: &QueryFilter) -> String {
    let predicates = filter.predicates();

    let source = predicates.iter().find_map(|p| match p {
        Predicate::EventSource(source) => Some(*source),
        _ => None,
    });
    if let Some(source) = source {
        return match source {
            EventSource::OpenedByPir => "the door was opened by the motion sensor".to_string(),
            EventSource::VoiceLed(device, state) => {
                format!("light {} was turned {}", device.get(), state.as_str())
            }
        };
    }

    let value = predicates.iter().find_map(|p| match p {
        Predicate::SensorValue(value) => Some(*value),
        _ => None,
    });
    if let Some(value) = value {
        return match value {
            SensorValue::Dark => "it was dark",
            SensorValue::Bright => "it was bright",
            SensorValue::Raining => "it rained",
            SensorValue::Dry => "it was dry",
        }
        .to_string();
    }

    let kind = predicates.iter().find_map(|p| match p {
        Predicate::SensorType(kind) => Some(*kind),
        _ => None,
    });
    match (kind, filter.table()) {
        (Some(SensorKind::Light), _) => "the light sensor reported in".to_string(),
        (Some(SensorKind::Rain), _) => "the rain sensor reported in".to_string(),
        (None, Table::SensorReading) => "a sensor reading came in".to_string(),
        (None, Table::AccessLog) => "something was logged at the door".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{FixedClock, MemoryEventStore, record};
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::Ordering;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 3, 12, 0, 0).unwrap()
    }

    fn resolver(store: Arc<MemoryEventStore>) -> QueryResolver {
        QueryResolver::new(
            store,
            TimeFormatter::default().with_clock(Arc::new(FixedClock(now()))),
            Duration::from_secs(1),
        )
    }

    fn filter(table: Table, pairs: &[(&str, &str)], ascending: bool) -> QueryFilter {
        let raw: Vec<(String, String)> = pairs
            .iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect();
        QueryFilter::new(table, &raw, ascending).unwrap()
    }

    fn rain_filter(ascending: bool) -> QueryFilter {
        filter(
            Table::SensorReading,
            &[("sensor_type", "rain"), ("sensor_value", "raining")],
            ascending,
        )
    }

    #[tokio::test]
    async fn last_rain_two_days_ago() {
        let store = Arc::new(MemoryEventStore::with_records(vec![record(
            Table::SensorReading,
            now() - chrono::Duration::days(2),
            &[("sensor_type", "rain"), ("sensor_value", "raining")],
        )]));

        let answer = resolver(store).resolve(&rain_filter(false)).await.unwrap();
        assert!(answer.found);
        assert_eq!(
            answer.phrase,
            "The last time it rained was on May 1 at 12:00 PM UTC (which was 2 days ago)."
        );
    }

    #[tokio::test]
    async fn recent_door_event_uses_immediacy_phrase() {
        let store = Arc::new(MemoryEventStore::with_records(vec![record(
            Table::AccessLog,
            now() - chrono::Duration::seconds(10),
            &[("event_source", "opened_by_pir")],
        )]));

        let answer = resolver(store)
            .resolve(&filter(
                Table::AccessLog,
                &[("event_source", "opened_by_pir")],
                false,
            ))
            .await
            .unwrap();
        assert!(answer.found);
        assert_eq!(
            answer.phrase,
            "Yes, the event 'opened_by_pir' happened just 10 seconds ago."
        );
    }

    #[tokio::test]
    async fn immediacy_never_applies_to_first_lookups() {
        let store = Arc::new(MemoryEventStore::with_records(vec![record(
            Table::AccessLog,
            now() - chrono::Duration::seconds(10),
            &[("event_source", "opened_by_pir")],
        )]));

        let answer = resolver(store)
            .resolve(&filter(
                Table::AccessLog,
                &[("event_source", "opened_by_pir")],
                true,
            ))
            .await
            .unwrap();
        assert_eq!(
            answer.phrase,
            "The first time the door was opened by the motion sensor was on May 3 at 11:59 AM UTC (which was just now)."
        );
    }

    #[tokio::test]
    async fn immediacy_window_is_exclusive() {
        let store = Arc::new(MemoryEventStore::with_records(vec![record(
            Table::AccessLog,
            now() - chrono::Duration::seconds(30),
            &[("event_source", "voice_led_1_on")],
        )]));

        let answer = resolver(store)
            .resolve(&filter(
                Table::AccessLog,
                &[("event_source", "voice_led_1_on")],
                false,
            ))
            .await
            .unwrap();
        assert!(answer.phrase.starts_with("The last time light 1 was turned on was on"));
    }

    #[tokio::test]
    async fn first_and_last_pick_opposite_ends() {
        let store = Arc::new(MemoryEventStore::with_records(vec![
            record(
                Table::SensorReading,
                now() - chrono::Duration::days(5),
                &[("sensor_type", "light"), ("sensor_value", "dark")],
            ),
            record(
                Table::SensorReading,
                now() - chrono::Duration::hours(3),
                &[("sensor_type", "light"), ("sensor_value", "dark")],
            ),
            record(
                Table::SensorReading,
                now() - chrono::Duration::hours(1),
                &[("sensor_type", "light"), ("sensor_value", "bright")],
            ),
        ]));
        let resolver = resolver(store);

        let first = resolver
            .resolve(&filter(Table::SensorReading, &[("sensor_value", "dark")], true))
            .await
            .unwrap();
        assert!(first.phrase.contains("first"));
        assert!(first.phrase.ends_with("(which was 5 days ago)."));

        let last = resolver
            .resolve(&filter(Table::SensorReading, &[("sensor_value", "dark")], false))
            .await
            .unwrap();
        assert!(last.phrase.contains("last"));
        assert!(last.phrase.ends_with("(which was 3 hours ago)."));
    }

    #[tokio::test]
    async fn missing_rows_are_reported_distinctly() {
        let store = Arc::new(MemoryEventStore::default());
        let resolver = resolver(store);

        let state = resolver.resolve(&rain_filter(true)).await.unwrap();
        assert!(!state.found);
        assert_eq!(state.phrase, "I have no record of that.");

        let action = resolver
            .resolve(&filter(
                Table::AccessLog,
                &[("event_source", "voice_led_2_off")],
                false,
            ))
            .await
            .unwrap();
        assert!(!action.found);
        assert_eq!(action.phrase, "I have no record of that happening.");
    }

    #[tokio::test]
    async fn repeated_resolution_is_identical() {
        let store = Arc::new(MemoryEventStore::with_records(vec![
            record(
                Table::SensorReading,
                now() - chrono::Duration::minutes(45),
                &[("sensor_type", "rain"), ("sensor_value", "dry")],
            ),
            record(
                Table::SensorReading,
                now() - chrono::Duration::minutes(45),
                &[("sensor_type", "rain"), ("sensor_value", "dry")],
            ),
        ]));
        let resolver = resolver(store.clone());
        let f = filter(Table::SensorReading, &[("sensor_value", "dry")], false);

        let a = resolver.resolve(&f).await.unwrap();
        let b = resolver.resolve(&f).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a.phrase,
            "The last time it was dry was on May 3 at 11:15 AM UTC (which was 45 minutes ago)."
        );
        assert_eq!(store.queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreadable_timestamp_falls_back() {
        let mut bad = record(
            Table::SensorReading,
            now(),
            &[("sensor_type", "light"), ("sensor_value", "bright")],
        );
        bad.created_at = "not a time".to_string();
        let store = Arc::new(MemoryEventStore::with_records(vec![bad]));

        let answer = resolver(store)
            .resolve(&filter(Table::SensorReading, &[("sensor_value", "bright")], false))
            .await
            .unwrap();
        assert!(answer.found);
        assert_eq!(
            answer.phrase,
            "The last time it was bright was at a time I couldn't read."
        );
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let store = Arc::new(MemoryEventStore {
            delay: Some(Duration::from_secs(5)),
            ..MemoryEventStore::default()
        });
        let resolver = QueryResolver::new(
            store,
            TimeFormatter::default().with_clock(Arc::new(FixedClock(now()))),
            Duration::from_millis(20),
        );

        let err = resolver.resolve(&rain_filter(false)).await.unwrap_err();
        assert!(matches!(err, HubError::Timeout(_)));
    }
}
