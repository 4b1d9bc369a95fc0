use crate::services::error::{HubError, HubResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    SensorReading,
    AccessLog,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Self::SensorReading => "sensor_readings",
            Self::AccessLog => "access_logs",
        }
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::SensorReading => &["sensor_type", "sensor_value"],
            Self::AccessLog => &["event_source"],
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sensor_readings" | "sensor_reading" => Some(Self::SensorReading),
            "access_logs" | "access_log" => Some(Self::AccessLog),
            _ => None,
        }
    }
}

/// A stored row. `created_at` is kept as the store delivered it (RFC 3339)
/// and parsed at format time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub table: Table,
    pub created_at: String,
    pub attributes: BTreeMap<String, String>,
}

impl EventRecord {
    pub fn attribute(&self, field: &str) -> Option<&str> {
        self.attributes.get(field).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Light,
    Rain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorValue {
    Dark,
    Bright,
    Raining,
    Dry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    On,
    Off,
}

impl DeviceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

/// Lights the hub can switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(u8);

impl DeviceId {
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for DeviceId {
    type Error = HubError;

    fn try_from(id: i64) -> HubResult<Self> {
        match id {
            1 | 2 => Ok(Self(id as u8)),
            other => Err(HubError::InvalidDevice(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    OpenedByPir,
    VoiceLed(DeviceId, DeviceState),
}

impl EventSource {
    pub fn as_string(self) -> String {
        match self {
            Self::OpenedByPir => "opened_by_pir".to_string(),
            Self::VoiceLed(device, state) => {
                format!("voice_led_{}_{}", device.get(), state.as_str())
            }
        }
    }

    fn parse(value: &str) -> Option<Self> {
        if value == "opened_by_pir" {
            return Some(Self::OpenedByPir);
        }
        let rest = value.strip_prefix("voice_led_")?;
        let (id, state) = rest.split_once('_')?;
        let device = DeviceId::try_from(id.parse::<i64>().ok()?).ok()?;
        let state = match state {
            "on" => DeviceState::On,
            "off" => DeviceState::Off,
            _ => return None,
        };
        Some(Self::VoiceLed(device, state))
    }
}

/// Equality constraint on a known column with a known value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predicate {
    SensorType(SensorKind),
    SensorValue(SensorValue),
    EventSource(EventSource),
}

impl Predicate {
    pub fn parse(field: &str, value: &str) -> HubResult<Self> {
        let value = value.trim();
        let parsed = match field {
            "sensor_type" => match value {
                "light" => Some(Self::SensorType(SensorKind::Light)),
                "rain" => Some(Self::SensorType(SensorKind::Rain)),
                _ => None,
            },
            "sensor_value" => match value {
                "dark" => Some(Self::SensorValue(SensorValue::Dark)),
                "bright" => Some(Self::SensorValue(SensorValue::Bright)),
                "raining" => Some(Self::SensorValue(SensorValue::Raining)),
                "dry" => Some(Self::SensorValue(SensorValue::Dry)),
                _ => None,
            },
            "event_source" => EventSource::parse(value).map(Self::EventSource),
            _ => None,
        };
        parsed.ok_or_else(|| HubError::invalid_predicate(field, value))
    }

    pub fn field(&self) -> &'static str {
        match self {
            Self::SensorType(_) => "sensor_type",
            Self::SensorValue(_) => "sensor_value",
            Self::EventSource(_) => "event_source",
        }
    }

    pub fn value(&self) -> String {
        match self {
            Self::SensorType(SensorKind::Light) => "light".to_string(),
            Self::SensorType(SensorKind::Rain) => "rain".to_string(),
            Self::SensorValue(SensorValue::Dark) => "dark".to_string(),
            Self::SensorValue(SensorValue::Bright) => "bright".to_string(),
            Self::SensorValue(SensorValue::Raining) => "raining".to_string(),
            Self::SensorValue(SensorValue::Dry) => "dry".to_string(),
            Self::EventSource(source) => source.as_string(),
        }
    }

    pub fn table(&self) -> Table {
        match self {
            Self::SensorType(_) | Self::SensorValue(_) => Table::SensorReading,
            Self::EventSource(_) => Table::AccessLog,
        }
    }

    pub fn matches(&self, record: &EventRecord) -> bool {
        record.attribute(self.field()) == Some(self.value().as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderField {
    #[default]
    CreatedAt,
}

impl OrderField {
    pub fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilter {
    table: Table,
    predicates: Vec<Predicate>,
    order_field: OrderField,
    ascending: bool,
    limit: u32,
}

impl QueryFilter {
    /// Validates raw `(field, value)` pairs against `table`'s vocabulary.
    /// Exact duplicate pairs collapse; the first occurrence keeps its slot.
    pub fn new(table: Table, raw: &[(String, String)], ascending: bool) -> HubResult<Self> {
        let mut predicates: Vec<Predicate> = Vec::with_capacity(raw.len());
        for (field, value) in raw {
            let predicate = Predicate::parse(field, value)?;
            if predicate.table() != table {
                return Err(HubError::invalid_predicate(field, value));
            }
            if !predicates.contains(&predicate) {
                predicates.push(predicate);
            }
        }
        Ok(Self {
            table,
            predicates,
            order_field: OrderField::CreatedAt,
            ascending,
            limit: 1,
        })
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn order_field(&self) -> OrderField {
        self.order_field
    }

    pub fn ascending(&self) -> bool {
        self.ascending
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn matches(&self, record: &EventRecord) -> bool {
        record.table == self.table && self.predicates.iter().all(|p| p.matches(record))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    Actuate {
        device_id: i64,
        state: DeviceState,
    },
    HistoryQuery {
        table: Table,
        predicates: Vec<(String, String)>,
        find_first: bool,
    },
    Unknown,
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Actuate { .. } => "actuate",
            Self::HistoryQuery { .. } => "history_query",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedAnswer {
    pub found: bool,
    pub phrase: String,
}
