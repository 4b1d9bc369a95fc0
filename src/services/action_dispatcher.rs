use crate::services::error::{HubError, HubResult};
use crate::services::event_store::EventStore;
use crate::services::model::{DeviceId, DeviceState, EventSource, Table};
use crate::services::publisher::Publisher;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct DispatchOutcome {
    pub device: DeviceId,
    pub state: DeviceState,
    /// Set when the device was switched but the access log entry was not written.
    pub audit_warning: Option<HubError>,
}

pub struct ActionDispatcher {
    publisher: Arc<dyn Publisher>,
    store: Arc<dyn EventStore>,
    actuation_topic: String,
    timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        store: Arc<dyn EventStore>,
        actuation_topic: String,
        timeout: Duration,
    ) -> Self {
        Self {
            publisher,
            store,
            actuation_topic,
            timeout,
        }
    }

    pub async fn dispatch(&self, device_id: i64, state: DeviceState) -> HubResult<DispatchOutcome> {
        let device = DeviceId::try_from(device_id)?;
        let command = format!("{}{}", state.as_str(), device.get());

        tokio::time::timeout(
            self.timeout,
            self.publisher.publish(&self.actuation_topic, &command),
        )
        .await
        .map_err(|_| HubError::Timeout("device command"))??;

        tracing::info!(
            topic = %self.actuation_topic,
            command = %command,
            "dispatch: device command published"
        );

        let audit = BTreeMap::from([(
            "event_source".to_string(),
            EventSource::VoiceLed(device, state).as_string(),
        )]);
        let audit_warning =
            match tokio::time::timeout(self.timeout, self.store.append(Table::AccessLog, audit))
                .await
            {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(HubError::AuditWrite(e.to_string())),
                Err(_) => Some(HubError::AuditWrite("access log write timed out".to_string())),
            };

        if let Some(warning) = &audit_warning {
            tracing::warn!(
                device = device.get(),
                state = state.as_str(),
                error = %warning,
                "dispatch: command sent but audit write failed"
            );
        }

        Ok(DispatchOutcome {
            device,
            state,
            audit_warning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{MemoryEventStore, RecordingPublisher};
    use std::sync::atomic::Ordering;

    fn dispatcher(
        publisher: Arc<RecordingPublisher>,
        store: Arc<MemoryEventStore>,
    ) -> ActionDispatcher {
        ActionDispatcher::new(
            publisher,
            store,
            "home/lights/voice".to_string(),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn publishes_command_then_writes_audit() {
        let publisher = Arc::new(RecordingPublisher::default());
        let store = Arc::new(MemoryEventStore::default());

        let outcome = dispatcher(publisher.clone(), store.clone())
            .dispatch(2, DeviceState::Off)
            .await
            .unwrap();

        assert_eq!(outcome.device.get(), 2);
        assert!(outcome.audit_warning.is_none());
        assert_eq!(
            publisher.sent.lock().unwrap().as_slice(),
            &[("home/lights/voice".to_string(), "off2".to_string())]
        );
        let logged = store.snapshot();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].table, Table::AccessLog);
        assert_eq!(logged[0].attribute("event_source"), Some("voice_led_2_off"));
    }

    #[tokio::test]
    async fn unknown_device_has_no_side_effects() {
        let publisher = Arc::new(RecordingPublisher::default());
        let store = Arc::new(MemoryEventStore::default());

        let err = dispatcher(publisher.clone(), store.clone())
            .dispatch(3, DeviceState::On)
            .await
            .unwrap_err();

        assert!(matches!(err, HubError::InvalidDevice(3)));
        assert_eq!(publisher.count(), 0);
        assert_eq!(store.appends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn audit_failure_is_reported_not_fatal() {
        let publisher = Arc::new(RecordingPublisher::default());
        let store = Arc::new(MemoryEventStore {
            fail_appends: true,
            ..MemoryEventStore::default()
        });

        let outcome = dispatcher(publisher.clone(), store.clone())
            .dispatch(1, DeviceState::On)
            .await
            .unwrap();

        assert_eq!(publisher.count(), 1);
        assert!(matches!(outcome.audit_warning, Some(HubError::AuditWrite(_))));
    }

    #[tokio::test]
    async fn publish_failure_skips_audit() {
        let publisher = Arc::new(RecordingPublisher {
            fail: true,
            ..RecordingPublisher::default()
        });
        let store = Arc::new(MemoryEventStore::default());

        let err = dispatcher(publisher, store.clone())
            .dispatch(1, DeviceState::On)
            .await
            .unwrap_err();

        assert!(matches!(err, HubError::Publish(_)));
        assert_eq!(store.appends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_publish_times_out() {
        let publisher = Arc::new(RecordingPublisher {
            delay: Some(Duration::from_secs(5)),
            ..RecordingPublisher::default()
        });
        let store = Arc::new(MemoryEventStore::default());
        let dispatcher = ActionDispatcher::new(
            publisher,
            store.clone(),
            "home/lights/voice".to_string(),
            Duration::from_millis(20),
        );

        let err = dispatcher.dispatch(1, DeviceState::Off).await.unwrap_err();
        assert!(matches!(err, HubError::Timeout(_)));
        assert_eq!(store.appends.load(Ordering::SeqCst), 0);
    }
}
