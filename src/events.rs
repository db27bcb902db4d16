use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder};
use tracing::debug;

/// Publishes Kubernetes events against one Django object. Publish
/// failures never fail a reconcile; they are logged and dropped.
#[derive(Clone)]
pub struct EventPublisher {
    recorder: Recorder,
    reference: ObjectReference,
}

impl EventPublisher {
    pub fn new(recorder: Recorder, reference: ObjectReference) -> Self {
        EventPublisher {
            recorder,
            reference,
        }
    }

    pub async fn info(&self, reason: &str, note: impl Into<String>) {
        self.publish(EventType::Normal, reason, note.into()).await;
    }

    pub async fn warning(&self, reason: &str, note: impl Into<String>) {
        self.publish(EventType::Warning, reason, note.into()).await;
    }

    async fn publish(&self, type_: EventType, reason: &str, note: String) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: "Reconciling".to_string(),
            secondary: None,
        };
        if let Err(err) = self.recorder.publish(&event, &self.reference).await {
            debug!(reason, error = %err, "event publish failed");
        }
    }
}
