mod email;

pub use email::EmailNotifier;

use std::sync::Arc;

use serde::Serialize;

use uuid::Uuid;

use crate::domain::{EmailAddress, PersonName, Price, RegistrationEntry};

/// Event emitted after a committed registration change, for mail delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all_fields = "camelCase")]
pub enum NotificationEvent {
    RegistrationConfirmed {
        offering_id: Uuid,
        offering_name: String,
        contact_email: EmailAddress,
        contact_name: PersonName,
        participants: Vec<RegistrationEntry>,
        total_price: Price,
    },
    WaitlistJoined {
        offering_id: Uuid,
        offering_name: String,
        contact_email: EmailAddress,
        contact_name: PersonName,
        participants: Vec<RegistrationEntry>,
    },
    WaitlistPromoted {
        offering_id: Uuid,
        offering_name: String,
        promoted_entries: Vec<RegistrationEntry>,
    },
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RegistrationConfirmed { .. } => "RegistrationConfirmed",
            Self::WaitlistJoined { .. } => "WaitlistJoined",
            Self::WaitlistPromoted { .. } => "WaitlistPromoted",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to build notification")]
    Build(#[source] anyhow::Error),
    #[error("Failed to send notification to {recipient}")]
    Send {
        recipient: EmailAddress,
        #[source]
        source: anyhow::Error,
    },
}

/// Delivers notification events to people
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}

/// Best-effort delivery of notification events.
///
/// Runs after the registration change is committed; failures are logged and
/// never reach the caller.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    #[tracing::instrument(name = "Dispatch notification", skip_all, fields(kind = event.kind()))]
    pub async fn dispatch(&self, event: &NotificationEvent) {
        if let Err(error) = self.notifier.notify(event).await {
            tracing::warn!(
                error.cause_chain = ?error,
                "Dropping {} notification",
                event.kind()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::ledger::tests::entry;

    use super::*;

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<&'static str>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
            self.seen.lock().unwrap().push(event.kind());
            if self.fail {
                Err(NotifyError::Build(anyhow::anyhow!("mail service unreachable")))
            } else {
                Ok(())
            }
        }
    }

    fn promoted_event() -> NotificationEvent {
        NotificationEvent::WaitlistPromoted {
            offering_id: Uuid::new_v4(),
            offering_name: "Easter Bootcamp".into(),
            promoted_entries: vec![entry("A")],
        }
    }

    #[tokio::test]
    async fn dispatch_swallows_notifier_failures() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let dispatcher = NotificationDispatcher::new(notifier.clone());

        dispatcher.dispatch(&promoted_event()).await;

        assert_eq!(vec!["WaitlistPromoted"], *notifier.seen.lock().unwrap());
    }

    #[test]
    fn events_serialize_with_kind_tag_and_camel_case_fields() {
        let event = promoted_event();
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!("WaitlistPromoted", json["kind"]);
        assert!(json.get("offeringId").is_some());
        assert_eq!(1, json["promotedEntries"].as_array().unwrap().len());
    }
}
