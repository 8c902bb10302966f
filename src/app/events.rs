//! Outbound side effects of business operations.
//!
//! Services publish here after their primary write and return immediately;
//! the dispatcher job drains the queue. Delivery failures never reach the
//! request that caused them.

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::account::Role;
use crate::domain::notification::RelatedEntity;
use crate::infra::mail::EmailMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    User { user_id: Uuid, role: Role },
    Admins,
}

impl Recipient {
    pub fn user(user_id: Uuid, role: Role) -> Self {
        Self::User { user_id, role }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub recipient: Recipient,
    pub title: String,
    pub message: String,
    pub notification_type: &'static str,
    pub related: Option<RelatedEntity>,
    pub metadata: Option<Value>,
    pub email: Option<EmailMessage>,
}

impl NotificationDraft {
    pub fn new(
        recipient: Recipient,
        notification_type: &'static str,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient,
            title: title.into(),
            message: message.into(),
            notification_type,
            related: None,
            metadata: None,
            email: None,
        }
    }

    pub fn related(mut self, entity_type: &str, entity_id: Uuid) -> Self {
        self.related = Some(RelatedEntity::new(entity_type, entity_id));
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn email(mut self, email: EmailMessage) -> Self {
        self.email = Some(email);
        self
    }
}

#[derive(Debug, Clone)]
pub enum OutboundEvent {
    Notify(NotificationDraft),
    Broadcast {
        role: Role,
        user_id: Uuid,
        event: &'static str,
        payload: Value,
    },
    Email(EmailMessage),
}

pub type OutboundReceiver = mpsc::UnboundedReceiver<OutboundEvent>;

#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

impl EventPublisher {
    pub fn channel() -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, event: OutboundEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!("outbound queue closed, dropping event");
        }
    }

    pub fn notify(&self, draft: NotificationDraft) {
        self.publish(OutboundEvent::Notify(draft));
    }

    pub fn broadcast(&self, role: Role, user_id: Uuid, event: &'static str, payload: Value) {
        self.publish(OutboundEvent::Broadcast {
            role,
            user_id,
            event,
            payload,
        });
    }

    pub fn email(&self, message: EmailMessage) {
        self.publish(OutboundEvent::Email(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn publish_never_blocks_and_preserves_order() {
        let (events, mut rx) = EventPublisher::channel();
        let ngo = Uuid::new_v4();

        events.broadcast(Role::Ngo, ngo, "ngo:stats:updated", json!({}));
        events.notify(NotificationDraft::new(
            Recipient::Admins,
            "CONTRIBUTION_CREATED",
            "New contribution",
            "A donor pledged",
        ));

        assert!(matches!(rx.try_recv(), Ok(OutboundEvent::Broadcast { user_id, .. }) if user_id == ngo));
        assert!(matches!(rx.try_recv(), Ok(OutboundEvent::Notify(draft)) if draft.recipient == Recipient::Admins));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn publishing_after_shutdown_is_swallowed() {
        let (events, rx) = EventPublisher::channel();
        drop(rx);
        events.email(EmailMessage {
            to: "donor@example.org".into(),
            subject: "Thanks".into(),
            template: "contribution_confirmation".into(),
            context: json!({}),
        });
    }
}
