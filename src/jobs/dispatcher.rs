use tracing::{debug, info};

use crate::app::events::{OutboundEvent, OutboundReceiver};
use crate::app::notifications::NotificationDispatcher;

/// Drains the outbound queue until every publisher is gone.
pub async fn run(mut rx: OutboundReceiver, dispatcher: NotificationDispatcher) {
    info!("outbound dispatcher started");
    while let Some(event) = rx.recv().await {
        handle_event(&dispatcher, event).await;
    }
    info!("outbound dispatcher stopped");
}

/// Delivers one event. Failures are logged here and go no further.
pub async fn handle_event(dispatcher: &NotificationDispatcher, event: OutboundEvent) {
    match event {
        OutboundEvent::Notify(draft) => {
            let ids = dispatcher.notify(&draft).await;
            debug!(
                notification_type = draft.notification_type,
                delivered = ids.len(),
                "notification stored"
            );
        }
        OutboundEvent::Broadcast {
            role,
            user_id,
            event,
            payload,
        } => dispatcher.broadcast(role, user_id, event, &payload),
        OutboundEvent::Email(message) => dispatcher.send_email(&message).await,
    }
}
