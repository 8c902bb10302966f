use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

// Frames a slow socket may fall behind by before it starts dropping events.
const CHANNEL_CAPACITY: usize = 64;

// Event names pushed to real-time channels.
pub const NGO_STATS_UPDATED: &str = "ngo:stats:updated";
pub const DONOR_STATS_UPDATED: &str = "donor:stats:updated";
pub const DONATION_CREATED: &str = "donation:created";
pub const NOTIFICATION_NEW: &str = "notification:new";
pub const CONTRIBUTION_STATUS_UPDATED: &str = "contribution:status-updated";

/// Outbound half of the real-time gateway.
pub trait RealtimeSink: Send + Sync {
    /// Sends to every session subscribed to `channel`, returning how many
    /// received it. Zero subscribers is not an error.
    fn send_to_channel(&self, channel: &str, event: &str, payload: &Value) -> usize;
}

#[derive(Serialize)]
struct Frame<'a> {
    event: &'a str,
    data: &'a Value,
}

/// In-process channel registry. Each channel fans one frame out to every
/// connection of the identity it is keyed on.
#[derive(Default)]
pub struct ChannelHub {
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drops the channel once its last subscriber is gone.
    pub fn release(&self, channel: &str) {
        self.channels
            .remove_if(channel, |_, sender| sender.receiver_count() == 0);
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl RealtimeSink for ChannelHub {
    fn send_to_channel(&self, channel: &str, event: &str, payload: &Value) -> usize {
        let Some(sender) = self.channels.get(channel) else {
            return 0;
        };

        let frame = match serde_json::to_string(&Frame {
            event,
            data: payload,
        }) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = ?err, channel, event, "failed to encode realtime frame");
                return 0;
            }
        };

        sender.send(frame).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn every_session_of_an_identity_receives_the_event() {
        let hub = ChannelHub::new();
        let mut first = hub.subscribe("donor:abc");
        let mut second = hub.subscribe("donor:abc");
        let mut other = hub.subscribe("ngo:abc");

        let delivered = hub.send_to_channel("donor:abc", NOTIFICATION_NEW, &json!({ "id": 1 }));
        assert_eq!(delivered, 2);

        let expected = r#"{"event":"notification:new","data":{"id":1}}"#;
        assert_eq!(first.recv().await.unwrap(), expected);
        assert_eq!(second.recv().await.unwrap(), expected);
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn sending_without_subscribers_is_a_no_op() {
        let hub = ChannelHub::new();
        assert_eq!(hub.send_to_channel("ngo:nobody", NGO_STATS_UPDATED, &json!({})), 0);
    }

    #[test]
    fn release_keeps_channels_with_live_subscribers() {
        let hub = ChannelHub::new();
        let receiver = hub.subscribe("admin:1");
        hub.release("admin:1");
        assert_eq!(hub.subscriber_count("admin:1"), 1);

        drop(receiver);
        hub.release("admin:1");
        assert_eq!(hub.subscriber_count("admin:1"), 0);
    }
}
