pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use std::sync::Arc;

use anyhow::Result;

use crate::app::events::{EventPublisher, OutboundReceiver};
use crate::app::notifications::NotificationDispatcher;
use crate::config::AppConfig;
use crate::infra::mail::{LogMailer, Mailer, QueueMailer};
use crate::infra::queue::MailQueue;
use crate::infra::realtime::ChannelHub;
use crate::infra::{cache::RedisCache, db::Db};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub cache: RedisCache,
    pub events: EventPublisher,
    pub realtime: Arc<ChannelHub>,
    pub mailer: Arc<dyn Mailer>,
    pub paseto_access_key: [u8; 32],
    pub paseto_refresh_key: [u8; 32],
    pub access_ttl_minutes: u64,
    pub refresh_ttl_days: u64,
    pub pickup_window_minutes: i32,
    pub payment_ref_max_attempts: u32,
}

impl AppState {
    /// Dispatcher that delivers what this state's publisher queues.
    pub fn dispatcher(&self) -> NotificationDispatcher {
        NotificationDispatcher::new(self.db.clone(), self.realtime.clone(), self.mailer.clone())
    }
}

/// Connects every backing service. The returned receiver is the other end
/// of `AppState::events` and must be drained by `jobs::dispatcher::run`.
pub async fn build_state(config: &AppConfig) -> Result<(AppState, OutboundReceiver)> {
    let db = Db::connect(config).await?;
    let cache = RedisCache::connect(&config.redis_url).await?;

    let mailer: Arc<dyn Mailer> = match &config.mail {
        Some(mail) => {
            let queue = MailQueue::new(mail).await?;
            tracing::info!(queue = %queue.queue_name(), "mail queue ready");
            Arc::new(QueueMailer::new(queue, config.mail_from.clone()))
        }
        None => {
            tracing::warn!("MAIL_QUEUE_NAME not set, emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let (events, rx) = EventPublisher::channel();

    let state = AppState {
        db,
        cache,
        events,
        realtime: Arc::new(ChannelHub::new()),
        mailer,
        paseto_access_key: config.paseto_access_key,
        paseto_refresh_key: config.paseto_refresh_key,
        access_ttl_minutes: config.access_ttl_minutes,
        refresh_ttl_days: config.refresh_ttl_days,
        pickup_window_minutes: config.pickup_window_minutes,
        payment_ref_max_attempts: config.payment_ref_max_attempts,
    };

    Ok((state, rx))
}
