use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::events::{NotificationDraft, Recipient};
use crate::domain::account::{channel_key, Actor, Role};
use crate::domain::notification::{Notification, RelatedEntity};
use crate::infra::db::Db;
use crate::infra::mail::{EmailMessage, Mailer};
use crate::infra::realtime::{RealtimeSink, NOTIFICATION_NEW};

const NOTIFICATION_COLUMNS: &str = "id, user_id, user_type, title, message, notification_type, \
     related_entity_type, related_entity_id, metadata, is_read, read_at, created_at";

/// Owner-facing access to stored notifications.
#[derive(Clone)]
pub struct NotificationService {
    db: Db,
}

impl NotificationService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        owner: Actor,
        cursor: Option<(OffsetDateTime, Uuid)>,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        let rows = match cursor {
            Some((created_at, notification_id)) => {
                sqlx::query(&format!(
                    "SELECT {} FROM notifications \
                     WHERE user_id = $1 AND user_type = $2 \
                       AND ($3 = false OR is_read = false) \
                       AND (created_at < $4 OR (created_at = $4 AND id < $5)) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $6",
                    NOTIFICATION_COLUMNS
                ))
                .bind(owner.id)
                .bind(owner.role.as_db())
                .bind(unread_only)
                .bind(created_at)
                .bind(notification_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM notifications \
                     WHERE user_id = $1 AND user_type = $2 \
                       AND ($3 = false OR is_read = false) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $4",
                    NOTIFICATION_COLUMNS
                ))
                .bind(owner.id)
                .bind(owner.role.as_db())
                .bind(unread_only)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        rows.iter().map(notification_from_row).collect()
    }

    pub async fn unread_count(&self, owner: Actor) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications \
             WHERE user_id = $1 AND user_type = $2 AND is_read = false",
        )
        .bind(owner.id)
        .bind(owner.role.as_db())
        .fetch_one(self.db.pool())
        .await?;

        Ok(count)
    }

    /// Returns false when the notification does not exist for this owner.
    /// Marking an already read notification keeps its first read time.
    pub async fn mark_read(&self, notification_id: Uuid, owner: Actor) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications \
             SET is_read = true, read_at = COALESCE(read_at, now()) \
             WHERE id = $1 AND user_id = $2 AND user_type = $3",
        )
        .bind(notification_id)
        .bind(owner.id)
        .bind(owner.role.as_db())
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_read(&self, owner: Actor) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications \
             SET is_read = true, read_at = now() \
             WHERE user_id = $1 AND user_type = $2 AND is_read = false",
        )
        .bind(owner.id)
        .bind(owner.role.as_db())
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete(&self, notification_id: Uuid, owner: Actor) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM notifications WHERE id = $1 AND user_id = $2 AND user_type = $3",
        )
        .bind(notification_id)
        .bind(owner.id)
        .bind(owner.role.as_db())
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Persists notifications and pushes them out. Every step is best effort:
/// failures are logged per recipient and dropped.
#[derive(Clone)]
pub struct NotificationDispatcher {
    db: Db,
    realtime: Arc<dyn RealtimeSink>,
    mailer: Arc<dyn Mailer>,
}

impl NotificationDispatcher {
    pub fn new(db: Db, realtime: Arc<dyn RealtimeSink>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            db,
            realtime,
            mailer,
        }
    }

    /// Delivers a draft to every user it addresses and returns the ids of
    /// the stored notifications. A recipient whose insert fails is logged
    /// and skipped; the rest and the email still go out.
    pub async fn notify(&self, draft: &NotificationDraft) -> Vec<Uuid> {
        let targets = match draft.recipient {
            Recipient::User { user_id, role } => vec![(user_id, role)],
            Recipient::Admins => match self.admin_ids().await {
                Ok(ids) => ids.into_iter().map(|id| (id, Role::Admin)).collect(),
                Err(err) => {
                    tracing::error!(
                        error = ?err,
                        notification_type = draft.notification_type,
                        "failed to list admins for notification"
                    );
                    Vec::new()
                }
            },
        };

        let mut ids = Vec::with_capacity(targets.len());
        for (user_id, role) in targets {
            match self.store(user_id, role, draft).await {
                Ok(notification) => {
                    self.push(&notification);
                    ids.push(notification.id);
                }
                Err(err) => tracing::warn!(
                    error = ?err,
                    user_id = %user_id,
                    role = role.as_db(),
                    notification_type = draft.notification_type,
                    "failed to store notification"
                ),
            }
        }

        if let Some(email) = &draft.email {
            self.send_email(email).await;
        }

        ids
    }

    pub async fn send_email(&self, message: &EmailMessage) {
        if let Err(err) = self.mailer.send(message).await {
            tracing::warn!(
                error = ?err,
                to = %message.to,
                template = %message.template,
                "failed to send email"
            );
        }
    }

    pub fn broadcast(&self, role: Role, user_id: Uuid, event: &str, payload: &serde_json::Value) {
        let delivered = self
            .realtime
            .send_to_channel(&channel_key(role, user_id), event, payload);
        tracing::trace!(user_id = %user_id, event, delivered, "realtime event sent");
    }

    async fn admin_ids(&self) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar("SELECT id FROM admins ORDER BY created_at")
            .fetch_all(self.db.pool())
            .await?;
        Ok(ids)
    }

    async fn store(
        &self,
        user_id: Uuid,
        role: Role,
        draft: &NotificationDraft,
    ) -> Result<Notification> {
        let related = draft.related.as_ref();
        let row = sqlx::query(&format!(
            "INSERT INTO notifications \
                (user_id, user_type, title, message, notification_type, \
                 related_entity_type, related_entity_id, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .bind(role.as_db())
        .bind(&draft.title)
        .bind(&draft.message)
        .bind(draft.notification_type)
        .bind(related.map(|entity| entity.entity_type.as_str()))
        .bind(related.map(|entity| entity.entity_id))
        .bind(draft.metadata.clone().unwrap_or_else(|| json!({})))
        .fetch_one(self.db.pool())
        .await?;

        notification_from_row(&row)
    }

    fn push(&self, notification: &Notification) {
        let payload = match serde_json::to_value(notification) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = ?err, notification_id = %notification.id, "failed to encode notification");
                return;
            }
        };
        self.broadcast(
            notification.user_type,
            notification.user_id,
            NOTIFICATION_NEW,
            &payload,
        );
    }
}

fn notification_from_row(row: &PgRow) -> Result<Notification> {
    let user_type: String = row.get("user_type");
    let user_type =
        Role::from_db(&user_type).ok_or_else(|| anyhow!("unknown user type: {}", user_type))?;
    let entity_type: Option<String> = row.get("related_entity_type");
    let entity_id: Option<Uuid> = row.get("related_entity_id");

    Ok(Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        user_type,
        title: row.get("title"),
        message: row.get("message"),
        notification_type: row.get("notification_type"),
        related_entity: match (entity_type, entity_id) {
            (Some(entity_type), Some(entity_id)) => Some(RelatedEntity {
                entity_type,
                entity_id,
            }),
            _ => None,
        },
        metadata: row.get("metadata"),
        is_read: row.get("is_read"),
        read_at: row.get("read_at"),
        created_at: row.get("created_at"),
    })
}
