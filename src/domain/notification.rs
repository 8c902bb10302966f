use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::account::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_type: Role,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub related_entity: Option<RelatedEntity>,
    pub metadata: Value,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Pointer to the record a notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedEntity {
    pub entity_type: String,
    pub entity_id: Uuid,
}

impl RelatedEntity {
    pub fn new(entity_type: &str, entity_id: Uuid) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id,
        }
    }
}

// Notification type tags.
pub const CONTRIBUTION_CREATED: &str = "CONTRIBUTION_CREATED";
pub const CONTRIBUTION_STATUS: &str = "CONTRIBUTION_STATUS";
pub const PICKUP_STATUS: &str = "PICKUP_STATUS";
pub const PAYMENT_INITIATED: &str = "PAYMENT_INITIATED";
pub const PAYMENT_CONFIRMED: &str = "PAYMENT_CONFIRMED";
pub const PAYMENT_VERIFIED: &str = "PAYMENT_VERIFIED";
