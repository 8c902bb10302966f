use anyhow::anyhow;
use serde_json::json;
use uuid::Uuid;

use crate::app::contributions::{
    donor_profile, find_pickup_contribution, find_request_contribution,
    pickup_contribution_from_row, request_contribution_from_row, PICKUP_CONTRIBUTION_COLUMNS,
    REQUEST_CONTRIBUTION_COLUMNS,
};
use crate::app::errors::{ServiceError, ServiceResult};
use crate::app::events::{EventPublisher, NotificationDraft, Recipient};
use crate::domain::account::{Actor, Role};
use crate::domain::contribution::{PickupContribution, RequestContribution};
use crate::domain::notification::{CONTRIBUTION_STATUS, PICKUP_STATUS};
use crate::domain::status::{PickupContributionStatus, PickupStatus, RequestContributionStatus};
use crate::infra::db::Db;
use crate::infra::mail::EmailMessage;
use crate::infra::realtime::{CONTRIBUTION_STATUS_UPDATED, DONOR_STATS_UPDATED, NGO_STATS_UPDATED};

const CHANGED_CONCURRENTLY: &str = "status changed concurrently, reload and try again";

/// Applies NGO decisions to contributions and pickups.
///
/// Each update is validated against the current state, then written with a
/// conditional `UPDATE` keyed on that state. If the row moved in between, the
/// write touches nothing and the record is re-read: a record that already
/// holds the requested state is returned as is, anything else is a conflict.
#[derive(Clone)]
pub struct StatusService {
    db: Db,
    events: EventPublisher,
}

/// What the donor is told about a status change.
struct StatusChange {
    contribution_id: Uuid,
    entity_type: &'static str,
    donor_id: Uuid,
    ngo_id: Uuid,
    notification_type: &'static str,
    field: &'static str,
    status: &'static str,
    payload: serde_json::Value,
}

impl StatusService {
    pub fn new(db: Db, events: EventPublisher) -> Self {
        Self { db, events }
    }

    pub async fn update_request_status(
        &self,
        contribution_id: Uuid,
        actor: Actor,
        requested: RequestContributionStatus,
    ) -> ServiceResult<RequestContribution> {
        let current = find_request_contribution(&self.db, contribution_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("contribution not found"))?;

        self.apply_request_status(current, actor, requested).await
    }

    /// Applies a decision to a contribution as it was last read. The write
    /// only lands if the stored status still matches `current`.
    pub async fn apply_request_status(
        &self,
        current: RequestContribution,
        actor: Actor,
        requested: RequestContributionStatus,
    ) -> ServiceResult<RequestContribution> {
        let contribution_id = current.id;
        if !actor.can_manage(current.ngo_id) {
            return Err(ServiceError::forbidden(
                "only the NGO that owns this request can update its contributions",
            ));
        }

        let next = current.status.transition(requested)?;

        let row = sqlx::query(&format!(
            "WITH rc AS ( \
                UPDATE request_contributions SET status = $3, updated_at = now() \
                WHERE id = $1 AND status = $2 \
                RETURNING * \
             ) \
             SELECT {} FROM rc JOIN donation_requests r ON r.id = rc.request_id",
            REQUEST_CONTRIBUTION_COLUMNS
        ))
        .bind(contribution_id)
        .bind(current.status.as_db())
        .bind(next.as_db())
        .fetch_optional(self.db.pool())
        .await?;

        let updated = match row {
            Some(row) => {
                let updated = request_contribution_from_row(&row)?;
                if updated.status != next {
                    return Err(anyhow!(
                        "contribution {} reads {} after writing {}",
                        contribution_id,
                        updated.status.as_db(),
                        next.as_db()
                    )
                    .into());
                }
                updated
            }
            None => {
                let reread = find_request_contribution(&self.db, contribution_id)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("contribution not found"))?;
                if reread.status != next {
                    return Err(ServiceError::conflict(CHANGED_CONCURRENTLY));
                }
                tracing::debug!(contribution_id = %contribution_id, "status already applied");
                return Ok(reread);
            }
        };

        tracing::info!(
            contribution_id = %contribution_id,
            actor_id = %actor.id,
            from = current.status.as_db(),
            to = next.as_db(),
            "request contribution status updated"
        );

        self.announce(StatusChange {
            contribution_id,
            entity_type: "request_contribution",
            donor_id: updated.donor_id,
            ngo_id: updated.ngo_id,
            notification_type: CONTRIBUTION_STATUS,
            field: "status",
            status: next.as_db(),
            payload: json!(updated),
        })
        .await;

        Ok(updated)
    }

    pub async fn update_pickup_contribution_status(
        &self,
        contribution_id: Uuid,
        actor: Actor,
        requested: PickupContributionStatus,
    ) -> ServiceResult<PickupContribution> {
        let current = self.load_pickup(contribution_id, actor).await?;
        let next = current
            .status
            .transition(requested, current.pickup_status)?;

        let row = sqlx::query(&format!(
            "WITH c AS ( \
                UPDATE donation_contributions SET status = $4, updated_at = now() \
                WHERE id = $1 AND status = $2 AND pickup_status = $3 \
                RETURNING * \
             ) \
             SELECT {} FROM c JOIN donations d ON d.id = c.donation_id",
            PICKUP_CONTRIBUTION_COLUMNS
        ))
        .bind(contribution_id)
        .bind(current.status.as_db())
        .bind(current.pickup_status.as_db())
        .bind(next.as_db())
        .fetch_optional(self.db.pool())
        .await?;

        let updated = match row {
            Some(row) => pickup_contribution_from_row(&row)?,
            None => {
                let reread = self.reload_pickup(contribution_id).await?;
                if reread.status != next {
                    return Err(ServiceError::conflict(CHANGED_CONCURRENTLY));
                }
                return Ok(reread);
            }
        };
        if updated.status != next {
            return Err(anyhow!(
                "contribution {} reads {} after writing {}",
                contribution_id,
                updated.status.as_db(),
                next.as_db()
            )
            .into());
        }

        tracing::info!(
            contribution_id = %contribution_id,
            actor_id = %actor.id,
            from = current.status.as_db(),
            to = next.as_db(),
            "pickup contribution status updated"
        );

        self.announce(StatusChange {
            contribution_id,
            entity_type: "donation_contribution",
            donor_id: updated.donor_id,
            ngo_id: updated.ngo_id,
            notification_type: CONTRIBUTION_STATUS,
            field: "status",
            status: next.as_db(),
            payload: json!(updated),
        })
        .await;

        Ok(updated)
    }

    /// Moves the physical pickup along. Picking up completes the contribution
    /// in the same write.
    pub async fn update_pickup_status(
        &self,
        contribution_id: Uuid,
        actor: Actor,
        requested: PickupStatus,
    ) -> ServiceResult<PickupContribution> {
        let current = self.load_pickup(contribution_id, actor).await?;
        let next = current.pickup_status.transition(requested, current.status)?;

        let row = sqlx::query(&format!(
            "WITH c AS ( \
                UPDATE donation_contributions \
                SET pickup_status = $4, status = $5, updated_at = now() \
                WHERE id = $1 AND pickup_status = $2 AND status = $3 \
                RETURNING * \
             ) \
             SELECT {} FROM c JOIN donations d ON d.id = c.donation_id",
            PICKUP_CONTRIBUTION_COLUMNS
        ))
        .bind(contribution_id)
        .bind(current.pickup_status.as_db())
        .bind(current.status.as_db())
        .bind(next.pickup_status.as_db())
        .bind(next.contribution_status.as_db())
        .fetch_optional(self.db.pool())
        .await?;

        let updated = match row {
            Some(row) => pickup_contribution_from_row(&row)?,
            None => {
                let reread = self.reload_pickup(contribution_id).await?;
                if reread.pickup_status != next.pickup_status {
                    return Err(ServiceError::conflict(CHANGED_CONCURRENTLY));
                }
                return Ok(reread);
            }
        };
        if updated.pickup_status != next.pickup_status
            || updated.status != next.contribution_status
        {
            return Err(anyhow!(
                "pickup {} reads {}/{} after writing {}/{}",
                contribution_id,
                updated.pickup_status.as_db(),
                updated.status.as_db(),
                next.pickup_status.as_db(),
                next.contribution_status.as_db()
            )
            .into());
        }

        tracing::info!(
            contribution_id = %contribution_id,
            actor_id = %actor.id,
            from = current.pickup_status.as_db(),
            to = next.pickup_status.as_db(),
            contribution_status = next.contribution_status.as_db(),
            "pickup status updated"
        );

        self.announce(StatusChange {
            contribution_id,
            entity_type: "donation_contribution",
            donor_id: updated.donor_id,
            ngo_id: updated.ngo_id,
            notification_type: PICKUP_STATUS,
            field: "pickupStatus",
            status: next.pickup_status.as_db(),
            payload: json!(updated),
        })
        .await;

        Ok(updated)
    }

    async fn load_pickup(
        &self,
        contribution_id: Uuid,
        actor: Actor,
    ) -> ServiceResult<PickupContribution> {
        let current = self.reload_pickup(contribution_id).await?;
        if !actor.can_manage(current.ngo_id) {
            return Err(ServiceError::forbidden(
                "only the NGO that owns this donation can update its pickups",
            ));
        }
        Ok(current)
    }

    async fn reload_pickup(&self, contribution_id: Uuid) -> ServiceResult<PickupContribution> {
        find_pickup_contribution(&self.db, contribution_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("contribution not found"))
    }

    async fn announce(&self, change: StatusChange) {
        let title = "Contribution status updated";
        let message = match change.field {
            "pickupStatus" => format!("Your pickup is now {}", change.status),
            _ => format!("Your contribution is now {}", change.status),
        };

        let mut draft = NotificationDraft::new(
            Recipient::user(change.donor_id, Role::Donor),
            change.notification_type,
            title,
            message,
        )
        .related(change.entity_type, change.contribution_id)
        .metadata(json!({ change.field: change.status }));

        match donor_profile(&self.db, change.donor_id).await {
            Ok(Some(donor)) => {
                draft = draft.email(EmailMessage {
                    to: donor.email,
                    subject: title.to_string(),
                    template: "contribution_status_update".to_string(),
                    context: json!({
                        "donorName": donor.name,
                        "contributionId": change.contribution_id,
                        change.field: change.status,
                    }),
                });
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = ?err, donor_id = %change.donor_id, "failed to load donor for status email");
            }
        }

        self.events.notify(draft);
        self.events.broadcast(
            Role::Donor,
            change.donor_id,
            CONTRIBUTION_STATUS_UPDATED,
            change.payload,
        );
        self.events.broadcast(
            Role::Donor,
            change.donor_id,
            DONOR_STATS_UPDATED,
            json!({ "donorId": change.donor_id }),
        );
        self.events.broadcast(
            Role::Ngo,
            change.ngo_id,
            NGO_STATS_UPDATED,
            json!({ "ngoId": change.ngo_id }),
        );
    }
}
