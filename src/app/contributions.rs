use anyhow::anyhow;
use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::conflicts::ConflictWindowChecker;
use crate::app::donations::DonationService;
use crate::app::errors::{ServiceError, ServiceResult};
use crate::app::events::{EventPublisher, NotificationDraft, Recipient};
use crate::domain::account::{Actor, DonorProfile, Role};
use crate::domain::contribution::{
    Contribution, ContributionPayload, PickupContribution, RequestContribution, ValidContribution,
};
use crate::domain::donation::{is_funds, RequestStatus};
use crate::domain::notification::CONTRIBUTION_CREATED;
use crate::domain::status::{PickupContributionStatus, PickupStatus, RequestContributionStatus};
use crate::infra::db::{unique_violation, Db};
use crate::infra::mail::EmailMessage;
use crate::infra::realtime::{DONATION_CREATED, DONOR_STATS_UPDATED, NGO_STATS_UPDATED};

pub(crate) const REQUEST_CONTRIBUTION_COLUMNS: &str =
    "rc.id, rc.request_id, rc.donor_id, r.ngo_id, rc.quantity_or_amount, rc.pickup_location, \
     rc.pickup_at, rc.notes, rc.status, rc.created_at, rc.updated_at";

pub(crate) const PICKUP_CONTRIBUTION_COLUMNS: &str =
    "c.id, c.donation_id, c.donor_id, d.ngo_id, c.quantity_or_amount, c.pickup_location, \
     c.pickup_at, c.notes, c.status, c.pickup_status, c.created_at, c.updated_at";

const ALREADY_CONTRIBUTED_TO_REQUEST: &str = "you have already contributed to this donation request";
const ALREADY_CONTRIBUTED_TO_DONATION: &str = "you have already contributed to this donation";

/// Creates and reads contributions. Creation runs its checks in a fixed order
/// (existence, eligibility, fields, numbers, dates, schedule, uniqueness) so a
/// given bad request always fails the same way.
#[derive(Clone)]
pub struct ContributionService {
    db: Db,
    events: EventPublisher,
    conflicts: ConflictWindowChecker,
}

/// What was pledged, as the announcements need it.
struct Pledge<'a> {
    entity_type: &'static str,
    entity_id: Uuid,
    ngo_id: Uuid,
    donor_id: Uuid,
    target_title: &'a str,
    valid: &'a ValidContribution,
    payload: serde_json::Value,
}

impl ContributionService {
    pub fn new(db: Db, events: EventPublisher, pickup_window_minutes: i32) -> Self {
        let conflicts = ConflictWindowChecker::new(db.clone(), pickup_window_minutes);
        Self {
            db,
            events,
            conflicts,
        }
    }

    pub async fn create_request_contribution(
        &self,
        donor_id: Uuid,
        request_id: Uuid,
        payload: ContributionPayload,
    ) -> ServiceResult<RequestContribution> {
        let request = DonationService::new(self.db.clone())
            .find_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("donation request not found"))?;

        if request.status != RequestStatus::Active {
            return Err(ServiceError::validation(
                "donation request is closed and no longer accepts contributions",
            ));
        }

        let valid = payload.validate(!is_funds(&request.donation_type), OffsetDateTime::now_utc())?;
        self.ensure_slot_free(request.ngo_id, donor_id, &valid).await?;

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM request_contributions WHERE donor_id = $1 AND request_id = $2)",
        )
        .bind(donor_id)
        .bind(request_id)
        .fetch_one(self.db.pool())
        .await?;
        if exists {
            return Err(ServiceError::conflict(ALREADY_CONTRIBUTED_TO_REQUEST));
        }

        let (location, pickup_at) = slot_columns(&valid);
        let row = sqlx::query(&format!(
            "WITH rc AS ( \
                INSERT INTO request_contributions \
                    (request_id, donor_id, quantity_or_amount, pickup_location, pickup_at, notes) \
                VALUES ($1, $2, $3, $4, $5, $6) \
                RETURNING * \
             ) \
             SELECT {} FROM rc JOIN donation_requests r ON r.id = rc.request_id",
            REQUEST_CONTRIBUTION_COLUMNS
        ))
        .bind(request_id)
        .bind(donor_id)
        .bind(valid.quantity_or_amount)
        .bind(location)
        .bind(pickup_at)
        .bind(&valid.notes)
        .fetch_one(self.db.pool())
        .await
        .map_err(|err| match unique_violation(&err) {
            Some(_) => ServiceError::conflict(ALREADY_CONTRIBUTED_TO_REQUEST),
            None => ServiceError::from(err),
        })?;

        let contribution = request_contribution_from_row(&row)?;
        tracing::info!(
            contribution_id = %contribution.id,
            request_id = %request_id,
            donor_id = %donor_id,
            "request contribution created"
        );

        self.after_create(Pledge {
            entity_type: "request_contribution",
            entity_id: contribution.id,
            ngo_id: contribution.ngo_id,
            donor_id,
            target_title: &request.title,
            valid: &valid,
            payload: json!(contribution),
        })
        .await;

        Ok(contribution)
    }

    pub async fn create_pickup_contribution(
        &self,
        donor_id: Uuid,
        donation_id: Uuid,
        payload: ContributionPayload,
    ) -> ServiceResult<PickupContribution> {
        let donation = DonationService::new(self.db.clone())
            .find_donation(donation_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("donation not found"))?;

        if !donation.status.accepts_contributions() {
            return Err(ServiceError::validation(format!(
                "donation is {} and no longer accepts contributions",
                donation.status.as_db()
            )));
        }
        if is_funds(&donation.donation_type) {
            return Err(ServiceError::validation(
                "fund donations are settled through the payment flow",
            ));
        }

        let valid = payload.validate(true, OffsetDateTime::now_utc())?;
        self.ensure_slot_free(donation.ngo_id, donor_id, &valid).await?;

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM donation_contributions WHERE donor_id = $1 AND donation_id = $2)",
        )
        .bind(donor_id)
        .bind(donation_id)
        .fetch_one(self.db.pool())
        .await?;
        if exists {
            return Err(ServiceError::conflict(ALREADY_CONTRIBUTED_TO_DONATION));
        }

        let (location, pickup_at) = slot_columns(&valid);
        let row = sqlx::query(&format!(
            "WITH c AS ( \
                INSERT INTO donation_contributions \
                    (donation_id, donor_id, quantity_or_amount, pickup_location, pickup_at, notes) \
                VALUES ($1, $2, $3, $4, $5, $6) \
                RETURNING * \
             ) \
             SELECT {} FROM c JOIN donations d ON d.id = c.donation_id",
            PICKUP_CONTRIBUTION_COLUMNS
        ))
        .bind(donation_id)
        .bind(donor_id)
        .bind(valid.quantity_or_amount)
        .bind(location)
        .bind(pickup_at)
        .bind(&valid.notes)
        .fetch_one(self.db.pool())
        .await
        .map_err(|err| match unique_violation(&err) {
            Some(_) => ServiceError::conflict(ALREADY_CONTRIBUTED_TO_DONATION),
            None => ServiceError::from(err),
        })?;

        let contribution = pickup_contribution_from_row(&row)?;
        tracing::info!(
            contribution_id = %contribution.id,
            donation_id = %donation_id,
            donor_id = %donor_id,
            "pickup contribution created"
        );

        self.after_create(Pledge {
            entity_type: "donation_contribution",
            entity_id: contribution.id,
            ngo_id: contribution.ngo_id,
            donor_id,
            target_title: &donation.title,
            valid: &valid,
            payload: json!(contribution),
        })
        .await;

        Ok(contribution)
    }

    pub async fn get_contribution(
        &self,
        contribution_id: Uuid,
        actor: Actor,
    ) -> ServiceResult<Contribution> {
        let contribution = match find_request_contribution(&self.db, contribution_id).await? {
            Some(contribution) => Contribution::Request(contribution),
            None => match find_pickup_contribution(&self.db, contribution_id).await? {
                Some(contribution) => Contribution::Pickup(contribution),
                None => return Err(ServiceError::not_found("contribution not found")),
            },
        };

        let allowed = match actor.role {
            Role::Donor => contribution.donor_id() == actor.id,
            Role::Ngo | Role::Admin => actor.can_manage(contribution.ngo_id()),
        };
        if !allowed {
            return Err(ServiceError::forbidden("you cannot view this contribution"));
        }

        Ok(contribution)
    }

    /// Contributions of either kind for one party, newest first.
    pub async fn list_for(&self, actor: Actor, limit: i64) -> ServiceResult<Vec<Contribution>> {
        let (request_filter, pickup_filter) = match actor.role {
            Role::Donor => ("rc.donor_id = $1", "c.donor_id = $1"),
            Role::Ngo => ("r.ngo_id = $1", "d.ngo_id = $1"),
            Role::Admin => ("$1::uuid IS NOT NULL", "$1::uuid IS NOT NULL"),
        };

        let request_rows = sqlx::query(&format!(
            "SELECT {} FROM request_contributions rc \
             JOIN donation_requests r ON r.id = rc.request_id \
             WHERE {} ORDER BY rc.created_at DESC, rc.id DESC LIMIT $2",
            REQUEST_CONTRIBUTION_COLUMNS, request_filter
        ))
        .bind(actor.id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        let pickup_rows = sqlx::query(&format!(
            "SELECT {} FROM donation_contributions c \
             JOIN donations d ON d.id = c.donation_id \
             WHERE {} ORDER BY c.created_at DESC, c.id DESC LIMIT $2",
            PICKUP_CONTRIBUTION_COLUMNS, pickup_filter
        ))
        .bind(actor.id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        let mut contributions = Vec::with_capacity(request_rows.len() + pickup_rows.len());
        for row in &request_rows {
            contributions.push(Contribution::Request(request_contribution_from_row(row)?));
        }
        for row in &pickup_rows {
            contributions.push(Contribution::Pickup(pickup_contribution_from_row(row)?));
        }
        contributions.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        contributions.truncate(limit.max(0) as usize);

        Ok(contributions)
    }

    async fn ensure_slot_free(
        &self,
        ngo_id: Uuid,
        donor_id: Uuid,
        valid: &ValidContribution,
    ) -> ServiceResult<()> {
        let Some(slot) = &valid.pickup else {
            return Ok(());
        };
        if let Some(scope) = self.conflicts.find_conflict(ngo_id, donor_id, slot.at).await? {
            return Err(ServiceError::conflict(
                scope.conflict_message(self.conflicts.window_minutes()),
            ));
        }
        Ok(())
    }

    /// Fills in a missing address or phone from what the donor just typed.
    /// Re-running it is a no-op.
    async fn backfill_donor_profile(
        &self,
        donor: &DonorProfile,
        valid: &ValidContribution,
    ) -> ServiceResult<bool> {
        if !donor.needs_backfill() {
            return Ok(false);
        }
        let address = valid.pickup.as_ref().map(|slot| slot.location.clone());
        if address.is_none() && valid.contact_phone.is_none() {
            return Ok(false);
        }

        let result = sqlx::query(
            "UPDATE donors \
             SET address = COALESCE(address, $2::text), \
                 phone = COALESCE(phone, $3::text) \
             WHERE id = $1 \
               AND ((address IS NULL AND $2::text IS NOT NULL) \
                    OR (phone IS NULL AND $3::text IS NOT NULL))",
        )
        .bind(donor.id)
        .bind(address)
        .bind(&valid.contact_phone)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // Everything after the insert is best effort: the contribution stands
    // whatever happens here.
    async fn after_create(&self, pledge: Pledge<'_>) {
        let donor = match donor_profile(&self.db, pledge.donor_id).await {
            Ok(donor) => donor,
            Err(err) => {
                tracing::warn!(error = ?err, donor_id = %pledge.donor_id, "failed to load donor profile");
                None
            }
        };

        if let Some(donor) = &donor {
            match self.backfill_donor_profile(donor, pledge.valid).await {
                Ok(true) => tracing::debug!(donor_id = %donor.id, "donor profile back-filled"),
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(error = ?err, donor_id = %donor.id, "failed to back-fill donor profile")
                }
            }
        }

        let donor_name = donor
            .as_ref()
            .map(|donor| donor.name.clone())
            .unwrap_or_else(|| "A donor".to_string());
        let message = format!(
            "{} pledged {} for \"{}\"",
            donor_name, pledge.valid.quantity_or_amount, pledge.target_title
        );
        let metadata = json!({
            "donorId": pledge.donor_id,
            "quantityOrAmount": pledge.valid.quantity_or_amount,
            "pickupAt": pledge.valid.pickup.as_ref().map(|slot| slot.at.unix_timestamp()),
        });

        for recipient in [Recipient::user(pledge.ngo_id, Role::Ngo), Recipient::Admins] {
            self.events.notify(
                NotificationDraft::new(
                    recipient,
                    CONTRIBUTION_CREATED,
                    "New contribution received",
                    message.clone(),
                )
                .related(pledge.entity_type, pledge.entity_id)
                .metadata(metadata.clone()),
            );
        }

        if let Some(donor) = &donor {
            self.events.email(EmailMessage {
                to: donor.email.clone(),
                subject: "Thank you for your contribution".to_string(),
                template: "contribution_confirmation".to_string(),
                context: json!({
                    "donorName": donor.name,
                    "title": pledge.target_title,
                    "quantityOrAmount": pledge.valid.quantity_or_amount,
                    "pickupLocation": pledge.valid.pickup.as_ref().map(|slot| slot.location.clone()),
                    "pickupAt": pledge.valid.pickup.as_ref().map(|slot| slot.at.unix_timestamp()),
                }),
            });
        }

        self.events
            .broadcast(Role::Ngo, pledge.ngo_id, DONATION_CREATED, pledge.payload);
        self.events.broadcast(
            Role::Ngo,
            pledge.ngo_id,
            NGO_STATS_UPDATED,
            json!({ "ngoId": pledge.ngo_id }),
        );
        self.events.broadcast(
            Role::Donor,
            pledge.donor_id,
            DONOR_STATS_UPDATED,
            json!({ "donorId": pledge.donor_id }),
        );
    }
}

pub(crate) async fn donor_profile(db: &Db, donor_id: Uuid) -> ServiceResult<Option<DonorProfile>> {
    let row = sqlx::query("SELECT id, name, email, phone, address FROM donors WHERE id = $1")
        .bind(donor_id)
        .fetch_optional(db.pool())
        .await?;

    Ok(row.map(|row| DonorProfile {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        address: row.get("address"),
    }))
}

pub(crate) async fn find_request_contribution(
    db: &Db,
    contribution_id: Uuid,
) -> ServiceResult<Option<RequestContribution>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM request_contributions rc \
         JOIN donation_requests r ON r.id = rc.request_id \
         WHERE rc.id = $1",
        REQUEST_CONTRIBUTION_COLUMNS
    ))
    .bind(contribution_id)
    .fetch_optional(db.pool())
    .await?;

    row.as_ref().map(request_contribution_from_row).transpose()
}

pub(crate) async fn find_pickup_contribution(
    db: &Db,
    contribution_id: Uuid,
) -> ServiceResult<Option<PickupContribution>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM donation_contributions c \
         JOIN donations d ON d.id = c.donation_id \
         WHERE c.id = $1",
        PICKUP_CONTRIBUTION_COLUMNS
    ))
    .bind(contribution_id)
    .fetch_optional(db.pool())
    .await?;

    row.as_ref().map(pickup_contribution_from_row).transpose()
}

fn slot_columns(valid: &ValidContribution) -> (Option<String>, Option<OffsetDateTime>) {
    match &valid.pickup {
        Some(slot) => (Some(slot.location.clone()), Some(slot.at)),
        None => (None, None),
    }
}

pub(crate) fn request_contribution_from_row(row: &PgRow) -> ServiceResult<RequestContribution> {
    let status: String = row.get("status");
    let status = RequestContributionStatus::from_db(&status)
        .ok_or_else(|| anyhow!("unknown contribution status: {}", status))?;

    Ok(RequestContribution {
        id: row.get("id"),
        request_id: row.get("request_id"),
        donor_id: row.get("donor_id"),
        ngo_id: row.get("ngo_id"),
        quantity_or_amount: row.get("quantity_or_amount"),
        pickup_location: row.get("pickup_location"),
        pickup_at: row.get("pickup_at"),
        notes: row.get("notes"),
        status,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

pub(crate) fn pickup_contribution_from_row(row: &PgRow) -> ServiceResult<PickupContribution> {
    let status: String = row.get("status");
    let status = PickupContributionStatus::from_db(&status)
        .ok_or_else(|| anyhow!("unknown contribution status: {}", status))?;
    let pickup_status: String = row.get("pickup_status");
    let pickup_status = PickupStatus::from_db(&pickup_status)
        .ok_or_else(|| anyhow!("unknown pickup status: {}", pickup_status))?;

    Ok(PickupContribution {
        id: row.get("id"),
        donation_id: row.get("donation_id"),
        donor_id: row.get("donor_id"),
        ngo_id: row.get("ngo_id"),
        quantity_or_amount: row.get("quantity_or_amount"),
        pickup_location: row.get("pickup_location"),
        pickup_at: row.get("pickup_at"),
        notes: row.get("notes"),
        status,
        pickup_status,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
