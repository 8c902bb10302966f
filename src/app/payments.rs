use std::sync::Arc;

use anyhow::anyhow;
use rand::thread_rng;
use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::contributions::donor_profile;
use crate::app::donations::DonationService;
use crate::app::errors::{ServiceError, ServiceResult};
use crate::app::events::{EventPublisher, NotificationDraft, Recipient};
use crate::domain::account::{Actor, Role};
use crate::domain::donation::{is_funds, Donation, DonationStatus};
use crate::domain::notification::{PAYMENT_CONFIRMED, PAYMENT_INITIATED, PAYMENT_VERIFIED};
use crate::domain::payment::{
    reference_candidate, Payment, PaymentInstructions, PaymentReceipt, VerificationOutcome,
};
use crate::domain::status::{PaymentStatus, TransitionError};
use crate::infra::db::{unique_violation, Db};
use crate::infra::mail::EmailMessage;
use crate::infra::realtime::{DONOR_STATS_UPDATED, NGO_STATS_UPDATED};

const PAYMENT_COLUMNS: &str = "p.id, p.donation_id, p.donor_id, d.ngo_id, p.amount, \
     p.transaction_ref, p.donor_reference, p.status, p.verified_by_role, p.verified_by_id, \
     p.verified_at, p.created_at";

const TRANSACTION_REF_CONSTRAINT: &str = "payments_transaction_ref_key";
const ALREADY_PAID: &str = "you have already initiated a payment for this donation";

/// Produces transaction reference candidates for a given instant.
pub type ReferenceSource = Arc<dyn Fn(OffsetDateTime) -> String + Send + Sync>;

fn random_reference(now: OffsetDateTime) -> String {
    reference_candidate(now, &mut thread_rng())
}

/// Settles fund donations: issues a transaction reference, records the
/// donor's confirmation and lets the owning NGO resolve the payment once.
#[derive(Clone)]
pub struct PaymentService {
    db: Db,
    events: EventPublisher,
    max_reference_attempts: u32,
    references: ReferenceSource,
}

impl PaymentService {
    pub fn new(db: Db, events: EventPublisher, max_reference_attempts: u32) -> Self {
        Self {
            db,
            events,
            max_reference_attempts: max_reference_attempts.max(1),
            references: Arc::new(random_reference),
        }
    }

    pub fn with_reference_source(mut self, references: ReferenceSource) -> Self {
        self.references = references;
        self
    }

    pub async fn initiate(
        &self,
        donor_id: Uuid,
        donation_id: Uuid,
        amount: Option<f64>,
        donor_reference: Option<String>,
    ) -> ServiceResult<PaymentReceipt> {
        let donation = DonationService::new(self.db.clone())
            .find_donation(donation_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("donation not found"))?;

        if !donation.status.accepts_contributions() {
            return Err(ServiceError::validation(format!(
                "donation is {} and no longer accepts payments",
                donation.status.as_db()
            )));
        }
        if !is_funds(&donation.donation_type) {
            return Err(ServiceError::validation(
                "only fund donations accept payments",
            ));
        }

        let amount = amount.ok_or_else(|| ServiceError::validation("missing required fields: amount"))?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(ServiceError::validation("amount must be a positive number"));
        }

        let missing = donation.payment_details.missing_fields();
        if !missing.is_empty() {
            return Err(ServiceError::validation(format!(
                "payment details incomplete: missing {}",
                missing.join(", ")
            )));
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM payments WHERE donor_id = $1 AND donation_id = $2)",
        )
        .bind(donor_id)
        .bind(donation_id)
        .fetch_one(self.db.pool())
        .await?;
        if exists {
            return Err(ServiceError::conflict(ALREADY_PAID));
        }

        let donor_reference = donor_reference
            .map(|reference| reference.trim().to_string())
            .filter(|reference| !reference.is_empty());
        let payment = self
            .insert_payment(donor_id, &donation, amount, donor_reference)
            .await?;

        tracing::info!(
            payment_id = %payment.id,
            donation_id = %donation_id,
            donor_id = %donor_id,
            transaction_ref = %payment.transaction_ref,
            "payment initiated"
        );

        let instructions = PaymentInstructions::new(&payment, donation.payment_details.clone());
        self.after_initiate(&payment, &donation, &instructions).await;

        Ok(PaymentReceipt {
            payment,
            instructions,
        })
    }

    /// The donor states the transfer was made. Only the reference changes.
    pub async fn confirm(
        &self,
        payment_id: Uuid,
        donor_id: Uuid,
        donor_reference: Option<String>,
    ) -> ServiceResult<Payment> {
        let current = self.load(payment_id).await?;
        if current.donor_id != donor_id {
            return Err(ServiceError::forbidden("only the paying donor can confirm this payment"));
        }
        if current.status != PaymentStatus::Pending {
            return Err(TransitionError::AlreadyResolved {
                entity: "payment",
                state: current.status.as_db(),
            }
            .into());
        }

        let donor_reference = donor_reference
            .map(|reference| reference.trim().to_string())
            .filter(|reference| !reference.is_empty());

        let row = sqlx::query(&format!(
            "WITH p AS ( \
                UPDATE payments SET donor_reference = COALESCE($2, donor_reference) \
                WHERE id = $1 AND status = 'PENDING' \
                RETURNING * \
             ) \
             SELECT {} FROM p JOIN donations d ON d.id = p.donation_id",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .bind(&donor_reference)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            let reread = self.load(payment_id).await?;
            return Err(TransitionError::AlreadyResolved {
                entity: "payment",
                state: reread.status.as_db(),
            }
            .into());
        };
        let payment = payment_from_row(&row)?;

        tracing::info!(payment_id = %payment_id, donor_id = %donor_id, "payment confirmed by donor");

        self.events.notify(
            NotificationDraft::new(
                Recipient::user(payment.ngo_id, Role::Ngo),
                PAYMENT_CONFIRMED,
                "Payment confirmed by donor",
                format!(
                    "A donor reports transferring {:.2} with reference {}",
                    payment.amount, payment.transaction_ref
                ),
            )
            .related("payment", payment.id)
            .metadata(json!({
                "transactionRef": payment.transaction_ref,
                "donorReference": payment.donor_reference,
            })),
        );

        Ok(payment)
    }

    /// Resolves a pending payment. A successful payment advances a PENDING
    /// donation to CONFIRMED; that second write is best effort.
    pub async fn verify(
        &self,
        payment_id: Uuid,
        actor: Actor,
        outcome: PaymentStatus,
    ) -> ServiceResult<VerificationOutcome> {
        let current = self.load(payment_id).await?;
        if !actor.can_manage(current.ngo_id) {
            return Err(ServiceError::forbidden(
                "only the NGO that owns this donation can verify its payments",
            ));
        }
        let next = current.status.resolve(outcome)?;

        let row = sqlx::query(&format!(
            "WITH p AS ( \
                UPDATE payments \
                SET status = $2, verified_by_role = $3, verified_by_id = $4, verified_at = now() \
                WHERE id = $1 AND status = 'PENDING' \
                RETURNING * \
             ) \
             SELECT {} FROM p JOIN donations d ON d.id = p.donation_id",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .bind(next.as_db())
        .bind(actor.role.as_db())
        .bind(actor.id)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            let reread = self.load(payment_id).await?;
            return Err(TransitionError::AlreadyResolved {
                entity: "payment",
                state: reread.status.as_db(),
            }
            .into());
        };
        let payment = payment_from_row(&row)?;
        if payment.status != next {
            return Err(anyhow!(
                "payment {} reads {} after writing {}",
                payment_id,
                payment.status.as_db(),
                next.as_db()
            )
            .into());
        }

        tracing::info!(
            payment_id = %payment_id,
            actor_id = %actor.id,
            role = actor.role.as_db(),
            outcome = next.as_db(),
            "payment verified"
        );

        let donation_status = if next == PaymentStatus::Success {
            self.confirm_donation(payment.donation_id).await
        } else {
            None
        };
        let donation_status = match donation_status {
            Some(status) => status,
            None => self.donation_status(payment.donation_id).await,
        };

        self.after_verify(&payment).await;

        Ok(VerificationOutcome {
            payment,
            donation_status,
        })
    }

    pub async fn get(&self, payment_id: Uuid, actor: Actor) -> ServiceResult<Payment> {
        let payment = self.load(payment_id).await?;
        let allowed = match actor.role {
            Role::Donor => payment.donor_id == actor.id,
            Role::Ngo | Role::Admin => actor.can_manage(payment.ngo_id),
        };
        if !allowed {
            return Err(ServiceError::forbidden("you cannot view this payment"));
        }
        Ok(payment)
    }

    pub async fn list_for(&self, actor: Actor, limit: i64) -> ServiceResult<Vec<Payment>> {
        let filter = match actor.role {
            Role::Donor => "p.donor_id = $1",
            Role::Ngo => "d.ngo_id = $1",
            Role::Admin => "$1::uuid IS NOT NULL",
        };

        let rows = sqlx::query(&format!(
            "SELECT {} FROM payments p JOIN donations d ON d.id = p.donation_id \
             WHERE {} ORDER BY p.created_at DESC, p.id DESC LIMIT $2",
            PAYMENT_COLUMNS, filter
        ))
        .bind(actor.id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(payment_from_row).collect()
    }

    async fn load(&self, payment_id: Uuid) -> ServiceResult<Payment> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payments p JOIN donations d ON d.id = p.donation_id WHERE p.id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(row) => payment_from_row(&row),
            None => Err(ServiceError::not_found("payment not found")),
        }
    }

    async fn generate_reference(&self) -> ServiceResult<String> {
        for _ in 0..self.max_reference_attempts {
            let candidate = (self.references)(OffsetDateTime::now_utc());

            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM payments WHERE transaction_ref = $1)",
            )
            .bind(&candidate)
            .fetch_one(self.db.pool())
            .await?;

            if !exists {
                return Ok(candidate);
            }
        }

        Err(anyhow!("failed to generate a unique transaction reference").into())
    }

    // The unique constraint on transaction_ref settles races between the
    // existence check and the insert; losing one retries with a new reference.
    async fn insert_payment(
        &self,
        donor_id: Uuid,
        donation: &Donation,
        amount: f64,
        donor_reference: Option<String>,
    ) -> ServiceResult<Payment> {
        for _ in 0..self.max_reference_attempts {
            let transaction_ref = self.generate_reference().await?;

            let result = sqlx::query(&format!(
                "WITH p AS ( \
                    INSERT INTO payments (donation_id, donor_id, amount, transaction_ref, donor_reference) \
                    VALUES ($1, $2, $3, $4, $5) \
                    RETURNING * \
                 ) \
                 SELECT {} FROM p JOIN donations d ON d.id = p.donation_id",
                PAYMENT_COLUMNS
            ))
            .bind(donation.id)
            .bind(donor_id)
            .bind(amount)
            .bind(&transaction_ref)
            .bind(&donor_reference)
            .fetch_one(self.db.pool())
            .await;

            match result {
                Ok(row) => return payment_from_row(&row),
                Err(err) => match unique_violation(&err) {
                    Some(constraint) if constraint == TRANSACTION_REF_CONSTRAINT => {
                        tracing::debug!(transaction_ref = %transaction_ref, "transaction reference taken, retrying");
                        continue;
                    }
                    Some(_) => return Err(ServiceError::conflict(ALREADY_PAID)),
                    None => return Err(err.into()),
                },
            }
        }

        Err(anyhow!("failed to store payment with a unique transaction reference").into())
    }

    async fn confirm_donation(&self, donation_id: Uuid) -> Option<DonationStatus> {
        let result: Result<Option<String>, sqlx::Error> = sqlx::query_scalar(
            "UPDATE donations SET status = 'CONFIRMED' \
             WHERE id = $1 AND status = 'PENDING' \
             RETURNING status",
        )
        .bind(donation_id)
        .fetch_optional(self.db.pool())
        .await;

        match result {
            Ok(Some(_)) => {
                tracing::info!(donation_id = %donation_id, "donation confirmed by payment");
                Some(DonationStatus::Confirmed)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::error!(error = ?err, donation_id = %donation_id, "failed to confirm donation after payment");
                None
            }
        }
    }

    async fn donation_status(&self, donation_id: Uuid) -> DonationStatus {
        match DonationService::new(self.db.clone())
            .find_donation(donation_id)
            .await
        {
            Ok(Some(donation)) => donation.status,
            Ok(None) => DonationStatus::Pending,
            Err(err) => {
                tracing::warn!(error = ?err, donation_id = %donation_id, "failed to read donation status");
                DonationStatus::Pending
            }
        }
    }

    async fn after_initiate(
        &self,
        payment: &Payment,
        donation: &Donation,
        instructions: &PaymentInstructions,
    ) {
        let message = format!(
            "A donor started a payment of {:.2} for \"{}\" (reference {})",
            payment.amount, donation.title, payment.transaction_ref
        );
        for recipient in [Recipient::user(payment.ngo_id, Role::Ngo), Recipient::Admins] {
            self.events.notify(
                NotificationDraft::new(recipient, PAYMENT_INITIATED, "Payment initiated", message.clone())
                    .related("payment", payment.id)
                    .metadata(json!({
                        "donationId": donation.id,
                        "amount": payment.amount,
                        "transactionRef": payment.transaction_ref,
                    })),
            );
        }

        match donor_profile(&self.db, payment.donor_id).await {
            Ok(Some(donor)) => self.events.email(EmailMessage {
                to: donor.email,
                subject: format!("Payment instructions for {}", donation.title),
                template: "payment_instructions".to_string(),
                context: json!({
                    "donorName": donor.name,
                    "title": donation.title,
                    "instructions": instructions,
                }),
            }),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = ?err, donor_id = %payment.donor_id, "failed to load donor for payment email");
            }
        }

        self.events.broadcast(
            Role::Ngo,
            payment.ngo_id,
            NGO_STATS_UPDATED,
            json!({ "ngoId": payment.ngo_id }),
        );
        self.events.broadcast(
            Role::Donor,
            payment.donor_id,
            DONOR_STATS_UPDATED,
            json!({ "donorId": payment.donor_id }),
        );
    }

    async fn after_verify(&self, payment: &Payment) {
        let status = payment.status.as_db();
        let mut draft = NotificationDraft::new(
            Recipient::user(payment.donor_id, Role::Donor),
            PAYMENT_VERIFIED,
            "Payment verified",
            format!("Your payment {} was marked {}", payment.transaction_ref, status),
        )
        .related("payment", payment.id)
        .metadata(json!({ "paymentStatus": status }));

        match donor_profile(&self.db, payment.donor_id).await {
            Ok(Some(donor)) => {
                draft = draft.email(EmailMessage {
                    to: donor.email,
                    subject: "Your payment was verified".to_string(),
                    template: "payment_verification".to_string(),
                    context: json!({
                        "donorName": donor.name,
                        "transactionRef": payment.transaction_ref,
                        "amount": payment.amount,
                        "paymentStatus": status,
                    }),
                });
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = ?err, donor_id = %payment.donor_id, "failed to load donor for verification email");
            }
        }

        self.events.notify(draft);
        self.events.broadcast(
            Role::Donor,
            payment.donor_id,
            DONOR_STATS_UPDATED,
            json!({ "donorId": payment.donor_id }),
        );
        self.events.broadcast(
            Role::Ngo,
            payment.ngo_id,
            NGO_STATS_UPDATED,
            json!({ "ngoId": payment.ngo_id }),
        );
    }
}

fn payment_from_row(row: &PgRow) -> ServiceResult<Payment> {
    let status: String = row.get("status");
    let status = PaymentStatus::from_db(&status)
        .ok_or_else(|| anyhow!("unknown payment status: {}", status))?;
    let verified_by_role: Option<String> = row.get("verified_by_role");

    Ok(Payment {
        id: row.get("id"),
        donation_id: row.get("donation_id"),
        donor_id: row.get("donor_id"),
        ngo_id: row.get("ngo_id"),
        amount: row.get("amount"),
        transaction_ref: row.get("transaction_ref"),
        donor_reference: row.get("donor_reference"),
        status,
        verified_by_role: verified_by_role.as_deref().and_then(Role::from_db),
        verified_by_id: row.get("verified_by_id"),
        verified_at: row.get("verified_at"),
        created_at: row.get("created_at"),
    })
}
