use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::account::Role;
use crate::domain::donation::{DonationStatus, PaymentDetails};
use crate::domain::status::PaymentStatus;

/// Prefix of every system-issued transaction reference.
pub const REFERENCE_PREFIX: &str = "TXN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub donation_id: Uuid,
    pub donor_id: Uuid,
    pub ngo_id: Uuid,
    pub amount: f64,
    pub transaction_ref: String,
    pub donor_reference: Option<String>,
    pub status: PaymentStatus,
    pub verified_by_role: Option<Role>,
    pub verified_by_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub verified_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// What the donor needs to complete the transfer outside the platform.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInstructions {
    pub transaction_ref: String,
    pub amount: f64,
    #[serde(flatten)]
    pub details: PaymentDetails,
    pub note: String,
}

impl PaymentInstructions {
    pub fn new(payment: &Payment, details: PaymentDetails) -> Self {
        Self {
            transaction_ref: payment.transaction_ref.clone(),
            amount: payment.amount,
            details,
            note: format!(
                "Transfer {:.2} and quote {} as the payment reference",
                payment.amount, payment.transaction_ref
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub instructions: PaymentInstructions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub payment: Payment,
    pub donation_status: DonationStatus,
}

/// Builds a reference candidate: the millisecond timestamp followed by a
/// four-digit random suffix. Uniqueness is settled against the store.
pub fn reference_candidate<R: Rng + ?Sized>(now: OffsetDateTime, rng: &mut R) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    let suffix: u16 = rng.gen_range(1000..10000);
    format!("{}{}{}", REFERENCE_PREFIX, millis, suffix)
}
