use anyhow::anyhow;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::app::errors::ServiceResult;
use crate::domain::donation::{
    Donation, DonationRequest, DonationStatus, PaymentDetails, RequestStatus,
};
use crate::infra::db::Db;

/// Read access to the donation content contributions are made against.
#[derive(Clone)]
pub struct DonationService {
    db: Db,
}

impl DonationService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn find_request(&self, request_id: Uuid) -> ServiceResult<Option<DonationRequest>> {
        let row = sqlx::query(
            "SELECT id, ngo_id, title, donation_type, target_quantity, status, \
                    qr_image_url, bank_account_number, bank_name, ifsc_code, account_holder_name, \
                    created_at \
             FROM donation_requests WHERE id = $1",
        )
        .bind(request_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.map(|row| -> ServiceResult<_> {
            let status: String = row.get("status");
            let status = RequestStatus::from_db(&status)
                .ok_or_else(|| anyhow!("unknown donation request status: {}", status))?;
            Ok(DonationRequest {
                id: row.get("id"),
                ngo_id: row.get("ngo_id"),
                title: row.get("title"),
                donation_type: row.get("donation_type"),
                target_quantity: row.get("target_quantity"),
                status,
                payment_details: payment_details(&row),
                created_at: row.get("created_at"),
            })
        })
        .transpose()
    }

    pub async fn find_donation(&self, donation_id: Uuid) -> ServiceResult<Option<Donation>> {
        let row = sqlx::query(
            "SELECT id, ngo_id, title, donation_type, quantity_or_amount, status, \
                    qr_image_url, bank_account_number, bank_name, ifsc_code, account_holder_name, \
                    created_at \
             FROM donations WHERE id = $1",
        )
        .bind(donation_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.map(|row| -> ServiceResult<_> {
            let status: String = row.get("status");
            let status = DonationStatus::from_db(&status)
                .ok_or_else(|| anyhow!("unknown donation status: {}", status))?;
            Ok(Donation {
                id: row.get("id"),
                ngo_id: row.get("ngo_id"),
                title: row.get("title"),
                donation_type: row.get("donation_type"),
                quantity_or_amount: row.get("quantity_or_amount"),
                status,
                payment_details: payment_details(&row),
                created_at: row.get("created_at"),
            })
        })
        .transpose()
    }
}

fn payment_details(row: &PgRow) -> PaymentDetails {
    PaymentDetails {
        qr_image_url: row.get("qr_image_url"),
        bank_account_number: row.get("bank_account_number"),
        bank_name: row.get("bank_name"),
        ifsc_code: row.get("ifsc_code"),
        account_holder_name: row.get("account_holder_name"),
    }
}
