use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Donation type that is settled through the payment flow instead of a pickup.
pub const FUNDS: &str = "FUNDS";

pub fn is_funds(donation_type: &str) -> bool {
    donation_type.trim().eq_ignore_ascii_case(FUNDS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Active,
    Closed,
}

impl RequestStatus {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(Self::Active),
            "CLOSED" => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Closed => "CLOSED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DonationStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl DonationStatus {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "CONFIRMED" => Some(Self::Confirmed),
            "COMPLETED" => Some(Self::Completed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn accepts_contributions(&self) -> bool {
        !matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Bank and QR details an NGO publishes so donors can transfer funds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub qr_image_url: Option<String>,
    pub bank_account_number: Option<String>,
    pub bank_name: Option<String>,
    pub ifsc_code: Option<String>,
    pub account_holder_name: Option<String>,
}

impl PaymentDetails {
    /// Wire names of the fields that are absent or blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let fields = [
            ("qrImageUrl", &self.qr_image_url),
            ("bankAccountNumber", &self.bank_account_number),
            ("bankName", &self.bank_name),
            ("ifscCode", &self.ifsc_code),
            ("accountHolderName", &self.account_holder_name),
        ];
        fields
            .into_iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(name, _)| name)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRequest {
    pub id: Uuid,
    pub ngo_id: Uuid,
    pub title: String,
    pub donation_type: String,
    pub target_quantity: f64,
    pub status: RequestStatus,
    pub payment_details: PaymentDetails,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: Uuid,
    pub ngo_id: Uuid,
    pub title: String,
    pub donation_type: String,
    pub quantity_or_amount: f64,
    pub status: DonationStatus,
    pub payment_details: PaymentDetails,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> PaymentDetails {
        PaymentDetails {
            qr_image_url: Some("https://cdn.example.org/qr.png".into()),
            bank_account_number: Some("001122334455".into()),
            bank_name: Some("State Bank".into()),
            ifsc_code: Some("SBIN0001234".into()),
            account_holder_name: Some("Helping Hands Trust".into()),
        }
    }

    #[test]
    fn complete_details_have_no_missing_fields() {
        assert!(complete().missing_fields().is_empty());
    }

    #[test]
    fn blank_fields_count_as_missing() {
        let details = PaymentDetails {
            ifsc_code: Some("   ".into()),
            qr_image_url: None,
            ..complete()
        };
        assert_eq!(details.missing_fields(), vec!["qrImageUrl", "ifscCode"]);
    }

    #[test]
    fn funds_type_is_case_insensitive() {
        assert!(is_funds("FUNDS"));
        assert!(is_funds(" funds "));
        assert!(!is_funds("FOOD"));
    }

    #[test]
    fn closed_out_donations_reject_contributions() {
        assert!(DonationStatus::Pending.accepts_contributions());
        assert!(DonationStatus::Confirmed.accepts_contributions());
        assert!(!DonationStatus::Completed.accepts_contributions());
        assert!(!DonationStatus::Cancelled.accepts_contributions());
    }
}
