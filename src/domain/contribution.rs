use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

use crate::domain::status::{PickupContributionStatus, PickupStatus, RequestContributionStatus};

/// A donor's pledge against an NGO's donation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContribution {
    pub id: Uuid,
    pub request_id: Uuid,
    pub donor_id: Uuid,
    pub ngo_id: Uuid,
    pub quantity_or_amount: f64,
    pub pickup_location: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub pickup_at: Option<OffsetDateTime>,
    pub notes: Option<String>,
    pub status: RequestContributionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A donor's pledge made directly against a donation, collected by pickup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupContribution {
    pub id: Uuid,
    pub donation_id: Uuid,
    pub donor_id: Uuid,
    pub ngo_id: Uuid,
    pub quantity_or_amount: f64,
    pub pickup_location: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub pickup_at: Option<OffsetDateTime>,
    pub notes: Option<String>,
    pub status: PickupContributionStatus,
    pub pickup_status: PickupStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum Contribution {
    Request(RequestContribution),
    Pickup(PickupContribution),
}

impl Contribution {
    pub fn created_at(&self) -> OffsetDateTime {
        match self {
            Self::Request(c) => c.created_at,
            Self::Pickup(c) => c.created_at,
        }
    }

    pub fn donor_id(&self) -> Uuid {
        match self {
            Self::Request(c) => c.donor_id,
            Self::Pickup(c) => c.donor_id,
        }
    }

    pub fn ngo_id(&self) -> Uuid {
        match self {
            Self::Request(c) => c.ngo_id,
            Self::Pickup(c) => c.ngo_id,
        }
    }
}

/// Body of a contribute call, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionPayload {
    #[serde(alias = "quantity", alias = "amount")]
    pub quantity_or_amount: Option<f64>,
    pub pickup_location: Option<String>,
    pub pickup_date: Option<String>,
    pub pickup_time: Option<String>,
    pub contact_phone: Option<String>,
    pub notes: Option<String>,
}

/// A payload that passed field, numeric and date validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidContribution {
    pub quantity_or_amount: f64,
    pub pickup: Option<PickupSlot>,
    pub contact_phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PickupSlot {
    pub location: String,
    pub at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("quantityOrAmount must be a positive number")]
    NotPositive,
    #[error("invalid pickup date or time")]
    InvalidPickupTime,
    #[error("pickup time must be in the future")]
    PickupInPast,
}

impl ContributionPayload {
    /// Checks run in a fixed order so the same bad payload always yields the
    /// same message: presence, then numeric validity, then the pickup date.
    pub fn validate(
        &self,
        requires_pickup: bool,
        now: OffsetDateTime,
    ) -> Result<ValidContribution, PayloadError> {
        let mut missing = Vec::new();
        if self.quantity_or_amount.is_none() {
            missing.push("quantityOrAmount");
        }
        if requires_pickup {
            if is_blank(&self.pickup_location) {
                missing.push("pickupLocation");
            }
            if is_blank(&self.pickup_date) {
                missing.push("pickupDate");
            }
            if is_blank(&self.pickup_time) {
                missing.push("pickupTime");
            }
        }
        if !missing.is_empty() {
            return Err(PayloadError::MissingFields(missing));
        }

        let quantity_or_amount = self.quantity_or_amount.unwrap_or_default();
        if !quantity_or_amount.is_finite() || quantity_or_amount <= 0.0 {
            return Err(PayloadError::NotPositive);
        }

        let pickup = if requires_pickup {
            let (Some(location), Some(date), Some(time)) = (
                self.pickup_location.as_deref(),
                self.pickup_date.as_deref(),
                self.pickup_time.as_deref(),
            ) else {
                return Err(PayloadError::InvalidPickupTime);
            };
            let at = compose_pickup_time(date, time)?;
            if at <= now {
                return Err(PayloadError::PickupInPast);
            }
            Some(PickupSlot {
                location: location.trim().to_string(),
                at,
            })
        } else {
            None
        };

        Ok(ValidContribution {
            quantity_or_amount,
            pickup,
            contact_phone: trimmed(&self.contact_phone),
            notes: trimmed(&self.notes),
        })
    }
}

/// Joins a `YYYY-MM-DD` date and an `HH:MM[:SS]` time into a UTC instant.
/// A full ISO timestamp in the date field contributes only its date part.
pub fn compose_pickup_time(date: &str, time: &str) -> Result<OffsetDateTime, PayloadError> {
    let date = date.trim();
    let date = match date.find('T') {
        Some(idx) => &date[..idx],
        None => date,
    };
    let date = Date::parse(date, format_description!("[year]-[month]-[day]"))
        .map_err(|_| PayloadError::InvalidPickupTime)?;

    let time = time.trim();
    let time = Time::parse(time, format_description!("[hour]:[minute]"))
        .or_else(|_| Time::parse(time, format_description!("[hour]:[minute]:[second]")))
        .map_err(|_| PayloadError::InvalidPickupTime)?;

    Ok(PrimitiveDateTime::new(date, time).assume_utc())
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
