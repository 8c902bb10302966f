use anyhow::Result;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::infra::db::Db;

/// Which party's schedule a pickup time is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyScope {
    Ngo,
    Donor,
}

impl PartyScope {
    pub fn conflict_message(&self, window_minutes: i32) -> String {
        let who = match self {
            Self::Ngo => "the NGO already has",
            Self::Donor => "you already have",
        };
        format!(
            "{} a pickup scheduled within {} minutes of this time; please choose another slot",
            who, window_minutes
        )
    }
}

/// Earliest and latest pickup times that collide with `proposed`. Both
/// bounds are inclusive; the schedule queries bind them as given.
pub fn pickup_window(proposed: OffsetDateTime, window: Duration) -> (OffsetDateTime, OffsetDateTime) {
    (proposed - window, proposed + window)
}

/// Whether `existing` falls inside [`pickup_window`] around `proposed`.
pub fn within_pickup_window(
    existing: OffsetDateTime,
    proposed: OffsetDateTime,
    window: Duration,
) -> bool {
    let (earliest, latest) = pickup_window(proposed, window);
    earliest <= existing && existing <= latest
}

// A slot is held by a pickup contribution that is still scheduled and not yet
// resolved, or by a request contribution the NGO has not yet decided on.
const NGO_SCHEDULE_SQL: &str = "SELECT EXISTS ( \
        SELECT 1 FROM donation_contributions c \
        JOIN donations d ON d.id = c.donation_id \
        WHERE d.ngo_id = $1 \
          AND c.pickup_status = 'SCHEDULED' \
          AND c.status IN ('PENDING', 'APPROVED') \
          AND c.pickup_at BETWEEN $2 AND $3 \
        UNION ALL \
        SELECT 1 FROM request_contributions rc \
        JOIN donation_requests r ON r.id = rc.request_id \
        WHERE r.ngo_id = $1 \
          AND rc.status = 'PENDING' \
          AND rc.pickup_at BETWEEN $2 AND $3 \
    )";

const DONOR_SCHEDULE_SQL: &str = "SELECT EXISTS ( \
        SELECT 1 FROM donation_contributions c \
        WHERE c.donor_id = $1 \
          AND c.pickup_status = 'SCHEDULED' \
          AND c.status IN ('PENDING', 'APPROVED') \
          AND c.pickup_at BETWEEN $2 AND $3 \
        UNION ALL \
        SELECT 1 FROM request_contributions rc \
        WHERE rc.donor_id = $1 \
          AND rc.status = 'PENDING' \
          AND rc.pickup_at BETWEEN $2 AND $3 \
    )";

#[derive(Clone)]
pub struct ConflictWindowChecker {
    db: Db,
    window_minutes: i32,
}

impl ConflictWindowChecker {
    pub fn new(db: Db, window_minutes: i32) -> Self {
        Self { db, window_minutes }
    }

    pub fn window_minutes(&self) -> i32 {
        self.window_minutes
    }

    pub async fn is_conflicting(
        &self,
        party_id: Uuid,
        scope: PartyScope,
        proposed: OffsetDateTime,
    ) -> Result<bool> {
        let sql = match scope {
            PartyScope::Ngo => NGO_SCHEDULE_SQL,
            PartyScope::Donor => DONOR_SCHEDULE_SQL,
        };

        let (earliest, latest) =
            pickup_window(proposed, Duration::minutes(i64::from(self.window_minutes)));

        let conflicting: bool = sqlx::query_scalar(sql)
            .bind(party_id)
            .bind(earliest)
            .bind(latest)
            .fetch_one(self.db.pool())
            .await?;

        Ok(conflicting)
    }

    /// Checks the NGO side first, then the donor side. Returns the first scope
    /// that already holds a pickup near `proposed`.
    pub async fn find_conflict(
        &self,
        ngo_id: Uuid,
        donor_id: Uuid,
        proposed: OffsetDateTime,
    ) -> Result<Option<PartyScope>> {
        if self.is_conflicting(ngo_id, PartyScope::Ngo, proposed).await? {
            tracing::debug!(ngo_id = %ngo_id, "pickup slot taken on the NGO schedule");
            return Ok(Some(PartyScope::Ngo));
        }
        if self.is_conflicting(donor_id, PartyScope::Donor, proposed).await? {
            tracing::debug!(donor_id = %donor_id, "pickup slot taken on the donor schedule");
            return Ok(Some(PartyScope::Donor));
        }
        Ok(None)
    }
}
