//! Status lifecycles for contributions, pickups and payments.
//!
//! Every transition is a pure function of the current and requested state.
//! Storage applies the result with a conditional update keyed on the state
//! that was validated here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{entity} is already {state}")]
    Unchanged {
        entity: &'static str,
        state: &'static str,
    },
    #[error("{entity} cannot return to {to} once it is {from}")]
    Reversal {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },
    #[error("{entity} is {from} and can no longer change status")]
    Terminal {
        entity: &'static str,
        from: &'static str,
    },
    #[error("{entity} cannot move from {from} to {to}")]
    NotAllowed {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },
    #[error("{entity} already resolved as {state}")]
    AlreadyResolved {
        entity: &'static str,
        state: &'static str,
    },
    #[error("{0}")]
    Rule(&'static str),
}

/// Status of a contribution made against a donation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestContributionStatus {
    Pending,
    Accepted,
    NotReceived,
}

impl RequestContributionStatus {
    const ENTITY: &'static str = "contribution";

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "ACCEPTED" => Some(Self::Accepted),
            "NOT_RECEIVED" => Some(Self::NotReceived),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::NotReceived => "NOT_RECEIVED",
        }
    }

    pub fn transition(self, to: Self) -> Result<Self, TransitionError> {
        match (self, to) {
            (Self::Pending, Self::Pending) => Err(TransitionError::Unchanged {
                entity: Self::ENTITY,
                state: self.as_db(),
            }),
            (Self::Pending, next) => Ok(next),
            (from, Self::Pending) => Err(TransitionError::Reversal {
                entity: Self::ENTITY,
                from: from.as_db(),
                to: to.as_db(),
            }),
            (from, next) if from == next => Err(TransitionError::Unchanged {
                entity: Self::ENTITY,
                state: from.as_db(),
            }),
            (from, _) => Err(TransitionError::Terminal {
                entity: Self::ENTITY,
                from: from.as_db(),
            }),
        }
    }
}

/// Status of a contribution made directly against a donation with a pickup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PickupContributionStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl PickupContributionStatus {
    const ENTITY: &'static str = "contribution";

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Completed => "COMPLETED",
        }
    }

    /// The paired pickup constrains the move: a cancelled pickup can no
    /// longer be approved or completed.
    pub fn transition(self, to: Self, pickup: PickupStatus) -> Result<Self, TransitionError> {
        if self == to {
            return Err(TransitionError::Unchanged {
                entity: Self::ENTITY,
                state: self.as_db(),
            });
        }
        if pickup == PickupStatus::Cancelled && matches!(to, Self::Approved | Self::Completed) {
            return Err(TransitionError::Rule(
                "contribution cannot be approved or completed once its pickup is CANCELLED",
            ));
        }

        match (self, to) {
            (Self::Pending, Self::Approved | Self::Rejected) => Ok(to),
            (Self::Pending, Self::Completed) => Err(TransitionError::Rule(
                "contribution must be approved before it can be completed",
            )),
            (Self::Approved, Self::Completed) => Ok(to),
            (from, Self::Pending) => Err(TransitionError::Reversal {
                entity: Self::ENTITY,
                from: from.as_db(),
                to: to.as_db(),
            }),
            (from @ (Self::Rejected | Self::Completed), _) => Err(TransitionError::Terminal {
                entity: Self::ENTITY,
                from: from.as_db(),
            }),
            (from, to) => Err(TransitionError::NotAllowed {
                entity: Self::ENTITY,
                from: from.as_db(),
                to: to.as_db(),
            }),
        }
    }
}

/// Physical pickup sub-status paired with a pickup contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PickupStatus {
    Scheduled,
    PickedUp,
    Cancelled,
}

/// Outcome of a pickup transition: both halves of the pair as they must be
/// written together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickupTransition {
    pub pickup_status: PickupStatus,
    pub contribution_status: PickupContributionStatus,
}

impl PickupStatus {
    const ENTITY: &'static str = "pickup";

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "SCHEDULED" => Some(Self::Scheduled),
            "PICKED_UP" => Some(Self::PickedUp),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::PickedUp => "PICKED_UP",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn transition(
        self,
        to: Self,
        contribution: PickupContributionStatus,
    ) -> Result<PickupTransition, TransitionError> {
        match (self, to) {
            (Self::Scheduled, Self::Scheduled) => Err(TransitionError::Unchanged {
                entity: Self::ENTITY,
                state: self.as_db(),
            }),
            (Self::Scheduled, Self::PickedUp) => {
                if contribution == PickupContributionStatus::Rejected {
                    return Err(TransitionError::Rule(
                        "a rejected contribution cannot be picked up",
                    ));
                }
                Ok(PickupTransition {
                    pickup_status: Self::PickedUp,
                    contribution_status: PickupContributionStatus::Completed,
                })
            }
            (Self::Scheduled, Self::Cancelled) => {
                if contribution == PickupContributionStatus::Completed {
                    return Err(TransitionError::Rule(
                        "pickup of a completed contribution cannot be cancelled",
                    ));
                }
                Ok(PickupTransition {
                    pickup_status: Self::Cancelled,
                    contribution_status: contribution,
                })
            }
            (from, Self::Scheduled) => Err(TransitionError::Reversal {
                entity: Self::ENTITY,
                from: from.as_db(),
                to: to.as_db(),
            }),
            (from, next) if from == next => Err(TransitionError::Unchanged {
                entity: Self::ENTITY,
                state: from.as_db(),
            }),
            (from, _) => Err(TransitionError::Terminal {
                entity: Self::ENTITY,
                from: from.as_db(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    const ENTITY: &'static str = "payment";

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    /// A payment resolves exactly once, from PENDING to an outcome.
    pub fn resolve(self, outcome: Self) -> Result<Self, TransitionError> {
        if self != Self::Pending {
            return Err(TransitionError::AlreadyResolved {
                entity: Self::ENTITY,
                state: self.as_db(),
            });
        }
        match outcome {
            Self::Pending => Err(TransitionError::Rule(
                "payment can only be verified as SUCCESS or FAILED",
            )),
            outcome => Ok(outcome),
        }
    }
}
