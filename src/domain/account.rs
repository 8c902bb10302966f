use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The three kinds of actor the platform knows about. Each lives in its own
/// table and receives notifications under its own user type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Donor,
    Ngo,
    Admin,
}

impl Role {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "DONOR" => Some(Self::Donor),
            "NGO" => Some(Self::Ngo),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Donor => "DONOR",
            Self::Ngo => "NGO",
            Self::Admin => "ADMIN",
        }
    }

    /// Table holding credentials for this role.
    pub fn account_table(&self) -> &'static str {
        match self {
            Self::Donor => "donors",
            Self::Ngo => "ngos",
            Self::Admin => "admins",
        }
    }

    fn channel_prefix(&self) -> &'static str {
        match self {
            Self::Donor => "donor",
            Self::Ngo => "ngo",
            Self::Admin => "admin",
        }
    }
}

/// Real-time channel for one identity: `{role}:{userId}`.
pub fn channel_key(role: Role, user_id: Uuid) -> String {
    format!("{}:{}", role.channel_prefix(), user_id)
}

/// An authenticated party acting on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    /// Admins act on everything; NGOs only on what they own.
    pub fn can_manage(&self, owner_ngo_id: Uuid) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Ngo => self.id == owner_ngo_id,
            Role::Donor => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl DonorProfile {
    pub fn needs_backfill(&self) -> bool {
        self.phone.is_none() || self.address.is_none()
    }
}
