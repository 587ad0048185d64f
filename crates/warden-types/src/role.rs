//! Role types
//!
//! Roles travel inside access tokens as a denormalized label. Authorization
//! compares numeric ranks, never labels, and any label this build does not
//! know resolves to the lowest rank.

use serde::{Deserialize, Serialize};

/// Principal role, ordered from least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Unknown or unrecognised role
    Guest,
    /// Regular signed-in user
    User,
    /// Agent acting on listings and appraisals
    Agent,
    /// Administrator
    Admin,
    /// Super administrator with full access
    SuperAdmin,
}

impl Role {
    /// Every role, lowest rank first
    pub const ALL: [Role; 5] = [
        Self::Guest,
        Self::User,
        Self::Agent,
        Self::Admin,
        Self::SuperAdmin,
    ];

    /// Numeric rank used for authorization decisions
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Guest => 0,
            Self::User => 10,
            Self::Agent => 20,
            Self::Admin => 30,
            Self::SuperAdmin => 40,
        }
    }

    /// Stable label embedded in token claims
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::User => "user",
            Self::Agent => "agent",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }

    /// Resolve a label to a role. Unknown labels map to [`Role::Guest`].
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "user" => Self::User,
            "agent" => Self::Agent,
            "admin" => Self::Admin,
            "super_admin" | "superadmin" => Self::SuperAdmin,
            _ => Self::Guest,
        }
    }

    /// Whether this role satisfies `required`
    pub const fn satisfies(&self, required: Role) -> bool {
        self.rank() >= required.rank()
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::Guest
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
