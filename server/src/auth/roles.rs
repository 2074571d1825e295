//! Admin role hierarchy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::AdminProfile;

/// Admin role, totally ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Analyst,
    Moderator,
    SuperAdmin,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analyst => "analyst",
            Self::Moderator => "moderator",
            Self::SuperAdmin => "super_admin",
        }
    }

    /// Numeric rank: analyst(1) < moderator(2) < `super_admin(3)`.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Analyst => 1,
            Self::Moderator => 2,
            Self::SuperAdmin => 3,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analyst" => Ok(Self::Analyst),
            "moderator" => Ok(Self::Moderator),
            "super_admin" => Ok(Self::SuperAdmin),
            _ => Err(()),
        }
    }
}

/// Whether the profile's rank is at least `required`.
pub const fn has_role(profile: &AdminProfile, required: Role) -> bool {
    profile.role.rank() >= required.rank()
}

/// Whether the profile holds exactly `role`.
pub fn is_role(profile: &AdminProfile, role: Role) -> bool {
    profile.role == role
}

/// Role check attached to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleRequirement {
    /// Hierarchy check.
    AtLeast(Role),
    /// Exact-match check.
    Exactly(Role),
}

impl RoleRequirement {
    pub fn is_satisfied_by(self, profile: &AdminProfile) -> bool {
        match self {
            Self::AtLeast(role) => has_role(profile, role),
            Self::Exactly(role) => is_role(profile, role),
        }
    }

    pub const fn role(self) -> Role {
        match self {
            Self::AtLeast(role) | Self::Exactly(role) => role,
        }
    }
}
