//! Second-factor gate state and per-session verification flags.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::Role;
use crate::clock::Clock;
use crate::db::AdminProfile;

/// Second-factor state of an admin within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondFactorState {
    /// Not a super admin, or 2FA never confirmed.
    NotRequired,
    /// Challenge pending for this session.
    Required,
    /// Verified in this session.
    Satisfied,
}

impl SecondFactorState {
    /// Evaluate the gate. Only a super admin with confirmed 2FA is ever challenged.
    pub const fn evaluate(profile: &AdminProfile, verified_at: Option<DateTime<Utc>>) -> Self {
        let enrolled = matches!(profile.role, Role::SuperAdmin)
            && profile.two_fa_enabled
            && profile.two_fa_verified_at.is_some();

        if !enrolled {
            Self::NotRequired
        } else if verified_at.is_some() {
            Self::Satisfied
        } else {
            Self::Required
        }
    }

    pub const fn allows_access(self) -> bool {
        !matches!(self, Self::Required)
    }
}

/// Hex SHA-256 fingerprint of a bearer token. Tokens are never stored raw.
pub fn session_key(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[derive(Debug, Clone, Copy)]
struct Verification {
    admin_id: Uuid,
    verified_at: DateTime<Utc>,
}

/// Per-session 2FA verification flags with a fixed lifetime.
pub struct SessionVerifications {
    entries: DashMap<String, Verification>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionVerifications {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    /// Record a successful second-factor check for this session.
    pub fn mark_verified(&self, session_key: &str, admin_id: Uuid) -> DateTime<Utc> {
        let verified_at = self.clock.now();
        self.entries.insert(
            session_key.to_string(),
            Verification {
                admin_id,
                verified_at,
            },
        );
        verified_at
    }

    /// Verification time for this session, if any and not expired.
    pub fn verified_at(&self, session_key: &str, admin_id: Uuid) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        let entry = self.entries.get(session_key).map(|e| *e)?;

        if now - entry.verified_at > self.ttl {
            self.entries.remove(session_key);
            return None;
        }

        // A token fingerprint bound to another admin never satisfies the gate.
        (entry.admin_id == admin_id).then_some(entry.verified_at)
    }

    pub fn revoke(&self, session_key: &str) {
        self.entries.remove(session_key);
    }

    /// Drop every session flag belonging to an admin.
    pub fn revoke_admin(&self, admin_id: Uuid) {
        self.entries.retain(|_, v| v.admin_id != admin_id);
    }

    /// Evict expired flags.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        self.entries.retain(|_, v| now - v.verified_at <= self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
