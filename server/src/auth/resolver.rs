//! Admin profile resolution.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::{AdminProfile, AdminStore, StoreResult};

/// Why a principal did or did not resolve to a usable admin profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Active(AdminProfile),
    NotFound,
    Inactive,
    /// A pending force-logout was consumed by this lookup.
    ForcedLogout { admin_id: Uuid },
}

/// Maps a verified principal to its admin profile. Never caches.
pub struct ProfileResolver {
    store: Arc<dyn AdminStore>,
    clock: Arc<dyn Clock>,
}

impl ProfileResolver {
    pub fn new(store: Arc<dyn AdminStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Fresh lookup with active-status and force-logout checks.
    ///
    /// A force-logout timestamp that has passed denies this lookup and is
    /// cleared, so the next lookup can succeed.
    pub async fn resolve_detailed(&self, principal_id: &str) -> StoreResult<ResolveOutcome> {
        let Some(profile) = self.store.find_by_principal(principal_id).await? else {
            return Ok(ResolveOutcome::NotFound);
        };

        if !profile.is_active {
            return Ok(ResolveOutcome::Inactive);
        }

        if let Some(at) = profile.force_logout_at {
            if at <= self.clock.now() {
                info!(admin_id = %profile.id, "Consuming force-logout marker");
                if let Err(e) = self.store.clear_force_logout(profile.id).await {
                    warn!(admin_id = %profile.id, error = %e, "Failed to clear force-logout marker");
                }
                return Ok(ResolveOutcome::ForcedLogout {
                    admin_id: profile.id,
                });
            }
        }

        Ok(ResolveOutcome::Active(profile))
    }

    /// Resolve to a profile, or `None` when any check denies it.
    pub async fn resolve(&self, principal_id: &str) -> StoreResult<Option<AdminProfile>> {
        Ok(match self.resolve_detailed(principal_id).await? {
            ResolveOutcome::Active(profile) => Some(profile),
            _ => None,
        })
    }
}
