//! Admin Audit Trail
//!
//! Append-only record of every privileged action. Writes are spawned onto
//! the runtime and never fail the request that triggered them.

pub mod actions;

use std::fmt::Display;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::context::AdminContext;
use crate::db::{AuditOutcome, AuditSink, NewAuditEntry};

/// Best-effort writer over an [`AuditSink`].
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Queue an entry. Failures are logged and swallowed.
    pub fn record(&self, entry: NewAuditEntry) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!(action = %entry.action, "No runtime available, audit entry dropped");
            return;
        };

        let sink = self.sink.clone();
        handle.spawn(async move {
            let action = entry.action.clone();
            let admin_id = entry.admin_id;
            match sink.insert(entry).await {
                Ok(written) => debug!(audit_id = %written.id, action = %action, "Audit entry written"),
                Err(e) => error!(
                    admin_id = %admin_id,
                    action = %action,
                    error = %e,
                    "Failed to write audit entry"
                ),
            }
        });
    }

    /// Record a single outcome for `ctx` without a guard.
    pub fn record_for(
        &self,
        ctx: &AdminContext,
        action: &str,
        resource_type: &str,
        outcome: AuditOutcome,
        metadata: Value,
    ) {
        let mut entry = base_entry(ctx, action, resource_type);
        entry.outcome = outcome;
        entry.metadata = metadata;
        self.record(entry);
    }

    /// Open a guard that writes exactly one entry for this execution path.
    pub fn trail(&self, ctx: &AdminContext, action: &str, resource_type: &str) -> AuditTrail {
        AuditTrail {
            logger: self.clone(),
            entry: Some(base_entry(ctx, action, resource_type)),
            metadata: Map::new(),
        }
    }
}

fn base_entry(ctx: &AdminContext, action: &str, resource_type: &str) -> NewAuditEntry {
    NewAuditEntry {
        admin_id: ctx.profile.id,
        action: action.to_string(),
        resource_type: resource_type.to_string(),
        outcome: AuditOutcome::Failure,
        resource_id: None,
        metadata: Value::Object(Map::new()),
        ip_address: Some(ctx.client.ip.clone()),
        user_agent: ctx.client.user_agent.clone(),
        actor_label: Some(ctx.actor_label()),
    }
}

/// Guard for one audited handler execution.
///
/// Completing it with [`success`](Self::success), [`failure`](Self::failure)
/// or [`finish`](Self::finish) writes the entry. Dropping it unfinished
/// (early return, panic) writes a failure entry instead.
#[must_use = "an unfinished audit trail records a failure when dropped"]
pub struct AuditTrail {
    logger: AuditLogger,
    entry: Option<NewAuditEntry>,
    metadata: Map<String, Value>,
}

impl AuditTrail {
    /// Change the action, e.g. when a failure escalates to a lockout.
    pub fn set_action(&mut self, action: &str) -> &mut Self {
        if let Some(entry) = self.entry.as_mut() {
            entry.action = action.to_string();
        }
        self
    }

    pub fn resource_id(&mut self, id: impl Into<String>) -> &mut Self {
        if let Some(entry) = self.entry.as_mut() {
            entry.resource_id = Some(id.into());
        }
        self
    }

    pub fn meta(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    fn complete(&mut self, outcome: AuditOutcome) {
        if let Some(mut entry) = self.entry.take() {
            entry.outcome = outcome;
            entry.metadata = Value::Object(std::mem::take(&mut self.metadata));
            self.logger.record(entry);
        }
    }

    pub fn success(mut self) {
        self.complete(AuditOutcome::Success);
    }

    pub fn failure(mut self, reason: impl Display) {
        self.meta("reason", reason.to_string());
        self.complete(AuditOutcome::Failure);
    }

    /// Record the outcome matching `result` and pass it through.
    pub fn finish<T, E: Display>(self, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => self.success(),
            Err(e) => self.failure(e),
        }
        result
    }
}

impl Drop for AuditTrail {
    fn drop(&mut self) {
        if self.entry.is_some() {
            let reason = if std::thread::panicking() {
                "panicked"
            } else {
                "aborted"
            };
            self.metadata
                .insert("reason".to_string(), Value::String(reason.to_string()));
            self.complete(AuditOutcome::Failure);
        }
    }
}
