//! Audit notifications.
//!
//! The library reports create/update/delete events to an [`Auditor`] and never
//! waits on or branches on what the auditor does with them.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

/// Kind of change being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }
}

/// Entity an audit event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum AuditTarget {
    Folder(i64),
    File(i64),
}

impl fmt::Display for AuditTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditTarget::Folder(id) => write!(f, "folder:{id}"),
            AuditTarget::File(id) => write!(f, "file:{id}"),
        }
    }
}

/// One audited change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub actor_id: i64,
    pub target: AuditTarget,
    pub action: AuditAction,
    /// Free-form details (names, counts, ...).
    pub details: Value,
}

impl AuditEvent {
    pub fn new(actor_id: i64, target: AuditTarget, action: AuditAction, details: Value) -> Self {
        Self {
            actor_id,
            target,
            action,
            details,
        }
    }
}

/// Fire-and-forget sink for audit events.
pub trait Auditor: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Writes audit events to the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditor;

impl Auditor for TracingAuditor {
    fn record(&self, event: &AuditEvent) {
        info!(
            target: "audit",
            actor_id = event.actor_id,
            target_id = %event.target,
            action = event.action.as_str(),
            details = %event.details,
            "library change"
        );
    }
}

/// Discards audit events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditor;

impl Auditor for NoopAuditor {
    fn record(&self, _event: &AuditEvent) {}
}
