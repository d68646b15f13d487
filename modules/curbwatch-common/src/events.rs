//! Domain events — facts about what happened to reports and issues.
//!
//! Published fire-and-forget after the owning transaction commits; subscribers
//! (activity log, notifications) consume them asynchronously. The `type` tag
//! is the event type string on the wire.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Category, GeoPoint, IssueStatus, ReportStatus, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    IssueCreated {
        issue_id: Uuid,
        category: Category,
        location: GeoPoint,
        severity: Severity,
    },

    IssueStatusChanged {
        issue_id: Uuid,
        previous: IssueStatus,
        new: IssueStatus,
    },

    ReportValidated {
        report_id: Uuid,
        status: ReportStatus,
        issue_id: Option<Uuid>,
    },
}

impl DomainEvent {
    /// Stable event type string, used for logging and subscriber filtering.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::IssueCreated { .. } => "issue:created",
            DomainEvent::IssueStatusChanged { .. } => "issue:status_changed",
            DomainEvent::ReportValidated { .. } => "report:validated",
        }
    }
}
