//! Event subscribers.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use curbwatch_common::events::DomainEvent;

/// A best-effort consumer of domain events. A failing subscriber is logged
/// and skipped; it cannot affect the publisher or its peers.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &DomainEvent) -> Result<()>;
}

/// Structured activity log of everything that happened to reports and issues.
pub struct ActivityLog;

#[async_trait]
impl EventSubscriber for ActivityLog {
    fn name(&self) -> &'static str {
        "activity-log"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        match event {
            DomainEvent::IssueCreated {
                issue_id,
                category,
                location,
                severity,
            } => {
                info!(
                    issue_id = %issue_id,
                    category = %category,
                    lat = location.lat,
                    lng = location.lng,
                    severity = %severity,
                    "Issue created"
                );
            }
            DomainEvent::IssueStatusChanged {
                issue_id,
                previous,
                new,
            } => {
                info!(
                    issue_id = %issue_id,
                    previous = %previous,
                    new = %new,
                    "Issue status changed"
                );
            }
            DomainEvent::ReportValidated {
                report_id,
                status,
                issue_id,
            } => {
                info!(
                    report_id = %report_id,
                    status = %status,
                    issue_id = ?issue_id,
                    "Report validated"
                );
            }
        }
        Ok(())
    }
}
