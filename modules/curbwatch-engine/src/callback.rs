//! Validation Callback Handler — the state machine driving a report through
//! Pending -> {Approved, Declined} when the external classifier reports back.
//!
//! The transition decision is a pure function; the handler wraps it with
//! payload validation and a single store transaction. On approval the status
//! change, the issue match, and the attachment commit together — a failure
//! anywhere leaves the report Pending and the callback retryable.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use curbwatch_common::events::DomainEvent;
use curbwatch_common::types::{Category, ReportStatus};
use curbwatch_common::CurbwatchError;

use crate::matcher::IssueMatcher;
use crate::traits::{Store, StoreTxn};

/// Classifier outcome for a report's image, as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageStatus {
    Approved,
    Declined,
}

/// Raw webhook body from the classifier. `category` stays a string until
/// validation so an unrecognized value becomes a field error, not a 422 from
/// the deserializer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub task_id: String,
    pub image_status: ImageStatus,
    pub category: String,
    pub threshold: f64,
    pub api_key: String,
}

/// A field-level validation failure, reported back in the failure envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Payload after validation: trimmed task id, recognized category, threshold
/// in range.
#[derive(Debug, Clone)]
pub struct ValidatedCallback {
    pub task_id: String,
    pub image_status: ImageStatus,
    pub category: Category,
    pub threshold: f64,
}

/// Validate a callback payload before any state is touched.
pub fn validate_payload(payload: &CallbackPayload) -> Result<ValidatedCallback, Vec<FieldError>> {
    let mut errors = Vec::new();

    let task_id = payload.task_id.trim();
    if task_id.is_empty() {
        errors.push(FieldError::new("taskId", "task id must not be empty"));
    }

    let category = Category::parse(&payload.category);
    if category.is_none() {
        errors.push(FieldError::new("category", "unrecognized category"));
    }

    if !payload.threshold.is_finite() || !(0.0..=1.0).contains(&payload.threshold) {
        errors.push(FieldError::new("threshold", "threshold must be within [0, 1]"));
    }

    match category {
        Some(category) if errors.is_empty() => Ok(ValidatedCallback {
            task_id: task_id.to_string(),
            image_status: payload.image_status,
            category,
            threshold: payload.threshold,
        }),
        _ => Err(errors),
    }
}

// ---------------------------------------------------------------------------
// CallbackVerdict — pure transition decision
// ---------------------------------------------------------------------------

/// The transition a callback produces for a report in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackVerdict {
    /// Pending report, classifier approved: attach to an issue.
    Approve,
    /// Pending report, classifier declined: terminal, no attachment.
    Decline,
    /// Report already left Pending — duplicate or late delivery, reject.
    NotPending,
}

/// Pure decision function for the callback state machine.
///
/// Only a Pending report transitions; anything else is rejected so repeated
/// deliveries of the same task id are safe.
pub fn callback_verdict(current: ReportStatus, image_status: ImageStatus) -> CallbackVerdict {
    match (current, image_status) {
        (ReportStatus::Pending, ImageStatus::Approved) => CallbackVerdict::Approve,
        (ReportStatus::Pending, ImageStatus::Declined) => CallbackVerdict::Decline,
        _ => CallbackVerdict::NotPending,
    }
}

// ---------------------------------------------------------------------------
// CallbackHandler
// ---------------------------------------------------------------------------

/// Result of a processed callback, carrying the domain events to publish and
/// the entities whose cached views must be invalidated — both after commit.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub report_id: Uuid,
    pub reporter_id: Option<Uuid>,
    pub status: ReportStatus,
    pub issue_id: Option<Uuid>,
    pub events: Vec<DomainEvent>,
}

pub struct CallbackHandler<S: Store> {
    store: Arc<S>,
    matcher: IssueMatcher,
}

impl<S: Store> CallbackHandler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            matcher: IssueMatcher::default(),
        }
    }

    /// Drive a validated callback through the state machine.
    ///
    /// Domain rejections (`ReportNotFound`, `ReportNotPending`) leave no state
    /// change. On success the returned outcome lists the post-commit side
    /// effects for the caller to dispatch.
    pub async fn handle(&self, cb: ValidatedCallback) -> Result<CallbackOutcome, CurbwatchError> {
        let report = self
            .store
            .report_by_task_id(&cb.task_id)
            .await?
            .ok_or_else(|| CurbwatchError::ReportNotFound(cb.task_id.clone()))?;

        match callback_verdict(report.status, cb.image_status) {
            CallbackVerdict::NotPending => Err(CurbwatchError::ReportNotPending(report.id)),

            CallbackVerdict::Decline => {
                let mut txn = self.store.begin().await?;
                txn.update_report_validation(report.id, ReportStatus::Declined, None, None)
                    .await?;
                S::commit(txn).await?;

                info!(report_id = %report.id, task_id = %cb.task_id, "Report declined");
                Ok(CallbackOutcome {
                    report_id: report.id,
                    reporter_id: report.reporter_id,
                    status: ReportStatus::Declined,
                    issue_id: None,
                    events: vec![DomainEvent::ReportValidated {
                        report_id: report.id,
                        status: ReportStatus::Declined,
                        issue_id: None,
                    }],
                })
            }

            CallbackVerdict::Approve => {
                let mut txn = self.store.begin().await?;
                txn.update_report_validation(
                    report.id,
                    ReportStatus::Approved,
                    Some(cb.category),
                    Some(cb.threshold),
                )
                .await?;

                let issue_ref = self
                    .matcher
                    .find_or_create(&mut txn, report.location, cb.category, &report.locality)
                    .await?;
                txn.attach_report(report.id, issue_ref.issue_id).await?;
                S::commit(txn).await?;

                info!(
                    report_id = %report.id,
                    issue_id = %issue_ref.issue_id,
                    issue_created = issue_ref.created,
                    threshold = cb.threshold,
                    "Report approved and attached"
                );

                let mut events = Vec::with_capacity(2);
                if issue_ref.created {
                    events.push(DomainEvent::IssueCreated {
                        issue_id: issue_ref.issue_id,
                        category: cb.category,
                        location: report.location,
                        severity: cb.category.default_severity(),
                    });
                }
                events.push(DomainEvent::ReportValidated {
                    report_id: report.id,
                    status: ReportStatus::Approved,
                    issue_id: Some(issue_ref.issue_id),
                });

                Ok(CallbackOutcome {
                    report_id: report.id,
                    reporter_id: report.reporter_id,
                    status: ReportStatus::Approved,
                    issue_id: Some(issue_ref.issue_id),
                    events,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(task_id: &str, category: &str, threshold: f64) -> CallbackPayload {
        CallbackPayload {
            task_id: task_id.to_string(),
            image_status: ImageStatus::Approved,
            category: category.to_string(),
            threshold,
            api_key: "secret".to_string(),
        }
    }

    // --- validate_payload tests ---

    #[test]
    fn valid_payload_passes() {
        let v = validate_payload(&payload("task-1", "pothole", 0.92)).unwrap();
        assert_eq!(v.task_id, "task-1");
        assert_eq!(v.category, Category::Pothole);
        assert_eq!(v.threshold, 0.92);
    }

    #[test]
    fn task_id_is_trimmed() {
        let v = validate_payload(&payload("  task-1  ", "pothole", 0.5)).unwrap();
        assert_eq!(v.task_id, "task-1");
    }

    #[test]
    fn empty_task_id_rejected() {
        let errs = validate_payload(&payload("   ", "pothole", 0.5)).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].field, "taskId");
    }

    #[test]
    fn unrecognized_category_rejected() {
        let errs = validate_payload(&payload("task-1", "sinkhole", 0.5)).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].field, "category");
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let errs = validate_payload(&payload("task-1", "pothole", 1.01)).unwrap_err();
        assert_eq!(errs[0].field, "threshold");
        let errs = validate_payload(&payload("task-1", "pothole", -0.01)).unwrap_err();
        assert_eq!(errs[0].field, "threshold");
    }

    #[test]
    fn threshold_nan_rejected() {
        let errs = validate_payload(&payload("task-1", "pothole", f64::NAN)).unwrap_err();
        assert_eq!(errs[0].field, "threshold");
    }

    #[test]
    fn threshold_boundaries_accepted() {
        assert!(validate_payload(&payload("t", "pothole", 0.0)).is_ok());
        assert!(validate_payload(&payload("t", "pothole", 1.0)).is_ok());
    }

    #[test]
    fn multiple_failures_all_reported() {
        let errs = validate_payload(&payload("", "nope", 2.0)).unwrap_err();
        assert_eq!(errs.len(), 3);
    }

    // --- callback_verdict tests ---

    #[test]
    fn pending_approved_gives_approve() {
        assert_eq!(
            callback_verdict(ReportStatus::Pending, ImageStatus::Approved),
            CallbackVerdict::Approve
        );
    }

    #[test]
    fn pending_declined_gives_decline() {
        assert_eq!(
            callback_verdict(ReportStatus::Pending, ImageStatus::Declined),
            CallbackVerdict::Decline
        );
    }

    #[test]
    fn approved_report_rejects_any_callback() {
        assert_eq!(
            callback_verdict(ReportStatus::Approved, ImageStatus::Approved),
            CallbackVerdict::NotPending
        );
        assert_eq!(
            callback_verdict(ReportStatus::Approved, ImageStatus::Declined),
            CallbackVerdict::NotPending
        );
    }

    #[test]
    fn declined_report_rejects_any_callback() {
        assert_eq!(
            callback_verdict(ReportStatus::Declined, ImageStatus::Approved),
            CallbackVerdict::NotPending
        );
        assert_eq!(
            callback_verdict(ReportStatus::Declined, ImageStatus::Declined),
            CallbackVerdict::NotPending
        );
    }
}
