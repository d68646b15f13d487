//! Issue State Machine — administrative transitions of an issue's lifecycle.
//!
//! Forward-only: Pending -> InProgress -> Completed. Re-asserting the current
//! status is a successful no-op so repeated commands don't emit redundant
//! events; moving backward is a domain error.

use tracing::info;
use uuid::Uuid;

use curbwatch_common::events::DomainEvent;
use curbwatch_common::types::IssueStatus;
use curbwatch_common::CurbwatchError;

use crate::traits::{Store, StoreTxn};

/// Pure decision for a status command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionVerdict {
    /// Target equals current: succeed without persisting or emitting.
    NoOp,
    /// A forward step: persist and emit `IssueStatusChanged`.
    Apply,
    /// A backward step: reject, nothing happens.
    Invalid,
}

pub fn transition_verdict(current: IssueStatus, target: IssueStatus) -> TransitionVerdict {
    if target == current {
        TransitionVerdict::NoOp
    } else if target.rank() > current.rank() {
        TransitionVerdict::Apply
    } else {
        TransitionVerdict::Invalid
    }
}

/// Result of a status command, with the event to queue when a real
/// transition happened.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    NoOp,
    Changed {
        previous: IssueStatus,
        new: IssueStatus,
        event: DomainEvent,
    },
}

/// Apply a status command to an issue.
///
/// Reads the issue inside the transaction so the verdict runs against
/// committed-and-current state, then persists on `Apply`.
pub async fn transition_issue<S: Store>(
    store: &S,
    issue_id: Uuid,
    target: IssueStatus,
) -> Result<TransitionOutcome, CurbwatchError> {
    let mut txn = store.begin().await?;
    let issue = txn
        .issue_by_id(issue_id)
        .await?
        .ok_or(CurbwatchError::IssueNotFound(issue_id))?;

    match transition_verdict(issue.status, target) {
        TransitionVerdict::NoOp => Ok(TransitionOutcome::NoOp),

        TransitionVerdict::Invalid => Err(CurbwatchError::InvalidTransition {
            from: issue.status.to_string(),
            to: target.to_string(),
        }),

        TransitionVerdict::Apply => {
            txn.update_issue_status(issue_id, target).await?;
            S::commit(txn).await?;

            info!(
                issue_id = %issue_id,
                previous = %issue.status,
                new = %target,
                "Issue status changed"
            );

            Ok(TransitionOutcome::Changed {
                previous: issue.status,
                new: target,
                event: DomainEvent::IssueStatusChanged {
                    issue_id,
                    previous: issue.status,
                    new: target,
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_status_is_noop() {
        for s in [IssueStatus::Pending, IssueStatus::InProgress, IssueStatus::Completed] {
            assert_eq!(transition_verdict(s, s), TransitionVerdict::NoOp);
        }
    }

    #[test]
    fn forward_steps_apply() {
        assert_eq!(
            transition_verdict(IssueStatus::Pending, IssueStatus::InProgress),
            TransitionVerdict::Apply
        );
        assert_eq!(
            transition_verdict(IssueStatus::InProgress, IssueStatus::Completed),
            TransitionVerdict::Apply
        );
    }

    #[test]
    fn skipping_a_step_forward_applies() {
        assert_eq!(
            transition_verdict(IssueStatus::Pending, IssueStatus::Completed),
            TransitionVerdict::Apply
        );
    }

    #[test]
    fn backward_steps_are_invalid() {
        assert_eq!(
            transition_verdict(IssueStatus::Completed, IssueStatus::InProgress),
            TransitionVerdict::Invalid
        );
        assert_eq!(
            transition_verdict(IssueStatus::InProgress, IssueStatus::Pending),
            TransitionVerdict::Invalid
        );
        assert_eq!(
            transition_verdict(IssueStatus::Completed, IssueStatus::Pending),
            TransitionVerdict::Invalid
        );
    }
}
