//! Storage traits at the engine's seams.
//!
//! Implemented by the Postgres store and by the in-memory store for tests.
//! Every inbound write runs inside a `StoreTxn`: begin, mutate, commit, with
//! rollback-on-drop when a step fails.

use async_trait::async_trait;
use uuid::Uuid;

use curbwatch_common::types::{Category, GeoPoint, Issue, IssueStatus, Report, ReportStatus};
use curbwatch_common::CurbwatchError;

/// An open transaction against the spatial store. Dropping without commit
/// rolls back every mutation made through it.
#[async_trait]
pub trait StoreTxn: Send {
    /// Serialize concurrent matching over the same (category, area) so two
    /// reports over an uncovered spot cannot both create an issue. Held until
    /// the transaction ends.
    async fn lock_match_area(&mut self, category: Category, cell: &str)
        -> Result<(), CurbwatchError>;

    /// Issues of the given category whose anchor falls in any of the cells.
    async fn issues_in_cells(
        &mut self,
        category: Category,
        cells: &[String],
    ) -> Result<Vec<Issue>, CurbwatchError>;

    async fn insert_issue(&mut self, issue: &Issue) -> Result<(), CurbwatchError>;

    async fn issue_by_id(&mut self, id: Uuid) -> Result<Option<Issue>, CurbwatchError>;

    async fn update_issue_status(
        &mut self,
        id: Uuid,
        status: IssueStatus,
    ) -> Result<(), CurbwatchError>;

    /// Persist the validation outcome on a report. Approval carries the
    /// classifier's (possibly corrected) category and confidence threshold;
    /// decline changes the status only.
    ///
    /// The pending guard is re-checked inside the transaction: if the report
    /// already left Pending, this fails with `ReportNotPending` and nothing
    /// is written, so a duplicate callback that raced past the initial read
    /// still has no effect.
    async fn update_report_validation(
        &mut self,
        report_id: Uuid,
        status: ReportStatus,
        category: Option<Category>,
        threshold: Option<f64>,
    ) -> Result<(), CurbwatchError>;

    /// Attach an approved report to its issue and bump the issue's count.
    async fn attach_report(
        &mut self,
        report_id: Uuid,
        issue_id: Uuid,
    ) -> Result<(), CurbwatchError>;
}

/// The spatial store: the sole source of truth for report and issue existence.
#[async_trait]
pub trait Store: Send + Sync {
    type Txn: StoreTxn;

    async fn begin(&self) -> Result<Self::Txn, CurbwatchError>;

    async fn commit(txn: Self::Txn) -> Result<(), CurbwatchError>;

    // --- Pool-level reads and writes (single-statement, committed state) ---

    async fn create_report(&self, report: &Report) -> Result<(), CurbwatchError>;

    async fn report_by_task_id(&self, task_id: &str) -> Result<Option<Report>, CurbwatchError>;

    async fn report_by_id(&self, id: Uuid) -> Result<Option<Report>, CurbwatchError>;

    async fn issue_by_id(&self, id: Uuid) -> Result<Option<Issue>, CurbwatchError>;

    async fn reports_for_issue(&self, issue_id: Uuid) -> Result<Vec<Report>, CurbwatchError>;

    async fn reports_for_user(&self, reporter_id: Uuid) -> Result<Vec<Report>, CurbwatchError>;

    /// Issues whose anchor lies within `radius_m` of `center`, nearest first.
    async fn issues_near(
        &self,
        center: GeoPoint,
        radius_m: f64,
    ) -> Result<Vec<Issue>, CurbwatchError>;

    /// (category, status, count) rows for the aggregate statistics view.
    async fn issue_statistics(&self) -> Result<Vec<(Category, IssueStatus, i64)>, CurbwatchError>;
}
