//! In-memory store for tests.
//!
//! Same semantics as the Postgres store, serialized by a single async mutex:
//! `begin` takes the lock, mutations stage against a copy, `commit` writes the
//! copy back. Dropping the transaction discards the staged state, which gives
//! tests real rollback behavior. Holding the lock for the whole transaction
//! also serializes matcher races the way the advisory lock does in Postgres.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use curbwatch_common::geo::{self, haversine_distance_meters, MATCH_CELL_PRECISION};
use curbwatch_common::types::{
    Category, GeoPoint, Issue, IssueStatus, Report, ReportStatus,
};
use curbwatch_common::CurbwatchError;
use curbwatch_engine::traits::{Store, StoreTxn};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    reports: HashMap<Uuid, Report>,
    issues: HashMap<Uuid, Issue>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of issues in committed state. Test helper.
    pub async fn issue_count(&self) -> usize {
        self.state.lock().await.issues.len()
    }
}

pub struct MemoryTxn {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl StoreTxn for MemoryTxn {
    async fn lock_match_area(
        &mut self,
        _category: Category,
        _cell: &str,
    ) -> Result<(), CurbwatchError> {
        // The store mutex already serializes whole transactions.
        Ok(())
    }

    async fn issues_in_cells(
        &mut self,
        category: Category,
        cells: &[String],
    ) -> Result<Vec<Issue>, CurbwatchError> {
        Ok(self
            .staged
            .issues
            .values()
            .filter(|i| {
                i.category == category
                    && cells.contains(&geo::cell_id(i.location, MATCH_CELL_PRECISION))
            })
            .cloned()
            .collect())
    }

    async fn insert_issue(&mut self, issue: &Issue) -> Result<(), CurbwatchError> {
        self.staged.issues.insert(issue.id, issue.clone());
        Ok(())
    }

    async fn issue_by_id(&mut self, id: Uuid) -> Result<Option<Issue>, CurbwatchError> {
        Ok(self.staged.issues.get(&id).cloned())
    }

    async fn update_issue_status(
        &mut self,
        id: Uuid,
        status: IssueStatus,
    ) -> Result<(), CurbwatchError> {
        let issue = self
            .staged
            .issues
            .get_mut(&id)
            .ok_or(CurbwatchError::IssueNotFound(id))?;
        issue.status = status;
        Ok(())
    }

    async fn update_report_validation(
        &mut self,
        report_id: Uuid,
        status: ReportStatus,
        category: Option<Category>,
        threshold: Option<f64>,
    ) -> Result<(), CurbwatchError> {
        let report = self
            .staged
            .reports
            .get_mut(&report_id)
            .ok_or(CurbwatchError::ReportNotPending(report_id))?;
        if report.status != ReportStatus::Pending {
            return Err(CurbwatchError::ReportNotPending(report_id));
        }
        report.status = status;
        if let Some(category) = category {
            report.category = category;
        }
        if threshold.is_some() {
            report.threshold = threshold;
        }
        Ok(())
    }

    async fn attach_report(
        &mut self,
        report_id: Uuid,
        issue_id: Uuid,
    ) -> Result<(), CurbwatchError> {
        let report = self
            .staged
            .reports
            .get_mut(&report_id)
            .filter(|r| r.status == ReportStatus::Approved)
            .ok_or_else(|| {
                CurbwatchError::Conflict(format!("report {report_id} is not approved, cannot attach"))
            })?;
        report.issue_id = Some(issue_id);

        if let Some(issue) = self.staged.issues.get_mut(&issue_id) {
            issue.report_count += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Txn = MemoryTxn;

    async fn begin(&self) -> Result<Self::Txn, CurbwatchError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryTxn { guard, staged })
    }

    async fn commit(txn: Self::Txn) -> Result<(), CurbwatchError> {
        let MemoryTxn { mut guard, staged } = txn;
        *guard = staged;
        Ok(())
    }

    async fn create_report(&self, report: &Report) -> Result<(), CurbwatchError> {
        let mut state = self.state.lock().await;
        if let Some(task_id) = &report.task_id {
            if state
                .reports
                .values()
                .any(|r| r.task_id.as_deref() == Some(task_id))
            {
                return Err(CurbwatchError::Conflict(format!(
                    "task id '{task_id}' already exists"
                )));
            }
        }
        state.reports.insert(report.id, report.clone());
        Ok(())
    }

    async fn report_by_task_id(&self, task_id: &str) -> Result<Option<Report>, CurbwatchError> {
        Ok(self
            .state
            .lock()
            .await
            .reports
            .values()
            .find(|r| r.task_id.as_deref() == Some(task_id))
            .cloned())
    }

    async fn report_by_id(&self, id: Uuid) -> Result<Option<Report>, CurbwatchError> {
        Ok(self.state.lock().await.reports.get(&id).cloned())
    }

    async fn issue_by_id(&self, id: Uuid) -> Result<Option<Issue>, CurbwatchError> {
        Ok(self.state.lock().await.issues.get(&id).cloned())
    }

    async fn reports_for_issue(&self, issue_id: Uuid) -> Result<Vec<Report>, CurbwatchError> {
        let mut reports: Vec<Report> = self
            .state
            .lock()
            .await
            .reports
            .values()
            .filter(|r| r.issue_id == Some(issue_id))
            .cloned()
            .collect();
        reports.sort_by_key(|r| r.created_at);
        Ok(reports)
    }

    async fn reports_for_user(&self, reporter_id: Uuid) -> Result<Vec<Report>, CurbwatchError> {
        let mut reports: Vec<Report> = self
            .state
            .lock()
            .await
            .reports
            .values()
            .filter(|r| r.reporter_id == Some(reporter_id))
            .cloned()
            .collect();
        reports.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        Ok(reports)
    }

    async fn issues_near(
        &self,
        center: GeoPoint,
        radius_m: f64,
    ) -> Result<Vec<Issue>, CurbwatchError> {
        let mut issues: Vec<(Issue, f64)> = self
            .state
            .lock()
            .await
            .issues
            .values()
            .map(|i| {
                let d = haversine_distance_meters(i.location, center);
                (i.clone(), d)
            })
            .filter(|(_, d)| *d <= radius_m)
            .collect();
        issues.sort_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Ok(issues.into_iter().map(|(i, _)| i).collect())
    }

    async fn issue_statistics(
        &self,
    ) -> Result<Vec<(Category, IssueStatus, i64)>, CurbwatchError> {
        let mut counts: HashMap<(Category, IssueStatus), i64> = HashMap::new();
        for issue in self.state.lock().await.issues.values() {
            *counts.entry((issue.category, issue.status)).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|((c, s), n)| (c, s, n))
            .collect())
    }
}
