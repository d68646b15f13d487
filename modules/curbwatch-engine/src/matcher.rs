//! Issue Matcher — decides whether a validated report joins an existing issue
//! or founds a new one.
//!
//! The decision is proximity-based: issues of the same category anchored
//! within the fixed radius are the same physical defect. Candidate lookup is
//! prefiltered by geohash cells; the exact check is haversine distance.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use curbwatch_common::geo::{
    cell_id, cell_neighborhood, haversine_distance_meters, LOCK_CELL_PRECISION,
    MATCH_CELL_PRECISION, PROXIMITY_RADIUS_M,
};
use curbwatch_common::types::{Category, GeoPoint, Issue, IssueStatus, Locality};
use curbwatch_common::CurbwatchError;

use crate::traits::StoreTxn;

/// Outcome of a match: the owning issue and whether this call created it.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRef {
    pub issue_id: Uuid,
    pub created: bool,
}

/// Select the nearest issue within `radius_m` of `point`.
///
/// Ties on distance break toward the earliest `created_at`, then the smaller
/// id, so concurrent readers converge on the same merge target.
pub fn nearest_within(issues: &[Issue], point: GeoPoint, radius_m: f64) -> Option<&Issue> {
    issues
        .iter()
        .map(|issue| (issue, haversine_distance_meters(issue.location, point)))
        .filter(|(_, d)| *d <= radius_m)
        .min_by(|(a, da), (b, db)| {
            da.partial_cmp(db)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|(issue, _)| issue)
}

pub struct IssueMatcher {
    radius_m: f64,
}

impl Default for IssueMatcher {
    fn default() -> Self {
        Self {
            radius_m: PROXIMITY_RADIUS_M,
        }
    }
}

impl IssueMatcher {
    /// Find the issue a report at `location` belongs to, or create one.
    ///
    /// Runs inside the caller's transaction. Takes the area advisory lock
    /// first, so a concurrent caller evaluating the same uncovered area waits
    /// and then sees this call's issue. `locality` seeds the denormalized
    /// fields when a new issue is anchored here.
    pub async fn find_or_create<T: StoreTxn>(
        &self,
        txn: &mut T,
        location: GeoPoint,
        category: Category,
        locality: &Locality,
    ) -> Result<IssueRef, CurbwatchError> {
        let lock_cell = cell_id(location, LOCK_CELL_PRECISION);
        txn.lock_match_area(category, &lock_cell).await?;

        let cells = cell_neighborhood(location, MATCH_CELL_PRECISION);
        let candidates = txn.issues_in_cells(category, &cells).await?;

        if let Some(existing) = nearest_within(&candidates, location, self.radius_m) {
            info!(
                issue_id = %existing.id,
                category = %category,
                "Report matched existing issue"
            );
            return Ok(IssueRef {
                issue_id: existing.id,
                created: false,
            });
        }

        let issue = Issue {
            id: Uuid::new_v4(),
            category,
            location,
            status: IssueStatus::Pending,
            severity: category.default_severity(),
            locality: locality.clone(),
            report_count: 0,
            created_at: Utc::now(),
        };
        txn.insert_issue(&issue).await?;

        info!(issue_id = %issue.id, category = %category, "New issue created");
        Ok(IssueRef {
            issue_id: issue.id,
            created: true,
        })
    }
}
