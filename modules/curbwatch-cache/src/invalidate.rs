//! Cache Invalidation Coordinator.
//!
//! Reacts to committed mutations by dropping the cached read models they made
//! stale. Owns no domain data. Called after the owning transaction commits;
//! a stale read in the window before invalidation is recovered by TTL expiry.
//! Never surfaces an error to the caller — a stale cache entry is recoverable,
//! a failed business transaction is not.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::store::{CacheTag, ReadCache};

#[derive(Clone)]
pub struct InvalidationCoordinator {
    cache: Arc<ReadCache>,
}

impl InvalidationCoordinator {
    pub fn new(cache: Arc<ReadCache>) -> Self {
        Self { cache }
    }

    /// Drop the issue's detail view and every list/aggregate view that could
    /// include it.
    pub fn invalidate_issue(&self, issue_id: Uuid) {
        let removed = self.cache.remove_by_tag(CacheTag::Issue(issue_id))
            + self.cache.remove_by_tag(CacheTag::Statistics);
        debug!(issue_id = %issue_id, removed, "Issue views invalidated");
    }

    /// Drop the user's report-list views.
    pub fn invalidate_user(&self, user_id: Uuid) {
        let removed = self.cache.remove_by_tag(CacheTag::User(user_id));
        debug!(user_id = %user_id, removed, "User views invalidated");
    }

    /// Drop the report's detail view, its owning issue's views when known,
    /// and the aggregates.
    pub fn invalidate_report(&self, report_id: Uuid, issue_id: Option<Uuid>) {
        let mut removed = self.cache.remove_by_tag(CacheTag::Report(report_id));
        if let Some(issue_id) = issue_id {
            removed += self.cache.remove_by_tag(CacheTag::Issue(issue_id));
        }
        removed += self.cache.remove_by_tag(CacheTag::Statistics);
        debug!(report_id = %report_id, removed, "Report views invalidated");
    }

    /// Drop every aggregate/list view.
    pub fn invalidate_aggregate_statistics(&self) {
        let removed = self.cache.remove_by_tag(CacheTag::Statistics);
        debug!(removed, "Aggregate statistics invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CacheTtl;
    use serde_json::json;

    fn seeded() -> (InvalidationCoordinator, Arc<ReadCache>, Uuid, Uuid, Uuid) {
        let cache = Arc::new(ReadCache::new());
        let coordinator = InvalidationCoordinator::new(cache.clone());
        let issue_id = Uuid::new_v4();
        let report_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        cache.insert(
            &format!("issue:{issue_id}"),
            json!({"issue": 1}),
            CacheTtl::Stable,
            vec![CacheTag::Issue(issue_id), CacheTag::Report(report_id)],
        );
        cache.insert(
            &format!("user:{user_id}:reports"),
            json!([1, 2]),
            CacheTtl::Volatile,
            vec![CacheTag::User(user_id)],
        );
        cache.insert(
            "stats:summary",
            json!({"total": 2}),
            CacheTtl::Volatile,
            vec![CacheTag::Statistics],
        );
        (coordinator, cache, issue_id, report_id, user_id)
    }

    #[test]
    fn issue_invalidation_clears_detail_and_aggregates() {
        let (coordinator, cache, issue_id, _, user_id) = seeded();
        coordinator.invalidate_issue(issue_id);

        assert_eq!(cache.get(&format!("issue:{issue_id}")), None);
        assert_eq!(cache.get("stats:summary"), None);
        assert!(cache.get(&format!("user:{user_id}:reports")).is_some());
    }

    #[test]
    fn report_invalidation_reaches_owning_issue() {
        let (coordinator, cache, issue_id, report_id, _) = seeded();
        coordinator.invalidate_report(report_id, Some(issue_id));

        assert_eq!(cache.get(&format!("issue:{issue_id}")), None);
        assert_eq!(cache.get("stats:summary"), None);
    }

    #[test]
    fn report_invalidation_without_issue_still_clears_aggregates() {
        let (coordinator, cache, issue_id, report_id, _) = seeded();
        coordinator.invalidate_report(report_id, None);

        // Tagged with the report id, so the detail view goes even without the issue hint
        assert_eq!(cache.get(&format!("issue:{issue_id}")), None);
        assert_eq!(cache.get("stats:summary"), None);
    }

    #[test]
    fn user_invalidation_is_scoped() {
        let (coordinator, cache, issue_id, _, user_id) = seeded();
        coordinator.invalidate_user(user_id);

        assert_eq!(cache.get(&format!("user:{user_id}:reports")), None);
        assert!(cache.get(&format!("issue:{issue_id}")).is_some());
        assert!(cache.get("stats:summary").is_some());
    }

    #[test]
    fn statistics_invalidation_leaves_details() {
        let (coordinator, cache, issue_id, _, _) = seeded();
        coordinator.invalidate_aggregate_statistics();

        assert_eq!(cache.get("stats:summary"), None);
        assert!(cache.get(&format!("issue:{issue_id}")).is_some());
    }

    #[test]
    fn invalidation_on_empty_cache_is_harmless() {
        let cache = Arc::new(ReadCache::new());
        let coordinator = InvalidationCoordinator::new(cache.clone());
        coordinator.invalidate_issue(Uuid::new_v4());
        coordinator.invalidate_report(Uuid::new_v4(), None);
        coordinator.invalidate_user(Uuid::new_v4());
        coordinator.invalidate_aggregate_statistics();
        assert!(cache.is_empty());
    }
}
