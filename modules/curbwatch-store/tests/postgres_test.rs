//! Integration tests for the Postgres store.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use chrono::Utc;
use uuid::Uuid;

use curbwatch_common::types::{
    Category, GeoPoint, Issue, IssueStatus, Locality, Report, ReportStatus,
};
use curbwatch_engine::traits::{Store, StoreTxn};
use curbwatch_engine::IssueMatcher;
use curbwatch_store::PgStore;

async fn test_store() -> Option<PgStore> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let store = PgStore::connect(&url).await.ok()?;
    store.ensure_schema().await.ok()?;

    sqlx::query("TRUNCATE reports, issues CASCADE")
        .execute(store.pool())
        .await
        .ok()?;

    Some(store)
}

fn report(task_id: &str, lat: f64, lng: f64) -> Report {
    Report {
        id: Uuid::new_v4(),
        location: GeoPoint::new(lat, lng),
        category: Category::Pothole,
        image_ref: format!("images/{task_id}.jpg"),
        status: ReportStatus::Pending,
        threshold: None,
        task_id: Some(task_id.to_string()),
        issue_id: None,
        reporter_id: Some(Uuid::new_v4()),
        locality: Locality {
            road: Some("Corniche".into()),
            city: Some("Cairo".into()),
            state: None,
            country: Some("Egypt".into()),
        },
        created_at: Utc::now(),
    }
}

fn issue(lat: f64, lng: f64, category: Category) -> Issue {
    Issue {
        id: Uuid::new_v4(),
        category,
        location: GeoPoint::new(lat, lng),
        status: IssueStatus::Pending,
        severity: category.default_severity(),
        locality: Locality::default(),
        report_count: 0,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn report_round_trips() {
    let Some(store) = test_store().await else {
        return;
    };

    let original = report("pg-task-1", 30.0444, 31.2357);
    store.create_report(&original).await.unwrap();

    let loaded = store
        .report_by_task_id("pg-task-1")
        .await
        .unwrap()
        .expect("report should exist");
    assert_eq!(loaded.id, original.id);
    assert_eq!(loaded.category, Category::Pothole);
    assert_eq!(loaded.status, ReportStatus::Pending);
    assert_eq!(loaded.locality.city.as_deref(), Some("Cairo"));
    assert!(loaded.issue_id.is_none());
}

#[tokio::test]
async fn duplicate_task_id_is_a_conflict() {
    let Some(store) = test_store().await else {
        return;
    };

    store.create_report(&report("pg-dup", 30.0, 31.0)).await.unwrap();
    let err = store.create_report(&report("pg-dup", 30.0, 31.0)).await;
    assert!(err.is_err(), "unique task_id must reject the second insert");
}

#[tokio::test]
async fn matcher_finds_issue_through_cell_prefilter() {
    let Some(store) = test_store().await else {
        return;
    };

    let matcher = IssueMatcher::default();
    let locality = Locality::default();

    let mut txn = store.begin().await.unwrap();
    let first = matcher
        .find_or_create(
            &mut txn,
            GeoPoint::new(30.0444, 31.2357),
            Category::Pothole,
            &locality,
        )
        .await
        .unwrap();
    PgStore::commit(txn).await.unwrap();
    assert!(first.created);

    // ~14m away: must merge
    let mut txn = store.begin().await.unwrap();
    let second = matcher
        .find_or_create(
            &mut txn,
            GeoPoint::new(30.0445, 31.2358),
            Category::Pothole,
            &locality,
        )
        .await
        .unwrap();
    PgStore::commit(txn).await.unwrap();
    assert!(!second.created);
    assert_eq!(second.issue_id, first.issue_id);

    // Same spot, different category: new issue
    let mut txn = store.begin().await.unwrap();
    let third = matcher
        .find_or_create(
            &mut txn,
            GeoPoint::new(30.0444, 31.2357),
            Category::Flooding,
            &locality,
        )
        .await
        .unwrap();
    PgStore::commit(txn).await.unwrap();
    assert!(third.created);
}

#[tokio::test]
async fn validation_guard_rejects_second_update() {
    let Some(store) = test_store().await else {
        return;
    };

    let r = report("pg-guard", 30.0444, 31.2357);
    store.create_report(&r).await.unwrap();

    let mut txn = store.begin().await.unwrap();
    txn.update_report_validation(r.id, ReportStatus::Approved, Some(Category::Pothole), Some(0.9))
        .await
        .unwrap();
    PgStore::commit(txn).await.unwrap();

    let mut txn = store.begin().await.unwrap();
    let err = txn
        .update_report_validation(r.id, ReportStatus::Declined, None, None)
        .await;
    assert!(err.is_err(), "pending guard must reject the second transition");
}

#[tokio::test]
async fn dropped_transaction_rolls_back() {
    let Some(store) = test_store().await else {
        return;
    };

    let r = report("pg-rollback", 30.0444, 31.2357);
    store.create_report(&r).await.unwrap();

    {
        let mut txn = store.begin().await.unwrap();
        txn.update_report_validation(r.id, ReportStatus::Approved, None, Some(0.8))
            .await
            .unwrap();
        // Dropped without commit
    }

    let loaded = store.report_by_id(r.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, ReportStatus::Pending);
}

#[tokio::test]
async fn issues_near_orders_by_distance() {
    let Some(store) = test_store().await else {
        return;
    };

    let near = issue(30.0445, 31.2358, Category::Pothole);
    let far = issue(30.0470, 31.2380, Category::Garbage);
    let elsewhere = issue(29.9792, 31.1342, Category::Pothole);

    for i in [&near, &far, &elsewhere] {
        let mut txn = store.begin().await.unwrap();
        txn.insert_issue(i).await.unwrap();
        PgStore::commit(txn).await.unwrap();
    }

    let found = store
        .issues_near(GeoPoint::new(30.0444, 31.2357), 1_000.0)
        .await
        .unwrap();
    let ids: Vec<Uuid> = found.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![near.id, far.id], "nearest first, distant city excluded");
}

#[tokio::test]
async fn statistics_group_by_category_and_status() {
    let Some(store) = test_store().await else {
        return;
    };

    for _ in 0..2 {
        let mut txn = store.begin().await.unwrap();
        txn.insert_issue(&issue(30.04, 31.23, Category::Pothole)).await.unwrap();
        PgStore::commit(txn).await.unwrap();
    }
    let mut txn = store.begin().await.unwrap();
    txn.insert_issue(&issue(30.05, 31.24, Category::Flooding)).await.unwrap();
    PgStore::commit(txn).await.unwrap();

    let stats = store.issue_statistics().await.unwrap();
    let potholes = stats
        .iter()
        .find(|(c, s, _)| *c == Category::Pothole && *s == IssueStatus::Pending)
        .map(|(_, _, n)| *n);
    assert_eq!(potholes, Some(2));

    let flooding = stats
        .iter()
        .find(|(c, _, _)| *c == Category::Flooding)
        .map(|(_, _, n)| *n);
    assert_eq!(flooding, Some(1));
}
