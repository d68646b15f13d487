//! Postgres spatial store.
//!
//! Raw SQL over a `PgPool`. Writes that must be atomic run through
//! `PgStoreTxn`; dropping the transaction without commit rolls back.
//! Proximity lookups prefilter on a stored geohash cell and leave the exact
//! distance check to the engine.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use curbwatch_common::geo::{self, haversine_distance_meters, MATCH_CELL_PRECISION};
use curbwatch_common::types::{
    Category, GeoPoint, Issue, IssueStatus, Locality, Report, ReportStatus, Severity,
};
use curbwatch_common::CurbwatchError;
use curbwatch_engine::traits::{Store, StoreTxn};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, CurbwatchError> {
        let pool = PgPool::connect(database_url).await.map_err(db_err)?;
        Ok(Self { pool })
    }

    /// Create tables and indexes if absent. Idempotent.
    pub async fn ensure_schema(&self) -> Result<(), CurbwatchError> {
        for statement in include_str!("../schema.sql").split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub struct PgStoreTxn {
    tx: Transaction<'static, Postgres>,
}

/// Advisory-lock key for a (category, cell) match area: first 8 bytes of a
/// SHA-256 over both, stable across processes.
fn area_lock_key(category: Category, cell: &str) -> i64 {
    let mut hasher = Sha256::new();
    hasher.update(category.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(cell.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

fn db_err(e: sqlx::Error) -> CurbwatchError {
    if let sqlx::Error::Database(ref db) = e {
        // Serialization failures and unique violations are retryable conflicts.
        if matches!(db.code().as_deref(), Some("40001") | Some("23505")) {
            return CurbwatchError::Conflict(e.to_string());
        }
    }
    CurbwatchError::Database(e.to_string())
}

fn corrupt(column: &str, value: &str) -> CurbwatchError {
    CurbwatchError::Database(format!("unrecognized {column} value '{value}' in row"))
}

fn row_to_issue(row: &PgRow) -> Result<Issue, CurbwatchError> {
    let category_s: String = row.try_get("category").map_err(db_err)?;
    let status_s: String = row.try_get("status").map_err(db_err)?;
    let severity_s: String = row.try_get("severity").map_err(db_err)?;

    Ok(Issue {
        id: row.try_get("id").map_err(db_err)?,
        category: Category::parse(&category_s).ok_or_else(|| corrupt("category", &category_s))?,
        location: GeoPoint::new(
            row.try_get("lat").map_err(db_err)?,
            row.try_get("lng").map_err(db_err)?,
        ),
        status: IssueStatus::parse(&status_s).ok_or_else(|| corrupt("status", &status_s))?,
        severity: Severity::parse(&severity_s).ok_or_else(|| corrupt("severity", &severity_s))?,
        locality: Locality {
            road: row.try_get("road").map_err(db_err)?,
            city: row.try_get("city").map_err(db_err)?,
            state: row.try_get("state").map_err(db_err)?,
            country: row.try_get("country").map_err(db_err)?,
        },
        report_count: row.try_get::<i32, _>("report_count").map_err(db_err)? as u32,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn row_to_report(row: &PgRow) -> Result<Report, CurbwatchError> {
    let category_s: String = row.try_get("category").map_err(db_err)?;
    let status_s: String = row.try_get("status").map_err(db_err)?;

    Ok(Report {
        id: row.try_get("id").map_err(db_err)?,
        location: GeoPoint::new(
            row.try_get("lat").map_err(db_err)?,
            row.try_get("lng").map_err(db_err)?,
        ),
        category: Category::parse(&category_s).ok_or_else(|| corrupt("category", &category_s))?,
        image_ref: row.try_get("image_ref").map_err(db_err)?,
        status: ReportStatus::parse(&status_s).ok_or_else(|| corrupt("status", &status_s))?,
        threshold: row.try_get("threshold").map_err(db_err)?,
        task_id: row.try_get("task_id").map_err(db_err)?,
        issue_id: row.try_get("issue_id").map_err(db_err)?,
        reporter_id: row.try_get("reporter_id").map_err(db_err)?,
        locality: Locality {
            road: row.try_get("road").map_err(db_err)?,
            city: row.try_get("city").map_err(db_err)?,
            state: row.try_get("state").map_err(db_err)?,
            country: row.try_get("country").map_err(db_err)?,
        },
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

const ISSUE_COLUMNS: &str =
    "id, category, lat, lng, status, severity, road, city, state, country, report_count, created_at";
const REPORT_COLUMNS: &str = "id, lat, lng, category, image_ref, status, threshold, task_id, \
                              issue_id, reporter_id, road, city, state, country, created_at";

#[async_trait]
impl StoreTxn for PgStoreTxn {
    async fn lock_match_area(
        &mut self,
        category: Category,
        cell: &str,
    ) -> Result<(), CurbwatchError> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(area_lock_key(category, cell))
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn issues_in_cells(
        &mut self,
        category: Category,
        cells: &[String],
    ) -> Result<Vec<Issue>, CurbwatchError> {
        let rows = sqlx::query(&format!(
            "SELECT {ISSUE_COLUMNS} FROM issues WHERE category = $1 AND geohash = ANY($2)"
        ))
        .bind(category.as_str())
        .bind(cells)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_issue).collect()
    }

    async fn insert_issue(&mut self, issue: &Issue) -> Result<(), CurbwatchError> {
        sqlx::query(
            r#"
            INSERT INTO issues (id, category, lat, lng, geohash, status, severity,
                                road, city, state, country, report_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(issue.id)
        .bind(issue.category.as_str())
        .bind(issue.location.lat)
        .bind(issue.location.lng)
        .bind(geo::cell_id(issue.location, MATCH_CELL_PRECISION))
        .bind(issue.status.as_str())
        .bind(issue.severity.as_str())
        .bind(&issue.locality.road)
        .bind(&issue.locality.city)
        .bind(&issue.locality.state)
        .bind(&issue.locality.country)
        .bind(issue.report_count as i32)
        .bind(issue.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn issue_by_id(&mut self, id: Uuid) -> Result<Option<Issue>, CurbwatchError> {
        let row = sqlx::query(&format!(
            "SELECT {ISSUE_COLUMNS} FROM issues WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        row.as_ref().map(row_to_issue).transpose()
    }

    async fn update_issue_status(
        &mut self,
        id: Uuid,
        status: IssueStatus,
    ) -> Result<(), CurbwatchError> {
        let result = sqlx::query("UPDATE issues SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(CurbwatchError::IssueNotFound(id));
        }
        Ok(())
    }

    async fn update_report_validation(
        &mut self,
        report_id: Uuid,
        status: ReportStatus,
        category: Option<Category>,
        threshold: Option<f64>,
    ) -> Result<(), CurbwatchError> {
        // Guarded on the pending status so a racing duplicate callback writes
        // nothing even after passing the initial read.
        let result = sqlx::query(
            r#"
            UPDATE reports
            SET status = $2,
                category = COALESCE($3, category),
                threshold = COALESCE($4, threshold)
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(report_id)
        .bind(status.as_str())
        .bind(category.map(|c| c.as_str()))
        .bind(threshold)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(CurbwatchError::ReportNotPending(report_id));
        }
        Ok(())
    }

    async fn attach_report(
        &mut self,
        report_id: Uuid,
        issue_id: Uuid,
    ) -> Result<(), CurbwatchError> {
        let result = sqlx::query(
            "UPDATE reports SET issue_id = $2 WHERE id = $1 AND status = 'approved'",
        )
        .bind(report_id)
        .bind(issue_id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(CurbwatchError::Conflict(format!(
                "report {report_id} is not approved, cannot attach"
            )));
        }

        sqlx::query("UPDATE issues SET report_count = report_count + 1 WHERE id = $1")
            .bind(issue_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    type Txn = PgStoreTxn;

    async fn begin(&self) -> Result<Self::Txn, CurbwatchError> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(PgStoreTxn { tx })
    }

    async fn commit(txn: Self::Txn) -> Result<(), CurbwatchError> {
        txn.tx.commit().await.map_err(db_err)
    }

    async fn create_report(&self, report: &Report) -> Result<(), CurbwatchError> {
        sqlx::query(
            r#"
            INSERT INTO reports (id, lat, lng, category, image_ref, status, threshold,
                                 task_id, issue_id, reporter_id, road, city, state, country,
                                 created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(report.id)
        .bind(report.location.lat)
        .bind(report.location.lng)
        .bind(report.category.as_str())
        .bind(&report.image_ref)
        .bind(report.status.as_str())
        .bind(report.threshold)
        .bind(&report.task_id)
        .bind(report.issue_id)
        .bind(report.reporter_id)
        .bind(&report.locality.road)
        .bind(&report.locality.city)
        .bind(&report.locality.state)
        .bind(&report.locality.country)
        .bind(report.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn report_by_task_id(&self, task_id: &str) -> Result<Option<Report>, CurbwatchError> {
        let row = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE task_id = $1"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(row_to_report).transpose()
    }

    async fn report_by_id(&self, id: Uuid) -> Result<Option<Report>, CurbwatchError> {
        let row = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(row_to_report).transpose()
    }

    async fn issue_by_id(&self, id: Uuid) -> Result<Option<Issue>, CurbwatchError> {
        let row = sqlx::query(&format!(
            "SELECT {ISSUE_COLUMNS} FROM issues WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(row_to_issue).transpose()
    }

    async fn reports_for_issue(&self, issue_id: Uuid) -> Result<Vec<Report>, CurbwatchError> {
        let rows = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE issue_id = $1 ORDER BY created_at ASC"
        ))
        .bind(issue_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_report).collect()
    }

    async fn reports_for_user(&self, reporter_id: Uuid) -> Result<Vec<Report>, CurbwatchError> {
        let rows = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE reporter_id = $1 ORDER BY created_at DESC"
        ))
        .bind(reporter_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_report).collect()
    }

    async fn issues_near(
        &self,
        center: GeoPoint,
        radius_m: f64,
    ) -> Result<Vec<Issue>, CurbwatchError> {
        // Bounding-box prefilter in SQL; exact haversine ordering in Rust.
        let lat_delta = radius_m / 111_320.0;
        let lng_delta = radius_m / (111_320.0 * center.lat.to_radians().cos().abs().max(0.01));

        let rows = sqlx::query(&format!(
            "SELECT {ISSUE_COLUMNS} FROM issues \
             WHERE lat BETWEEN $1 AND $2 AND lng BETWEEN $3 AND $4"
        ))
        .bind(center.lat - lat_delta)
        .bind(center.lat + lat_delta)
        .bind(center.lng - lng_delta)
        .bind(center.lng + lng_delta)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut issues: Vec<(Issue, f64)> = rows
            .iter()
            .map(row_to_issue)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|i| {
                let d = haversine_distance_meters(i.location, center);
                (i, d)
            })
            .filter(|(_, d)| *d <= radius_m)
            .collect();
        issues.sort_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        Ok(issues.into_iter().map(|(i, _)| i).collect())
    }

    async fn issue_statistics(
        &self,
    ) -> Result<Vec<(Category, IssueStatus, i64)>, CurbwatchError> {
        let rows = sqlx::query(
            "SELECT category, status, COUNT(*) AS count FROM issues GROUP BY category, status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let category_s: String = row.try_get("category").map_err(db_err)?;
                let status_s: String = row.try_get("status").map_err(db_err)?;
                let count: i64 = row.try_get("count").map_err(db_err)?;
                Ok((
                    Category::parse(&category_s)
                        .ok_or_else(|| corrupt("category", &category_s))?,
                    IssueStatus::parse(&status_s).ok_or_else(|| corrupt("status", &status_s))?,
                    count,
                ))
            })
            .collect()
    }
}
