//! Issue reads (cached) and administrative status transitions.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use uuid::Uuid;

use curbwatch_cache::{CacheTag, CacheTtl};
use curbwatch_common::types::{GeoPoint, IssueStatus};
use curbwatch_engine::lifecycle::{transition_issue, TransitionOutcome};
use curbwatch_engine::traits::Store;
use curbwatch_engine::FieldError;

use crate::{response, AppState};

// --- Status transitions ---

#[derive(Deserialize)]
pub struct SetStatusRequest {
    status: String,
}

pub async fn set_issue_status(
    State(state): State<Arc<AppState>>,
    Path(issue_id): Path<Uuid>,
    Json(body): Json<SetStatusRequest>,
) -> impl IntoResponse {
    let Some(target) = IssueStatus::parse(&body.status) else {
        return response::failure(
            StatusCode::BAD_REQUEST,
            "validation failed",
            vec![FieldError {
                field: "status".into(),
                message: "unrecognized status".into(),
            }],
        );
    };

    match transition_issue(state.store.as_ref(), issue_id, target).await {
        Ok(TransitionOutcome::NoOp) => {
            response::success(StatusCode::OK, serde_json::json!({"changed": false}))
        }
        Ok(TransitionOutcome::Changed { event, .. }) => {
            state.invalidator.invalidate_issue(issue_id);
            state.publisher.publish(event);
            response::success(StatusCode::OK, serde_json::json!({"changed": true}))
        }
        Err(err) => response::from_error(err),
    }
}

// --- Cached reads ---

pub async fn issue_detail(
    State(state): State<Arc<AppState>>,
    Path(issue_id): Path<Uuid>,
) -> impl IntoResponse {
    let key = format!("issue:{issue_id}");
    if let Some(cached) = state.cache.get(&key) {
        return response::success(StatusCode::OK, cached);
    }

    let issue = match state.store.issue_by_id(issue_id).await {
        Ok(Some(issue)) => issue,
        Ok(None) => {
            return response::from_error(curbwatch_common::CurbwatchError::IssueNotFound(issue_id))
        }
        Err(err) => return response::from_error(err),
    };
    let reports = match state.store.reports_for_issue(issue_id).await {
        Ok(reports) => reports,
        Err(err) => return response::from_error(err),
    };

    let mut tags = vec![CacheTag::Issue(issue_id)];
    tags.extend(reports.iter().map(|r| CacheTag::Report(r.id)));

    let value = serde_json::json!({
        "issue": issue,
        "reports": reports,
    });
    state.cache.insert(&key, value.clone(), CacheTtl::Stable, tags);
    response::success(StatusCode::OK, value)
}

#[derive(Deserialize)]
pub struct NearQuery {
    lat: f64,
    lng: f64,
    radius_m: Option<f64>,
}

pub async fn issues_near(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearQuery>,
) -> impl IntoResponse {
    let center = GeoPoint::new(params.lat, params.lng);
    if !center.is_valid() {
        return response::failure(
            StatusCode::BAD_REQUEST,
            "validation failed",
            vec![FieldError {
                field: "lat/lng".into(),
                message: "coordinates out of range".into(),
            }],
        );
    }
    let radius_m = params.radius_m.unwrap_or(500.0).clamp(1.0, 5_000.0);

    // Round coordinates into the key so nearby lookups share an entry.
    let key = format!(
        "issues:near:{:.4}:{:.4}:{}",
        center.lat, center.lng, radius_m as i64
    );
    if let Some(cached) = state.cache.get(&key) {
        return response::success(StatusCode::OK, cached);
    }

    match state.store.issues_near(center, radius_m).await {
        Ok(issues) => {
            let mut tags = vec![CacheTag::Statistics];
            tags.extend(issues.iter().map(|i| CacheTag::Issue(i.id)));
            let value = match serde_json::to_value(&issues) {
                Ok(v) => v,
                Err(e) => return response::from_error(anyhow::Error::from(e).into()),
            };
            state.cache.insert(&key, value.clone(), CacheTtl::Volatile, tags);
            response::success(StatusCode::OK, value)
        }
        Err(err) => response::from_error(err),
    }
}

pub async fn statistics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    const KEY: &str = "stats:summary";
    if let Some(cached) = state.cache.get(KEY) {
        return response::success(StatusCode::OK, cached);
    }

    match state.store.issue_statistics().await {
        Ok(rows) => {
            let breakdown: Vec<serde_json::Value> = rows
                .iter()
                .map(|(category, status, count)| {
                    serde_json::json!({
                        "category": category,
                        "status": status,
                        "count": count,
                    })
                })
                .collect();
            let total: i64 = rows.iter().map(|(_, _, n)| n).sum();
            let value = serde_json::json!({
                "total_issues": total,
                "breakdown": breakdown,
            });
            state
                .cache
                .insert(KEY, value.clone(), CacheTtl::Volatile, vec![CacheTag::Statistics]);
            response::success(StatusCode::OK, value)
        }
        Err(err) => response::from_error(err),
    }
}
