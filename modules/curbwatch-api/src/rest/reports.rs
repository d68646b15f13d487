//! Citizen report submission and per-user report views.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use curbwatch_cache::{CacheTag, CacheTtl};
use curbwatch_common::types::{Category, GeoPoint, Locality, Report, ReportStatus};
use curbwatch_engine::traits::Store;
use curbwatch_engine::FieldError;

use crate::{response, AppState};

#[derive(Deserialize)]
pub struct SubmitReportRequest {
    lat: f64,
    lng: f64,
    category: String,
    image_ref: String,
    reporter_id: Option<Uuid>,
    road: Option<String>,
    city: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

fn validate_submission(body: &SubmitReportRequest) -> Result<(GeoPoint, Category), Vec<FieldError>> {
    let mut errors = Vec::new();

    let location = GeoPoint::new(body.lat, body.lng);
    if !location.is_valid() {
        errors.push(FieldError {
            field: "lat/lng".into(),
            message: "coordinates out of range".into(),
        });
    }

    let category = Category::parse(&body.category);
    if category.is_none() {
        errors.push(FieldError {
            field: "category".into(),
            message: "unrecognized category".into(),
        });
    }

    if body.image_ref.trim().is_empty() {
        errors.push(FieldError {
            field: "imageRef".into(),
            message: "image reference must not be empty".into(),
        });
    }

    match category {
        Some(category) if errors.is_empty() => Ok((location, category)),
        _ => Err(errors),
    }
}

pub async fn submit_report(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitReportRequest>,
) -> impl IntoResponse {
    let (location, category) = match validate_submission(&body) {
        Ok(v) => v,
        Err(errors) => {
            return response::failure(StatusCode::BAD_REQUEST, "validation failed", errors)
        }
    };

    // The correlation key handed to the classifier alongside the image.
    let task_id = Uuid::new_v4().to_string();
    let report = Report {
        id: Uuid::new_v4(),
        location,
        category,
        image_ref: body.image_ref.trim().to_string(),
        status: ReportStatus::Pending,
        threshold: None,
        task_id: Some(task_id.clone()),
        issue_id: None,
        reporter_id: body.reporter_id,
        locality: Locality {
            road: body.road,
            city: body.city,
            state: body.state,
            country: body.country,
        },
        created_at: Utc::now(),
    };

    if let Err(err) = state.store.create_report(&report).await {
        return response::from_error(err);
    }

    if let Some(reporter_id) = report.reporter_id {
        state.invalidator.invalidate_user(reporter_id);
    }
    state.invalidator.invalidate_aggregate_statistics();

    tracing::info!(
        report_id = %report.id,
        category = %category,
        "Report submitted, awaiting classification"
    );

    response::success(
        StatusCode::ACCEPTED,
        serde_json::json!({
            "report_id": report.id,
            "task_id": task_id,
        }),
    )
}

pub async fn user_reports(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    let key = format!("user:{user_id}:reports");
    if let Some(cached) = state.cache.get(&key) {
        return response::success(StatusCode::OK, cached);
    }

    match state.store.reports_for_user(user_id).await {
        Ok(reports) => {
            let value = match serde_json::to_value(&reports) {
                Ok(v) => v,
                Err(e) => return response::from_error(anyhow::Error::from(e).into()),
            };
            state
                .cache
                .insert(&key, value.clone(), CacheTtl::Volatile, vec![CacheTag::User(user_id)]);
            response::success(StatusCode::OK, value)
        }
        Err(err) => response::from_error(err),
    }
}
