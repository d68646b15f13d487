//! The classifier webhook: asynchronous job completion for a report's image.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};

use curbwatch_engine::callback::{validate_payload, CallbackPayload};

use crate::auth::constant_time_eq;
use crate::{response, AppState};

pub async fn validation_callback(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CallbackPayload>,
) -> impl IntoResponse {
    // Shared-secret check before anything is touched.
    if !constant_time_eq(
        payload.api_key.as_bytes(),
        state.config.callback_api_key.as_bytes(),
    ) {
        return response::failure(StatusCode::UNAUTHORIZED, "invalid api key", Vec::new());
    }

    let validated = match validate_payload(&payload) {
        Ok(v) => v,
        Err(errors) => {
            return response::failure(StatusCode::BAD_REQUEST, "validation failed", errors)
        }
    };

    match state.callbacks.handle(validated).await {
        Ok(outcome) => {
            // Post-commit side effects. Best-effort: none of these can fail
            // the already-committed transition.
            state
                .invalidator
                .invalidate_report(outcome.report_id, outcome.issue_id);
            if let Some(reporter_id) = outcome.reporter_id {
                state.invalidator.invalidate_user(reporter_id);
            }
            state.publisher.publish_all(outcome.events);

            response::success(StatusCode::OK, true)
        }
        Err(err) => response::from_error(err),
    }
}
