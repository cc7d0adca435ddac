//! File downloads

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::get};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::app::AppState;
use crate::db::{AttendanceFilter, AttendanceStatus};
use crate::services::ServiceError;

#[derive(Debug, Default, Deserialize)]
pub struct AttendanceExportParams {
    pub date: Option<NaiveDate>,
    pub status: Option<AttendanceStatus>,
    pub search: Option<String>,
}

/// Service failure as a JSON error body with a matching status
pub fn error_response(err: ServiceError) -> Response {
    let status = match &err {
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
        ServiceError::Validation(_) | ServiceError::InvalidState(_) => StatusCode::BAD_REQUEST,
        ServiceError::Conflict(_) => StatusCode::CONFLICT,
        ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        ServiceError::Database(_) | ServiceError::Internal(_) => {
            tracing::error!(error = %err, "Export failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let body = Json(serde_json::json!({
        "success": false,
        "code": err.code(),
        "error": err.to_string(),
    }));
    (status, body).into_response()
}

/// Attendance log as CSV, staff only
async fn attendance_csv(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AttendanceExportParams>,
) -> Response {
    let Some(actor) = state.actor_from_headers(&headers).await else {
        return error_response(ServiceError::unauthorized("Authentication required"));
    };

    let filter = AttendanceFilter {
        user_id: None,
        status: params.status,
        date: params.date,
        search: params.search,
    };
    match state
        .services
        .circulation
        .export_attendance_csv(&actor, filter)
        .await
    {
        Ok(csv) => {
            let filename = format!(
                "attachment; filename=\"attendance-{}.csv\"",
                Utc::now().format("%Y%m%d")
            );
            (
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, filename),
                ],
                csv,
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/attendance/export.csv", get(attendance_csv))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        let cases = [
            (ServiceError::not_found("x"), StatusCode::NOT_FOUND),
            (ServiceError::forbidden("x"), StatusCode::FORBIDDEN),
            (ServiceError::validation("x"), StatusCode::BAD_REQUEST),
            (ServiceError::invalid_state("x"), StatusCode::BAD_REQUEST),
            (ServiceError::conflict("x"), StatusCode::CONFLICT),
            (ServiceError::unauthorized("x"), StatusCode::UNAUTHORIZED),
        ];
        for (err, status) in cases {
            assert_eq!(error_response(err).status(), status);
        }
    }
}
