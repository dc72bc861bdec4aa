use crate::dtos::{HealthChecks, HealthResponse};
use crate::services::HandoffError;
use crate::session::establish;
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use tower_sessions::Session;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (status, store) = match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!(error = %e, "Store health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    let body = HealthResponse {
        status: if status.is_success() { "healthy" } else { "unhealthy" }.to_string(),
        service: state.config.service_name.clone(),
        version: state.config.service_version.clone(),
        checks: HealthChecks {
            store: store.to_string(),
        },
    };
    (status, Json(body))
}

pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        crate::services::metrics::get_metrics(),
    )
}

/// Same-origin absolute path. Browsers read `//host` and `/\host` as another origin.
fn is_local_path(path: &str) -> bool {
    let mut chars = path.chars();
    chars.next() == Some('/') && !matches!(chars.next(), Some('/' | '\\'))
}

#[derive(Debug, Deserialize)]
pub struct DevLoginQuery {
    pub subject_id: u64,
    pub redirect_to: Option<String>,
}

/// Development stand-in for the host site's login. Only mounted in `dev`.
pub async fn dev_login(
    session: Session,
    Query(query): Query<DevLoginQuery>,
) -> Result<Response, HandoffError> {
    establish(&session, query.subject_id).await?;
    tracing::info!(subject_id = query.subject_id, "Dev login");

    let target = query
        .redirect_to
        .filter(|path| is_local_path(path))
        .unwrap_or_else(|| "/".to_string());
    Ok(Redirect::to(&target).into_response())
}
