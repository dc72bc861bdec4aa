use crate::models::handoff::normalize_resource_id;
use crate::models::TokenScope;
use crate::session::CurrentSubject;
use crate::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub resource_id: Option<u64>,
    pub token: Option<String>,
    pub include_html: Option<String>,
}

/// JSON export of a subject's resources.
///
/// With `token`, the token alone decides who the caller is and must have been
/// minted for exactly the requested scope. Without one, the session subject is
/// used. The token is spent on success.
pub async fn export(
    State(state): State<AppState>,
    current: CurrentSubject,
    Query(query): Query<ExportQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let resource_id = normalize_resource_id(query.resource_id);
    let include_html = matches!(query.include_html.as_deref(), Some("1" | "true"));

    let subject_id = match query.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => state
            .tokens
            .redeem_for(token, TokenScope::from_resource(resource_id))
            .await?
            .map(|record| record.subject_id),
        None => current.subject_id,
    };

    let Some(subject_id) = subject_id else {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "A valid session or token is required"
        )));
    };

    match state
        .resolver
        .export(subject_id, resource_id, include_html)
        .await
    {
        Ok(Some(payload)) => {
            tracing::info!(subject_id, resource_id = ?resource_id, "Export served");
            Ok(Json(payload))
        }
        Ok(None) => Err(AppError::NotFound(anyhow::anyhow!("Nothing to export"))),
        Err(e) => {
            tracing::error!(subject_id, error = %e, "Artifact provider export failed");
            Err(AppError::BadGateway("artifact provider unavailable".to_string()))
        }
    }
}
