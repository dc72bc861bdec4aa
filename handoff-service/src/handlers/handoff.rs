//! The browser-facing protocol steps: create, wait, approve, consume, status.

use super::bridge::bridge_url;
use super::pages::{ApprovedTemplate, RedirectTemplate, WaitTemplate, SOON_EXPIRING_SECONDS};
use crate::dtos::{CreateHandoffRequest, CreateHandoffResponse, StatusResponse};
use crate::models::TokenScope;
use crate::services::{ApproveOutcome, HandoffError, NewHandoff};
use crate::session::{establish, CurrentSubject};
use crate::utils::{encode_target, short_id, ValidatedJson};
use crate::AppState;
use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;

/// Device A asks for a new handoff of its own session.
pub async fn create_handoff(
    State(state): State<AppState>,
    current: CurrentSubject,
    ValidatedJson(payload): ValidatedJson<CreateHandoffRequest>,
) -> Result<impl IntoResponse, AppError> {
    let subject_id = current.require()?;

    let created = state
        .handoffs
        .create(NewHandoff {
            subject_id,
            fallback_target: payload.fallback_target,
            resource_id: payload.resource_id,
            mode: payload.mode,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateHandoffResponse {
            id: created.id,
            wait_url: created.wait_url,
            approve_url: created.approve_url,
            ttl_seconds: created.ttl_seconds,
            expires_at: created.expires_at,
        }),
    ))
}

/// Device B lands here from the QR code and polls until approval.
pub async fn wait_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, HandoffError> {
    let request = state
        .handoffs
        .get(&id)
        .await?
        .ok_or(HandoffError::NotFound)?;

    let settings = &state.config.handoff;
    let page = WaitTemplate {
        status_url: state.handoffs.status_url(&id),
        consume_url: state.handoffs.consume_url(&id),
        remaining_seconds: request.expires_at - state.handoffs.now(),
        soon_expiring_seconds: SOON_EXPIRING_SECONDS,
        poll_interval_ms: settings.poll_interval_ms,
        max_poll_attempts: settings.max_poll_attempts,
        consume_delay_ms: settings.consume_redirect_delay_ms,
    };
    Ok(page.into_response())
}

#[derive(Debug, Deserialize)]
pub struct ApproveQuery {
    pub proof: Option<String>,
}

pub async fn approve(
    State(state): State<AppState>,
    current: CurrentSubject,
    Path(id): Path<String>,
    Query(query): Query<ApproveQuery>,
    OriginalUri(uri): OriginalUri,
) -> Result<Response, HandoffError> {
    let proof = query.proof.unwrap_or_default();
    state.handoffs.verify_proof(&id, &proof)?;

    let Some(subject_id) = current.subject_id else {
        let back = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string());
        let login_url = &state.config.handoff.login_url;
        let separator = if login_url.contains('?') { '&' } else { '?' };
        return Ok(Redirect::to(&format!(
            "{}{}redirect_to={}",
            login_url,
            separator,
            urlencoding::encode(&back)
        ))
        .into_response());
    };

    let target = match state.handoffs.approve(&id, &proof, subject_id).await? {
        ApproveOutcome::Approved => "/handoff/approved",
        ApproveOutcome::AlreadyApproved => "/handoff/approved?already=1",
    };
    Ok(Redirect::to(target).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ApprovedQuery {
    pub already: Option<u8>,
}

pub async fn approved_page(Query(query): Query<ApprovedQuery>) -> impl IntoResponse {
    ApprovedTemplate {
        already_approved: query.already.unwrap_or(0) == 1,
    }
}

/// Device B turns an approved request into its own session.
///
/// The redirect to the bridge is client-side so the new session cookie is
/// stored by the browser before the bridge request is made.
pub async fn consume(
    State(state): State<AppState>,
    current: CurrentSubject,
    Path(id): Path<String>,
) -> Result<Response, HandoffError> {
    let request = state.handoffs.consume(&id).await?;

    establish(&current.session, request.subject_id).await?;

    let token = state
        .tokens
        .mint(
            request.subject_id,
            TokenScope::from_resource(request.resource_id),
            Some(request.fallback_target.clone()),
        )
        .await?;

    tracing::info!(
        handoff_id = %short_id(&id),
        subject_id = request.subject_id,
        step = "consume",
        "Session handed off"
    );

    let target = bridge_url(
        &state.config.public_base_url,
        1,
        request.resource_id,
        request.mode,
        &token,
        &encode_target(&request.fallback_target),
    );
    Ok(RedirectTemplate::new(
        "Signing you in",
        "One moment while we open your document.",
        target,
        state.config.handoff.consume_redirect_delay_ms,
    )
    .into_response())
}

pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let status = state.handoffs.status(&id).await?;
    Ok(Json(StatusResponse { status }))
}
