//! Final hop of a handoff: wait for the new session to be visible, then send
//! the browser to whatever the subject came for.

use super::pages::RedirectTemplate;
use crate::models::handoff::normalize_resource_id;
use crate::models::HandoffMode;
use crate::services::metrics::{record_bridge_outcome, BridgeOutcome};
use crate::services::HandoffError;
use crate::session::CurrentSubject;
use crate::utils::{decode_target, is_well_formed_id};
use crate::AppState;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

/// The first visit is attempt 1; one self-reload is allowed after that.
const MAX_BRIDGE_ATTEMPTS: u32 = 2;

#[derive(Debug, Deserialize)]
pub struct BridgeQuery {
    pub bridge: Option<u32>,
    pub resource_id: Option<u64>,
    pub mode: Option<String>,
    pub token: Option<String>,
    pub fallback_b64: Option<String>,
}

pub fn bridge_url(
    base_url: &str,
    attempt: u32,
    resource_id: Option<u64>,
    mode: HandoffMode,
    token: &str,
    fallback_b64: &str,
) -> String {
    format!(
        "{}/bridge?bridge={}&resource_id={}&mode={}&token={}&fallback_b64={}",
        base_url.trim_end_matches('/'),
        attempt,
        resource_id.unwrap_or(0),
        mode,
        urlencoding::encode(token),
        urlencoding::encode(fallback_b64),
    )
}

pub fn export_url(base_url: &str, resource_id: Option<u64>, token: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    let token = urlencoding::encode(token);
    match resource_id {
        Some(resource_id) => format!(
            "{}/export?resource_id={}&token={}",
            base_url, resource_id, token
        ),
        None => format!("{}/export?token={}", base_url, token),
    }
}

pub async fn bridge(
    State(state): State<AppState>,
    current: CurrentSubject,
    Query(query): Query<BridgeQuery>,
) -> Result<Response, HandoffError> {
    let base_url = state.config.public_base_url.as_str();
    let attempt = query.bridge.unwrap_or(1).max(1);
    let resource_id = normalize_resource_id(query.resource_id);
    let mode = query
        .mode
        .as_deref()
        .and_then(|m| m.parse::<HandoffMode>().ok())
        .unwrap_or_default();
    let token = query.token.as_deref().filter(|t| is_well_formed_id(t));

    let Some(subject_id) = current.subject_id else {
        if attempt < MAX_BRIDGE_ATTEMPTS {
            tracing::info!(attempt, step = "bridge", "Session not visible yet, retrying once");
            record_bridge_outcome(BridgeOutcome::Retry);
            let again = bridge_url(
                base_url,
                attempt + 1,
                resource_id,
                mode,
                token.unwrap_or_default(),
                query.fallback_b64.as_deref().unwrap_or_default(),
            );
            return Ok(RedirectTemplate::new(
                "Signing you in",
                "Still finishing sign-in…",
                again,
                state.config.handoff.bridge_retry_delay_ms,
            )
            .into_response());
        }
        tracing::warn!(attempt, step = "bridge", "Session never became visible");
        record_bridge_outcome(BridgeOutcome::Unauthenticated);
        return Err(HandoffError::Unauthenticated);
    };

    let resolved = match (mode, resource_id) {
        (HandoffMode::Direct, Some(resource_id)) => {
            match state.resolver.resource_link(subject_id, resource_id).await {
                Ok(link) => link.map(|url| (url, BridgeOutcome::Artifact)),
                Err(e) => {
                    tracing::warn!(
                        subject_id,
                        resource_id,
                        error = %e,
                        "Artifact lookup failed, using fallback"
                    );
                    None
                }
            }
        }
        (HandoffMode::Direct, None) => None,
        (HandoffMode::Export, _) => {
            token.map(|token| (export_url(base_url, resource_id, token), BridgeOutcome::Export))
        }
    };

    let resolved = match resolved {
        Some(resolved) => Some(resolved),
        None => issued_fallback(&state, subject_id, token, query.fallback_b64.as_deref())
            .await
            .map(|url| (url, BridgeOutcome::Fallback)),
    };

    let (target, outcome) = resolved
        .unwrap_or_else(|| (format!("{}/", base_url.trim_end_matches('/')), BridgeOutcome::Root));

    record_bridge_outcome(outcome);
    tracing::info!(
        subject_id,
        mode = %mode,
        outcome = outcome.as_str(),
        step = "bridge",
        "Handoff complete"
    );

    Ok(RedirectTemplate::new("Opening", "Opening your document…", target, 0).into_response())
}

/// The decoded fallback, but only when it is the one recorded on the
/// subject's own handoff token.
async fn issued_fallback(
    state: &AppState,
    subject_id: u64,
    token: Option<&str>,
    fallback_b64: Option<&str>,
) -> Option<String> {
    let requested = fallback_b64.and_then(decode_target)?;
    let token = token?;

    match state.tokens.peek(token).await {
        Ok(Some(record))
            if record.subject_id == subject_id
                && record.fallback_target.as_deref() == Some(requested.as_str()) =>
        {
            Some(requested)
        }
        Ok(_) => {
            tracing::warn!(subject_id, step = "bridge", "Fallback target was not issued with this token");
            None
        }
        Err(e) => {
            tracing::warn!(subject_id, step = "bridge", error = %e, "Token lookup failed, skipping fallback");
            None
        }
    }
}
