use crate::models::{HandoffMode, HandoffStatus};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateHandoffRequest {
    /// Omitted or 0 means every resource of the subject.
    pub resource_id: Option<u64>,

    #[validate(
        url(message = "fallback_target must be an absolute URL"),
        length(max = 2048, message = "fallback_target is too long")
    )]
    pub fallback_target: String,

    #[serde(default)]
    pub mode: HandoffMode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateHandoffResponse {
    pub id: String,
    pub wait_url: String,
    pub approve_url: String,
    pub ttl_seconds: u64,
    pub expires_at: i64,
}

/// Poll response. Deliberately carries nothing but the status.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: HandoffStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    pub store: String,
}
