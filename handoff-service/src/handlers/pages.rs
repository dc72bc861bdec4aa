use crate::services::HandoffError;
use askama::Template;
use axum::response::{IntoResponse, Response};

/// Seconds before expiry at which the wait page starts warning.
pub const SOON_EXPIRING_SECONDS: i64 = 30;

#[derive(Template)]
#[template(path = "wait.html")]
pub struct WaitTemplate {
    pub status_url: String,
    pub consume_url: String,
    pub remaining_seconds: i64,
    pub soon_expiring_seconds: i64,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub consume_delay_ms: u64,
}

/// Client-side redirect. Used wherever a freshly set cookie has to reach the
/// browser before the next request is made.
#[derive(Template)]
#[template(path = "redirect.html")]
pub struct RedirectTemplate {
    pub title: String,
    pub message: String,
    pub target: String,
    pub delay_ms: u64,
}

impl RedirectTemplate {
    pub fn new(title: &str, message: &str, target: String, delay_ms: u64) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            target,
            delay_ms,
        }
    }

    /// Whole seconds for the `<meta refresh>` fallback.
    pub fn delay_seconds(&self) -> u64 {
        self.delay_ms.div_ceil(1000)
    }
}

#[derive(Template)]
#[template(path = "approved.html")]
pub struct ApprovedTemplate {
    pub already_approved: bool,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub status: u16,
    pub title: String,
    pub message: String,
}

impl HandoffError {
    fn title(&self) -> &'static str {
        match self {
            HandoffError::InvalidProof | HandoffError::Forbidden => "Not allowed",
            HandoffError::NotFound | HandoffError::Gone => "Link expired",
            HandoffError::NotApproved => "Waiting for approval",
            HandoffError::AlreadyConsumed => "Already used",
            HandoffError::Unauthenticated => "Sign in required",
            HandoffError::InvalidInput(_) => "Invalid request",
            HandoffError::Store(_) | HandoffError::Session(_) | HandoffError::Internal(_) => {
                "Something went wrong"
            }
        }
    }
}

impl IntoResponse for HandoffError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if self.is_internal() {
            tracing::error!(error = ?self, kind = self.kind(), "Handoff step failed");
            "Please try again in a moment.".to_string()
        } else {
            tracing::info!(kind = self.kind(), status = status.as_u16(), "Handoff step rejected");
            self.to_string()
        };

        let page = ErrorTemplate {
            status: status.as_u16(),
            title: self.title().to_string(),
            message,
        };
        (status, page).into_response()
    }
}
