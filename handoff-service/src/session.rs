//! The authenticated identity attached to a browser session.
//!
//! Login itself lives outside this service; all it leaves behind is the
//! `subject_id` session key, which is what every handler here reads.

use crate::services::HandoffError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use tower_sessions::Session;

pub const SUBJECT_KEY: &str = "subject_id";

/// The subject of the current session, if one is logged in.
pub struct CurrentSubject {
    pub session: Session,
    pub subject_id: Option<u64>,
}

impl CurrentSubject {
    pub fn require(&self) -> Result<u64, HandoffError> {
        self.subject_id.ok_or(HandoffError::Unauthenticated)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentSubject
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        let subject_id = match session.get::<u64>(SUBJECT_KEY).await {
            Ok(subject_id) => subject_id,
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable session, treating as anonymous");
                None
            }
        };

        Ok(Self {
            session,
            subject_id,
        })
    }
}

/// Log `subject_id` into `session`, rotating the session id first.
pub async fn establish(session: &Session, subject_id: u64) -> Result<(), HandoffError> {
    session.cycle_id().await?;
    session.insert(SUBJECT_KEY, subject_id).await?;
    Ok(())
}
