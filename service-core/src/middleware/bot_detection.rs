use crate::error::AppError;
use axum::{
    extract::Request,
    http::{HeaderMap, Method, header},
    middleware::Next,
    response::Response,
};
use isbot::Bots;
use std::sync::OnceLock;
use tracing::warn;

/// Requests scoring at or above this are rejected.
pub const BLOCK_THRESHOLD: u32 = 100;

fn bots() -> &'static Bots {
    static BOTS: OnceLock<Bots> = OnceLock::new();
    BOTS.get_or_init(Bots::default)
}

/// Heuristic bot score for a request's headers.
///
/// Known crawler user agents (link unfurlers, previewers) score 100. Browser
/// user agents missing the headers every real browser sends score 30-70.
pub fn bot_score(headers: &HeaderMap) -> u32 {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if user_agent.is_empty() {
        return 50;
    }

    let mut score = 0;
    if bots().is_bot(user_agent) {
        score += 100;
    }

    if user_agent.starts_with("Mozilla/") {
        let missing_headers = [
            header::ACCEPT,
            header::ACCEPT_LANGUAGE,
            header::ACCEPT_ENCODING,
        ]
        .iter()
        .filter(|name| !headers.contains_key(*name))
        .count();

        score += match missing_headers {
            0 => 0,
            1 => 30,
            _ => 70,
        };
    }

    score
}

/// Rejects suspected crawlers with 403.
///
/// Mount it on routes with side effects reachable by GET, where a link
/// preview fetch would otherwise act on the user's behalf.
pub async fn bot_detection_middleware(request: Request, next: Next) -> Result<Response, AppError> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let score = bot_score(request.headers());
    if score >= BLOCK_THRESHOLD {
        warn!(
            user_agent = ?request.headers().get(header::USER_AGENT),
            score = %score,
            path = %request.uri().path(),
            "Blocking suspected bot request"
        );
        return Err(AppError::Forbidden(anyhow::anyhow!("Bot detected")));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn crawler_user_agent_is_blocked() {
        let map = headers(&[(header::USER_AGENT, "Slackbot-LinkExpanding 1.0 (+https://api.slack.com/robots)")]);
        assert!(bot_score(&map) >= BLOCK_THRESHOLD);
    }

    #[test]
    fn full_browser_request_passes() {
        let map = headers(&[
            (
                header::USER_AGENT,
                "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
            ),
            (header::ACCEPT, "text/html"),
            (header::ACCEPT_LANGUAGE, "en-US"),
            (header::ACCEPT_ENCODING, "gzip"),
        ]);
        assert_eq!(bot_score(&map), 0);
    }

    #[test]
    fn missing_user_agent_is_suspicious_but_allowed() {
        let score = bot_score(&HeaderMap::new());
        assert!(score > 0 && score < BLOCK_THRESHOLD);
    }
}
