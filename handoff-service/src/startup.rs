use axum::{
    extract::MatchedPath,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    bot_detection::bot_detection_middleware,
    metrics::metrics_middleware,
    rate_limit::{ip_rate_limit_middleware, IpRateLimit},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use time::Duration;
use tower_http::trace::TraceLayer;
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore as SessionStore, SessionManagerLayer};

use crate::config::Environment;
use crate::handlers::{
    app::{dev_login, health_check, metrics},
    bridge::bridge,
    export::export,
    handoff::{approve, approved_page, consume, create_handoff, status, wait_page},
};
use crate::AppState;

pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let session_layer = SessionManagerLayer::new(SessionStore::default())
        .with_secure(config.security.secure_cookies)
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_expiry(Expiry::OnInactivity(Duration::minutes(
            config.security.session_inactivity_minutes,
        )));

    let status_limiter = IpRateLimit::new(
        config.rate_limit.status_limit,
        config.rate_limit.status_window_seconds,
        config.rate_limit.trust_forwarded_for,
    );
    let global_limiter = IpRateLimit::new(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
        config.rate_limit.trust_forwarded_for,
    );

    let mut router = Router::new()
        .route("/handoff", post(create_handoff))
        .route("/handoff/approved", get(approved_page))
        .route(
            "/handoff/:id",
            get(wait_page).layer(from_fn(bot_detection_middleware)),
        )
        .route("/handoff/:id/approve", get(approve))
        .route(
            "/handoff/consume/:id",
            get(consume).layer(from_fn(bot_detection_middleware)),
        )
        .route("/bridge", get(bridge))
        .route(
            "/status/:id",
            get(status).layer(from_fn_with_state(status_limiter, ip_rate_limit_middleware)),
        )
        .route("/export", get(export))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics));

    if config.environment == Environment::Dev {
        tracing::warn!("Mounting /dev/login; never enable ENVIRONMENT=dev in production");
        router = router.route("/dev/login", get(dev_login));
    }

    router
        .route_layer(from_fn(metrics_middleware))
        .route_layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                // Paths carry handoff ids; only the route template is recorded.
                let route = request
                    .extensions()
                    .get::<MatchedPath>()
                    .map(MatchedPath::as_str)
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    route = %route,
                    version = ?request.version(),
                )
            }),
        )
        .layer(session_layer)
        .layer(from_fn_with_state(global_limiter, ip_rate_limit_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
