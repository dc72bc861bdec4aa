//! Test helpers for handoff-service integration tests.
//!
//! The real router runs in-process over the memory store and a manual clock.
//! Each simulated device is a [`Browser`] that carries its own session cookie.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use handoff_service::{
    clock::ManualClock,
    config::{
        ArtifactProviderConfig, Environment, HandoffConfig, HandoffSettings, RateLimitConfig,
        RedisConfig, SecurityConfig,
    },
    services::{ArtifactResolver, StaticArtifactResolver},
    startup::build_router,
    store::MemoryStore,
    AppState,
};
use async_trait::async_trait;
use secrecy::Secret;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const BASE_URL: &str = "https://site.test";
pub const START: i64 = 1_700_000_000;

pub fn test_config() -> HandoffConfig {
    HandoffConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "handoff-service-test".to_string(),
        service_version: "0.1.0".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        public_base_url: BASE_URL.to_string(),
        redis: RedisConfig { url: None },
        security: SecurityConfig {
            proof_secret: Secret::new("integration-proof-secret-0123456789".to_string()),
            secure_cookies: false,
            session_inactivity_minutes: 60,
        },
        handoff: HandoffSettings::default(),
        artifacts: ArtifactProviderConfig { provider_url: None },
        rate_limit: RateLimitConfig {
            status_limit: 1000,
            status_window_seconds: 60,
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
            trust_forwarded_for: false,
        },
    }
}

/// Artifact provider that is down: every lookup errors.
pub struct UnreachableArtifactResolver;

pub const UNREACHABLE_PROVIDER_ERROR: &str =
    "error sending request for url (http://courses.internal:8443/subjects/42/export)";

#[async_trait]
impl ArtifactResolver for UnreachableArtifactResolver {
    async fn resource_link(
        &self,
        _subject_id: u64,
        _resource_id: u64,
    ) -> Result<Option<String>, anyhow::Error> {
        Err(anyhow::anyhow!(UNREACHABLE_PROVIDER_ERROR))
    }

    async fn export(
        &self,
        _subject_id: u64,
        _resource_id: Option<u64>,
        _include_html: bool,
    ) -> Result<Option<serde_json::Value>, anyhow::Error> {
        Err(anyhow::anyhow!(UNREACHABLE_PROVIDER_ERROR))
    }
}

pub struct TestApp {
    pub router: Router,
    pub clock: ManualClock,
    pub store: MemoryStore,
    pub state: AppState,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_resolver(StaticArtifactResolver::new())
    }

    pub fn with_resolver(resolver: impl ArtifactResolver + 'static) -> Self {
        Self::with_config(test_config(), resolver)
    }

    pub fn with_config(config: HandoffConfig, resolver: impl ArtifactResolver + 'static) -> Self {
        let clock = ManualClock::new(START);
        let store = MemoryStore::new(Arc::new(clock.clone()));
        let state = AppState::new(
            config,
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            Arc::new(resolver),
        );
        let router = build_router(state.clone());

        Self {
            router,
            clock,
            store,
            state,
        }
    }

    pub async fn get(&self, browser: &mut Browser, uri: &str) -> TestResponse {
        let request = browser
            .request("GET", uri)
            .body(Body::empty())
            .expect("valid request");
        self.send(browser, request).await
    }

    pub async fn get_with_headers(
        &self,
        browser: &mut Browser,
        uri: &str,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = browser.request("GET", uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).expect("valid request");
        self.send(browser, request).await
    }

    pub async fn post_json(
        &self,
        browser: &mut Browser,
        uri: &str,
        body: serde_json::Value,
    ) -> TestResponse {
        let request = browser
            .request("POST", uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("valid request");
        self.send(browser, request).await
    }

    /// Log `browser` in as `subject_id` through the dev login route.
    pub async fn login(&self, browser: &mut Browser, subject_id: u64) {
        let response = self
            .get(browser, &format!("/dev/login?subject_id={}", subject_id))
            .await;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        assert!(browser.cookie.is_some(), "dev login must set a session cookie");
    }

    /// Create a handoff as `subject_id` from a fresh logged-in device.
    pub async fn create_handoff(&self, subject_id: u64, body: serde_json::Value) -> CreatedHandoff {
        let mut device_a = Browser::new();
        self.login(&mut device_a, subject_id).await;
        let response = self.post_json(&mut device_a, "/handoff", body).await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);

        let json = response.json();
        CreatedHandoff {
            id: json["id"].as_str().expect("id").to_string(),
            wait_url: json["wait_url"].as_str().expect("wait_url").to_string(),
            approve_url: json["approve_url"].as_str().expect("approve_url").to_string(),
            device_a,
        }
    }

    async fn send(&self, browser: &mut Browser, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        browser.store_cookie(&headers);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        }
    }
}

pub struct CreatedHandoff {
    pub id: String,
    pub wait_url: String,
    pub approve_url: String,
    /// The logged-in device that created the handoff.
    pub device_a: Browser,
}

impl CreatedHandoff {
    pub fn approve_path(&self) -> String {
        strip_base(&self.approve_url)
    }

    pub fn wait_path(&self) -> String {
        strip_base(&self.wait_url)
    }
}

/// A cookie jar holding at most the session cookie.
#[derive(Default)]
pub struct Browser {
    pub cookie: Option<String>,
}

impl Browser {
    pub fn new() -> Self {
        Self::default()
    }

    fn request(&self, method: &str, uri: &str) -> axum::http::request::Builder {
        let mut builder = Request::builder().method(method).uri(strip_base(uri));
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder
    }

    fn store_cookie(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(header::SET_COOKIE) {
            let Ok(value) = value.to_str() else { continue };
            let pair = value.split(';').next().unwrap_or_default().trim();
            let cleared = value.contains("Max-Age=0") || pair.ends_with('=');
            if cleared {
                self.cookie = None;
            } else {
                self.cookie = Some(pair.to_string());
            }
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("JSON body")
    }

    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    /// Target of a client-side redirect page.
    pub fn redirect_target(&self) -> String {
        let marker = "id=\"target\" href=\"";
        let start = self.body.find(marker).expect("redirect page") + marker.len();
        let end = self.body[start..].find('"').expect("closing quote") + start;
        html_unescape(&self.body[start..end])
    }
}

pub fn strip_base(url: &str) -> String {
    url.strip_prefix(BASE_URL).unwrap_or(url).to_string()
}

fn html_unescape(value: &str) -> String {
    value
        .replace("&#x2f;", "/")
        .replace("&#x27;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Query parameter `name` from a URL.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| {
            urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
    })
}
