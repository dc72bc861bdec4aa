use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;

/// Random bytes in a request id (encodes to 32 URL-safe characters).
pub const REQUEST_ID_BYTES: usize = 24;

/// Random bytes in an impersonation token (encodes to 43 URL-safe characters).
pub const TOKEN_BYTES: usize = 32;

/// Fresh unguessable identifier drawn from the OS-seeded thread RNG.
pub fn generate_opaque_id(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Shape check for ids and tokens arriving from URLs: `[A-Za-z0-9_-]{6,128}`.
pub fn is_well_formed_id(value: &str) -> bool {
    (6..=128).contains(&value.len())
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Absolute `http`/`https` URL check.
pub fn is_http_url(value: &str) -> bool {
    reqwest::Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

pub fn encode_target(target: &str) -> String {
    URL_SAFE_NO_PAD.encode(target.as_bytes())
}

/// Decode a base64url fallback target, keeping it only if it is an http(s) URL.
pub fn decode_target(encoded: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')).ok()?;
    let target = String::from_utf8(bytes).ok()?;
    is_http_url(&target).then_some(target)
}

/// Resource id carried by a target URL's `resource_id` or `course_id` query parameter.
pub fn resource_id_from_target(target: &str) -> Option<u64> {
    let url = reqwest::Url::parse(target).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "resource_id" || key == "course_id")
        .and_then(|(_, value)| value.parse::<u64>().ok())
        .filter(|id| *id > 0)
}

/// First characters of an id, enough to correlate log lines.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
