use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over `purpose|value`, hex encoded.
///
/// The purpose label keeps signatures minted for one use from verifying in
/// another context that happens to share the secret.
pub fn sign_value(secret: &[u8], purpose: &str, value: &str) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;

    mac.update(purpose.as_bytes());
    mac.update(b"|");
    mac.update(value.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature from [`sign_value`] using constant-time comparison.
pub fn verify_value(
    secret: &[u8],
    purpose: &str,
    value: &str,
    signature: &str,
) -> Result<bool, anyhow::Error> {
    let expected = sign_value(secret, purpose, value)?;

    let expected_bytes = expected.as_bytes();
    let signature_bytes = signature.as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn signature_verifies_for_same_value() {
        let signature = sign_value(SECRET, "approve", "abc123").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify_value(SECRET, "approve", "abc123", &signature).unwrap());
    }

    #[test]
    fn signature_is_bound_to_value_and_purpose() {
        let signature = sign_value(SECRET, "approve", "abc123").unwrap();
        assert!(!verify_value(SECRET, "approve", "abc124", &signature).unwrap());
        assert!(!verify_value(SECRET, "bridge", "abc123", &signature).unwrap());
    }

    #[test]
    fn tampered_or_truncated_signature_is_rejected() {
        let signature = sign_value(SECRET, "approve", "abc123").unwrap();
        let tampered = format!("{}{}", if signature.starts_with('a') { "b" } else { "a" }, &signature[1..]);
        assert!(!verify_value(SECRET, "approve", "abc123", &tampered).unwrap());
        assert!(!verify_value(SECRET, "approve", "abc123", &signature[..10]).unwrap());
        assert!(!verify_value(SECRET, "approve", "abc123", "").unwrap());
    }

    #[test]
    fn different_secret_does_not_verify() {
        let signature = sign_value(SECRET, "approve", "abc123").unwrap();
        assert!(!verify_value(b"another-secret-another-secret-xx", "approve", "abc123", &signature).unwrap());
    }
}
