use super::HandoffError;
use secrecy::{ExposeSecret, Secret};
use service_core::utils::signature::{sign_value, verify_value};

const APPROVE_PURPOSE: &str = "handoff-approve";

/// Signs and checks the `proof` carried by approve links.
///
/// A proof is an HMAC of the request id under the server secret, so it can be
/// neither derived from the id nor replayed against another request.
#[derive(Clone)]
pub struct ProofSigner {
    secret: Secret<String>,
}

impl ProofSigner {
    pub fn new(secret: Secret<String>) -> Self {
        Self { secret }
    }

    pub fn sign(&self, request_id: &str) -> Result<String, HandoffError> {
        sign_value(
            self.secret.expose_secret().as_bytes(),
            APPROVE_PURPOSE,
            request_id,
        )
        .map_err(HandoffError::Internal)
    }

    pub fn verify(&self, request_id: &str, proof: &str) -> bool {
        verify_value(
            self.secret.expose_secret().as_bytes(),
            APPROVE_PURPOSE,
            request_id,
            proof,
        )
        .unwrap_or(false)
    }
}
