use super::{HandoffError, ProofSigner};
use crate::clock::Clock;
use crate::models::handoff::normalize_resource_id;
use crate::models::{HandoffMode, HandoffRequest, HandoffStatus};
use crate::store::{get_json, put_json, request_key, EphemeralStore};
use crate::utils::{
    generate_opaque_id, is_http_url, is_well_formed_id, resource_id_from_target, short_id,
    REQUEST_ID_BYTES,
};
use metrics::counter;
use std::sync::Arc;

/// Fresh-id attempts before giving up; a collision at 192 bits means a broken RNG.
const MAX_ID_ATTEMPTS: usize = 3;

/// Input for a new handoff, as supplied by the authenticated first device.
#[derive(Debug, Clone)]
pub struct NewHandoff {
    pub subject_id: u64,
    pub fallback_target: String,
    pub resource_id: Option<u64>,
    pub mode: HandoffMode,
}

/// A stored request plus the links the first device needs to display.
#[derive(Debug, Clone)]
pub struct CreatedHandoff {
    pub id: String,
    /// Opened by the second device (QR target).
    pub wait_url: String,
    /// Opened by the first device to approve.
    pub approve_url: String,
    pub ttl_seconds: u64,
    pub expires_at: i64,
    pub resource_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproveOutcome {
    Approved,
    /// Repeat click on the approve link. Nothing was written.
    AlreadyApproved,
}

/// Owns the handoff request lifecycle: create, read, approve, consume.
#[derive(Clone)]
pub struct HandoffManager {
    store: Arc<dyn EphemeralStore>,
    clock: Arc<dyn Clock>,
    proof: ProofSigner,
    base_url: String,
    ttl_seconds: u64,
}

impl HandoffManager {
    pub fn new(
        store: Arc<dyn EphemeralStore>,
        clock: Arc<dyn Clock>,
        proof: ProofSigner,
        base_url: impl Into<String>,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            store,
            clock,
            proof,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ttl_seconds,
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn wait_url(&self, id: &str) -> String {
        format!("{}/handoff/{}", self.base_url, id)
    }

    pub fn consume_url(&self, id: &str) -> String {
        format!("{}/handoff/consume/{}", self.base_url, id)
    }

    pub fn status_url(&self, id: &str) -> String {
        format!("{}/status/{}", self.base_url, id)
    }

    pub fn approve_url(&self, id: &str) -> Result<String, HandoffError> {
        let proof = self.proof.sign(id)?;
        Ok(format!("{}/handoff/{}/approve?proof={}", self.base_url, id, proof))
    }

    pub async fn create(&self, new: NewHandoff) -> Result<CreatedHandoff, HandoffError> {
        if !is_http_url(&new.fallback_target) {
            return Err(HandoffError::InvalidInput(
                "fallback_target must be an absolute http(s) URL".to_string(),
            ));
        }

        let resource_id = normalize_resource_id(new.resource_id)
            .or_else(|| resource_id_from_target(&new.fallback_target));

        let id = self.fresh_id().await?;
        let now = self.clock.now();
        let ttl = i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX);
        let request = HandoffRequest {
            id: id.clone(),
            subject_id: new.subject_id,
            created_at: now,
            expires_at: now.saturating_add(ttl),
            approved: false,
            approved_at: None,
            consumed: false,
            fallback_target: new.fallback_target,
            resource_id,
            mode: new.mode,
        };

        put_json(
            self.store.as_ref(),
            &request_key(&id),
            &request,
            self.ttl_seconds,
        )
        .await
        .map_err(HandoffError::Store)?;

        counter!("handoff_requests_created_total", "mode" => request.mode.as_str()).increment(1);
        tracing::info!(
            handoff_id = %short_id(&id),
            subject_id = request.subject_id,
            resource_id = ?request.resource_id,
            mode = %request.mode,
            expires_at = request.expires_at,
            "Handoff request created"
        );

        Ok(CreatedHandoff {
            wait_url: self.wait_url(&id),
            approve_url: self.approve_url(&id)?,
            ttl_seconds: self.ttl_seconds,
            expires_at: request.expires_at,
            resource_id,
            id,
        })
    }

    /// The live request, or `None` if it is missing, expired, or the id is malformed.
    pub async fn get(&self, id: &str) -> Result<Option<HandoffRequest>, HandoffError> {
        let now = self.clock.now();
        Ok(self
            .load(id)
            .await?
            .filter(|request| !request.is_expired(now)))
    }

    pub async fn status(&self, id: &str) -> Result<HandoffStatus, HandoffError> {
        let now = self.clock.now();
        Ok(self
            .load(id)
            .await?
            .map(|request| request.status(now))
            .unwrap_or(HandoffStatus::Expired))
    }

    pub fn verify_proof(&self, id: &str, proof: &str) -> Result<(), HandoffError> {
        if is_well_formed_id(id) && self.proof.verify(id, proof) {
            Ok(())
        } else {
            Err(HandoffError::InvalidProof)
        }
    }

    /// Mark a request approved on behalf of its own subject.
    ///
    /// The record is re-persisted with its remaining TTL so approval never
    /// extends the absolute expiry.
    pub async fn approve(
        &self,
        id: &str,
        proof: &str,
        caller_subject_id: u64,
    ) -> Result<ApproveOutcome, HandoffError> {
        self.verify_proof(id, proof)?;

        let now = self.clock.now();
        let mut request = match self.load(id).await? {
            Some(request) if !request.is_expired(now) => request,
            _ => return Err(HandoffError::NotFound),
        };

        if request.subject_id != caller_subject_id {
            tracing::warn!(
                handoff_id = %short_id(id),
                subject_id = request.subject_id,
                caller_subject_id,
                "Approve attempted by a different subject"
            );
            return Err(HandoffError::Forbidden);
        }

        if request.approved {
            return Ok(ApproveOutcome::AlreadyApproved);
        }

        request.approved = true;
        request.approved_at = Some(now);
        put_json(
            self.store.as_ref(),
            &request_key(id),
            &request,
            request.remaining_ttl(now),
        )
        .await
        .map_err(HandoffError::Store)?;

        counter!("handoff_approvals_total").increment(1);
        tracing::info!(
            handoff_id = %short_id(id),
            subject_id = request.subject_id,
            "Handoff request approved"
        );

        Ok(ApproveOutcome::Approved)
    }

    /// Use up an approved request. Returns the snapshot taken before deletion.
    pub async fn consume(&self, id: &str) -> Result<HandoffRequest, HandoffError> {
        let now = self.clock.now();
        let mut request = match self.load(id).await? {
            Some(request) if !request.is_expired(now) => request,
            _ => return Err(HandoffError::Gone),
        };

        if !request.approved {
            return Err(HandoffError::NotApproved);
        }
        if request.consumed {
            return Err(HandoffError::AlreadyConsumed);
        }

        request.consumed = true;
        let key = request_key(id);
        put_json(
            self.store.as_ref(),
            &key,
            &request,
            request.remaining_ttl(now),
        )
        .await
        .map_err(HandoffError::Store)?;
        self.store
            .delete(&key)
            .await
            .map_err(HandoffError::Store)?;

        counter!("handoff_consumed_total").increment(1);
        tracing::info!(
            handoff_id = %short_id(id),
            subject_id = request.subject_id,
            "Handoff request consumed"
        );

        Ok(request)
    }

    async fn load(&self, id: &str) -> Result<Option<HandoffRequest>, HandoffError> {
        if !is_well_formed_id(id) {
            return Ok(None);
        }
        get_json(self.store.as_ref(), &request_key(id))
            .await
            .map_err(HandoffError::Store)
    }

    async fn fresh_id(&self) -> Result<String, HandoffError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = generate_opaque_id(REQUEST_ID_BYTES);
            let taken = self
                .store
                .get(&request_key(&id))
                .await
                .map_err(HandoffError::Store)?
                .is_some();
            if !taken {
                return Ok(id);
            }
        }
        Err(HandoffError::Internal(anyhow::anyhow!(
            "could not allocate an unused handoff id"
        )))
    }
}
