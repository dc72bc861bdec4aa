use super::HandoffError;
use crate::clock::Clock;
use crate::config::MAX_TOKEN_TTL_SECONDS;
use crate::models::{ImpersonationToken, TokenScope};
use crate::store::{get_json, put_json, token_key, EphemeralStore};
use crate::utils::{generate_opaque_id, is_well_formed_id, TOKEN_BYTES};
use metrics::counter;
use std::sync::Arc;

/// Mints and redeems single-use impersonation tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    store: Arc<dyn EphemeralStore>,
    clock: Arc<dyn Clock>,
    ttl_seconds: u64,
}

impl TokenIssuer {
    /// `ttl_seconds` is capped at ten minutes.
    pub fn new(store: Arc<dyn EphemeralStore>, clock: Arc<dyn Clock>, ttl_seconds: u64) -> Self {
        Self {
            store,
            clock,
            ttl_seconds: ttl_seconds.clamp(1, MAX_TOKEN_TTL_SECONDS),
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub async fn mint(
        &self,
        subject_id: u64,
        scope: TokenScope,
        fallback_target: Option<String>,
    ) -> Result<String, HandoffError> {
        let token = generate_opaque_id(TOKEN_BYTES);
        let now = self.clock.now();
        let record = ImpersonationToken {
            subject_id,
            scope,
            fallback_target,
            issued_at: now,
            expires_at: now.saturating_add(i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX)),
        };

        put_json(
            self.store.as_ref(),
            &token_key(&token),
            &record,
            self.ttl_seconds,
        )
        .await
        .map_err(HandoffError::Store)?;

        tracing::debug!(subject_id, scope = ?scope, "Impersonation token minted");
        Ok(token)
    }

    /// Read a live token without spending it.
    pub async fn peek(&self, token: &str) -> Result<Option<ImpersonationToken>, HandoffError> {
        if !is_well_formed_id(token) {
            return Ok(None);
        }

        let record: Option<ImpersonationToken> = get_json(self.store.as_ref(), &token_key(token))
            .await
            .map_err(HandoffError::Store)?;

        let now = self.clock.now();
        Ok(record.filter(|r| !r.is_expired(now)))
    }

    /// Exchange a token for the subject it stands for. The token is deleted on success.
    pub async fn redeem(&self, token: &str) -> Result<Option<ImpersonationToken>, HandoffError> {
        self.redeem_matching(token, |_| true).await
    }

    /// Like [`redeem`](Self::redeem), but only for a token minted with exactly `scope`.
    ///
    /// A token with a different scope is left untouched.
    pub async fn redeem_for(
        &self,
        token: &str,
        scope: TokenScope,
    ) -> Result<Option<ImpersonationToken>, HandoffError> {
        self.redeem_matching(token, |record| record.scope == scope)
            .await
    }

    async fn redeem_matching<F>(
        &self,
        token: &str,
        accept: F,
    ) -> Result<Option<ImpersonationToken>, HandoffError>
    where
        F: Fn(&ImpersonationToken) -> bool + Send,
    {
        let Some(record) = self.peek(token).await? else {
            return Ok(None);
        };

        if !accept(&record) {
            tracing::warn!(subject_id = record.subject_id, "Token presented for a different scope");
            return Ok(None);
        }

        self.store.delete(&token_key(token)).await.map_err(HandoffError::Store)?;
        counter!("handoff_tokens_redeemed_total").increment(1);
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn issuer(ttl: u64) -> (TokenIssuer, ManualClock) {
        let clock = ManualClock::new(1_700_000_000);
        let store = MemoryStore::new(Arc::new(clock.clone()));
        (
            TokenIssuer::new(Arc::new(store), Arc::new(clock.clone()), ttl),
            clock,
        )
    }

    #[tokio::test]
    async fn token_is_single_use() {
        let (issuer, _) = issuer(600);
        let token = issuer.mint(42, TokenScope::Resource(7), None).await.unwrap();

        let record = issuer.redeem(&token).await.unwrap().unwrap();
        assert_eq!(record.subject_id, 42);
        assert_eq!(record.scope, TokenScope::Resource(7));
        assert!(issuer.redeem(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ttl_is_capped_at_ten_minutes() {
        let (issuer, clock) = issuer(3_600);
        assert_eq!(issuer.ttl_seconds(), 600);

        let token = issuer.mint(42, TokenScope::AllResources, None).await.unwrap();
        clock.advance(600);
        assert!(issuer.redeem(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scope_must_match_exactly() {
        let (issuer, _) = issuer(600);
        let token = issuer.mint(42, TokenScope::Resource(7), None).await.unwrap();

        assert!(issuer
            .redeem_for(&token, TokenScope::Resource(8))
            .await
            .unwrap()
            .is_none());
        assert!(issuer
            .redeem_for(&token, TokenScope::AllResources)
            .await
            .unwrap()
            .is_none());

        let record = issuer
            .redeem_for(&token, TokenScope::Resource(7))
            .await
            .unwrap();
        assert!(record.is_some(), "a mismatched attempt must not burn the token");
    }

    #[tokio::test]
    async fn unknown_or_malformed_tokens_redeem_to_nothing() {
        let (issuer, _) = issuer(600);
        assert!(issuer.redeem("").await.unwrap().is_none());
        assert!(issuer.redeem("not a token").await.unwrap().is_none());
        assert!(issuer.redeem("AAAAAAAAAAAAAAAA").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn peek_leaves_the_token_in_place() {
        let (issuer, clock) = issuer(600);
        let token = issuer
            .mint(42, TokenScope::Resource(7), Some("https://site/x".to_string()))
            .await
            .unwrap();

        let record = issuer.peek(&token).await.unwrap().unwrap();
        assert_eq!(record.fallback_target.as_deref(), Some("https://site/x"));
        assert!(issuer.redeem(&token).await.unwrap().is_some());

        let expiring = issuer.mint(42, TokenScope::AllResources, None).await.unwrap();
        clock.advance(600);
        assert!(issuer.peek(&expiring).await.unwrap().is_none());
    }
}
