use serde::{Deserialize, Serialize};

/// Which export a token may unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "resource_id", rename_all = "snake_case")]
pub enum TokenScope {
    Resource(u64),
    AllResources,
}

impl TokenScope {
    pub fn from_resource(resource_id: Option<u64>) -> Self {
        match resource_id {
            Some(id) if id > 0 => TokenScope::Resource(id),
            _ => TokenScope::AllResources,
        }
    }

    pub fn resource_id(&self) -> Option<u64> {
        match self {
            TokenScope::Resource(id) => Some(*id),
            TokenScope::AllResources => None,
        }
    }
}

/// A single-use credential for one downstream fetch on a subject's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpersonationToken {
    pub subject_id: u64,
    pub scope: TokenScope,
    /// Fallback target of the handoff that minted the token. The bridge only
    /// redirects to a fallback that matches it.
    #[serde(default)]
    pub fallback_target: Option<String>,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl ImpersonationToken {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}
