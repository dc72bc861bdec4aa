use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the second device is ultimately sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffMode {
    /// A freshly resolved link to the resource itself (e.g. a certificate).
    #[default]
    #[serde(alias = "pdf")]
    Direct,
    /// The JSON data-export endpoint, authorized by an impersonation token.
    #[serde(alias = "json")]
    Export,
}

impl HandoffMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffMode::Direct => "direct",
            HandoffMode::Export => "export",
        }
    }
}

impl fmt::Display for HandoffMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandoffMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" | "pdf" => Ok(HandoffMode::Direct),
            "export" | "json" => Ok(HandoffMode::Export),
            other => Err(format!("unknown handoff mode '{}'", other)),
        }
    }
}

/// Externally visible progress of a handoff, as reported to the waiting device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffStatus {
    Pending,
    Approved,
    Expired,
}

/// A short-lived request to hand a subject's session to another device.
///
/// Lifecycle is strictly `pending → approved → consumed`; the record is
/// deleted as soon as it is consumed, and is unreadable from `expires_at` on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffRequest {
    pub id: String,
    pub subject_id: u64,
    pub created_at: i64,
    pub expires_at: i64,
    pub approved: bool,
    #[serde(default)]
    pub approved_at: Option<i64>,
    pub consumed: bool,
    pub fallback_target: String,
    /// `None` means every resource of the subject.
    #[serde(default)]
    pub resource_id: Option<u64>,
    #[serde(default)]
    pub mode: HandoffMode,
}

impl HandoffRequest {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Seconds left before `expires_at`, never less than 1 so a re-persist
    /// cannot write a record without a TTL.
    pub fn remaining_ttl(&self, now: i64) -> u64 {
        u64::try_from(self.expires_at.saturating_sub(now))
            .unwrap_or(0)
            .max(1)
    }

    pub fn status(&self, now: i64) -> HandoffStatus {
        if self.is_expired(now) {
            HandoffStatus::Expired
        } else if self.approved {
            HandoffStatus::Approved
        } else {
            HandoffStatus::Pending
        }
    }
}

/// Normalizes the "0 means all resources" convention.
pub fn normalize_resource_id(resource_id: Option<u64>) -> Option<u64> {
    resource_id.filter(|id| *id > 0)
}
