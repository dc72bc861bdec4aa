pub mod artifacts;
pub mod error;
pub mod handoff;
pub mod metrics;
pub mod proof;
pub mod token;

pub use artifacts::{ArtifactResolver, HttpArtifactResolver, StaticArtifactResolver};
pub use error::HandoffError;
pub use handoff::{ApproveOutcome, CreatedHandoff, HandoffManager, NewHandoff};
pub use proof::ProofSigner;
pub use token::TokenIssuer;
