pub mod handoff;
pub mod token;

pub use handoff::{HandoffMode, HandoffRequest, HandoffStatus};
pub use token::{ImpersonationToken, TokenScope};
