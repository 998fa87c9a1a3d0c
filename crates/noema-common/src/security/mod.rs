//! Access control for entity operations
//!
//! - [`auth`]: owner/delegate/logic-target authorization and signed delegation
//! - [`guard`]: per-entity reentrancy guard

pub mod auth;
pub mod guard;

pub use auth::{AuthScope, AuthorizationLayer};
pub use guard::{CallGuard, GuardScope};
