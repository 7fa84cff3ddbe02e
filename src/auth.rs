//! Auth-domain identifiers, principals, sessions, roles, and redacted secrets.

pub mod id;
pub mod principal;
pub mod role;
pub mod secret;

pub use id::*;
pub use principal::*;
pub use role::*;
pub use secret::*;
