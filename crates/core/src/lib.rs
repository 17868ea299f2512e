//! `warden-core`: foundation building blocks shared by every warden crate.
//!
//! This crate contains **pure** primitives (no IO): the error taxonomy, strongly
//! typed identifiers and the request context that scopes cancellation.

pub mod context;
pub mod error;
pub mod id;

pub use context::RequestContext;
pub use error::{codes, AuthError, AuthResult, ErrorKind, ResultExt};
pub use id::{AdminId, RoleId, SessionId};
