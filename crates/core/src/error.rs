//! Error model shared by every layer of warden.
//!
//! Every failure carries a coarse [`ErrorKind`] (what the transport layer maps to
//! a status), a stable machine-readable `code` (what clients switch on), a human
//! message, and the chain of call-site contexts it travelled through.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Result type used across warden.
pub type AuthResult<T> = Result<T, AuthError>;

/// Stable error codes.
///
/// These strings are part of the external contract: transports surface them to
/// clients verbatim.
pub mod codes {
    pub const ADMIN_NOT_FOUND: &str = "ADMIN_NOT_FOUND";
    pub const USERNAME_EXISTS: &str = "USERNAME_EXISTS";
    pub const ADMIN_ALREADY_DISABLED: &str = "ADMIN_ALREADY_DISABLED";
    pub const CANNOT_DISABLE_LAST_SUPERADMIN: &str = "CANNOT_DISABLE_LAST_SUPERADMIN";
    pub const CANNOT_DEMOTE_LAST_SUPERADMIN: &str = "CANNOT_DEMOTE_LAST_SUPERADMIN";

    pub const INVALID_CREDENTIALS: &str = "INVALID_CREDENTIALS";
    pub const ACTOR_DISABLED: &str = "ADMIN_DISABLED";
    pub const INVALID_REFRESH_TOKEN: &str = "INVALID_REFRESH_TOKEN";
    pub const REFRESH_TOKEN_EXPIRED: &str = "REFRESH_TOKEN_EXPIRED";
    pub const INVALID_ACCESS_TOKEN: &str = "INVALID_ACCESS_TOKEN";
    pub const ACCESS_TOKEN_EXPIRED: &str = "ACCESS_TOKEN_EXPIRED";
    pub const SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
    pub const SESSION_TOKEN_CONFLICT: &str = "SESSION_TOKEN_CONFLICT";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";

    pub const INVALID_ACTOR_TYPE: &str = "INVALID_ACTOR_TYPE";
    pub const ROLE_NOT_FOUND: &str = "ROLE_NOT_FOUND";
    pub const ROLE_NAME_EXISTS: &str = "ROLE_NAME_EXISTS";
    pub const ROLE_PERMISSION_NOT_FOUND: &str = "ROLE_PERMISSION_NOT_FOUND";
    pub const ROLE_PERMISSION_EXISTS: &str = "ROLE_PERMISSION_EXISTS";
    pub const ACTOR_ROLE_NOT_FOUND: &str = "ACTOR_ROLE_NOT_FOUND";
    pub const ACTOR_ROLE_EXISTS: &str = "ACTOR_ROLE_EXISTS";
    pub const ACTOR_PERMISSION_NOT_FOUND: &str = "ACTOR_PERMISSION_NOT_FOUND";
    pub const ACTOR_PERMISSION_EXISTS: &str = "ACTOR_PERMISSION_EXISTS";

    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const PERSISTENCE_ERROR: &str = "PERSISTENCE_ERROR";
    pub const CANCELLED: &str = "CANCELLED";
}

/// Coarse failure category.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An entity was absent where presence is required.
    NotFound,
    /// A uniqueness rule was violated.
    Conflict,
    /// Input was malformed (unknown actor type, bad filter, failed validation).
    InvalidInput,
    /// The caller may not perform the operation.
    Unauthorized,
    /// A system invariant would be broken (e.g. last active superadmin).
    InvariantViolation,
    /// A credential or token was not recognised.
    TokenInvalid,
    /// A token was recognised but is past its expiry.
    TokenExpired,
    /// The underlying store failed.
    Persistence,
    /// The request context was cancelled or its deadline passed.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InvariantViolation => "invariant_violation",
            ErrorKind::TokenInvalid => "token_invalid",
            ErrorKind::TokenExpired => "token_expired",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

type Source = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Typed failure returned by every warden operation.
#[derive(Debug, Clone, Error)]
#[error("{}", render(.code, .message, .context))]
pub struct AuthError {
    kind: ErrorKind,
    code: Cow<'static, str>,
    message: String,
    /// Outermost context last.
    context: Vec<String>,
    #[source]
    source: Option<Source>,
}

fn render(code: &str, message: &str, context: &[String]) -> String {
    let mut out = String::new();
    for ctx in context.iter().rev() {
        out.push_str(ctx);
        out.push_str(": ");
    }
    out.push_str(message);
    out.push_str(" [");
    out.push_str(code);
    out.push(']');
    out
}

impl AuthError {
    pub fn new(
        kind: ErrorKind,
        code: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            context: Vec::new(),
            source: None,
        }
    }

    pub fn not_found(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, code, msg)
    }

    pub fn conflict(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, code, msg)
    }

    pub fn invalid_input(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, code, msg)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, codes::VALIDATION_FAILED, msg)
    }

    pub fn unauthorized(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, code, msg)
    }

    pub fn invariant(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvariantViolation, code, msg)
    }

    pub fn token_invalid(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenInvalid, code, msg)
    }

    pub fn token_expired(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenExpired, code, msg)
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Persistence, codes::PERSISTENCE_ERROR, msg)
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, codes::CANCELLED, msg)
    }

    /// Attach the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Push a call-site context frame.
    pub fn context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Context frames, innermost first.
    pub fn context_chain(&self) -> &[String] {
        &self.context
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

/// Context wrapping for `AuthResult`.
pub trait ResultExt<T> {
    fn context(self, ctx: &'static str) -> AuthResult<T>;

    fn with_context<F, S>(self, f: F) -> AuthResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for AuthResult<T> {
    fn context(self, ctx: &'static str) -> AuthResult<T> {
        self.map_err(|e| e.context(ctx))
    }

    fn with_context<F, S>(self, f: F) -> AuthResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}
