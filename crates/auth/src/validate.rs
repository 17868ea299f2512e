//! Input validation for transport-supplied values.

use warden_core::{AuthError, AuthResult};

use crate::Permission;
use crate::repo::Page;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 50;
pub const PASSWORD_MIN: usize = 5;
/// bcrypt ignores everything past 72 bytes.
pub const PASSWORD_MAX_BYTES: usize = 72;
pub const ROLE_NAME_MIN: usize = 2;
pub const ROLE_NAME_MAX: usize = 100;
pub const PERMISSION_MAX: usize = 255;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

fn char_len_between(field: &str, value: &str, min: usize, max: usize) -> AuthResult<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(AuthError::validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

pub fn username(value: &str) -> AuthResult<()> {
    char_len_between("username", value, USERNAME_MIN, USERNAME_MAX)?;
    if value.chars().any(char::is_whitespace) {
        return Err(AuthError::validation("username must not contain whitespace"));
    }
    Ok(())
}

pub fn password(value: &str) -> AuthResult<()> {
    if value.chars().count() < PASSWORD_MIN {
        return Err(AuthError::validation(format!(
            "password must be at least {PASSWORD_MIN} characters"
        )));
    }
    if value.len() > PASSWORD_MAX_BYTES {
        return Err(AuthError::validation(format!(
            "password must be at most {PASSWORD_MAX_BYTES} bytes"
        )));
    }
    Ok(())
}

pub fn role_name(value: &str) -> AuthResult<()> {
    if value.trim() != value {
        return Err(AuthError::validation("role name must not have surrounding whitespace"));
    }
    char_len_between("role name", value, ROLE_NAME_MIN, ROLE_NAME_MAX)
}

pub fn permission(value: &Permission) -> AuthResult<()> {
    let s = value.as_str();
    if s.is_empty() || s.len() > PERMISSION_MAX || s.chars().any(char::is_whitespace) {
        return Err(AuthError::validation(format!("invalid permission '{s}'")));
    }
    Ok(())
}

/// Resolved 1-based paging input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: u64,
    pub page_size: u64,
    offset: u64,
}

impl Paging {
    /// Store window for this page.
    pub fn window(&self) -> Page {
        Page::new(self.page_size, self.offset)
    }
}

/// Resolve 1-based paging input into a store window.
///
/// Missing or zero values fall back to page 1 / [`DEFAULT_PAGE_SIZE`]; page size
/// is capped at [`MAX_PAGE_SIZE`]. A page whose offset does not fit a signed
/// 64-bit row offset is rejected.
pub fn paging(page: Option<u64>, page_size: Option<u64>) -> AuthResult<Paging> {
    let page = page.filter(|p| *p > 0).unwrap_or(1);
    let page_size = page_size
        .filter(|s| *s > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE);
    let offset = (page - 1)
        .checked_mul(page_size)
        .filter(|o| i64::try_from(*o).is_ok())
        .ok_or_else(|| AuthError::validation(format!("page {page} is out of range")))?;
    Ok(Paging {
        page,
        page_size,
        offset,
    })
}
