//! Entities served by the backend: issues and user accounts.

pub mod issue;
pub mod user;

pub use issue::{InvalidTransition, Issue, IssueCategory, IssueStatus, Priority};
pub use user::{Role, User};

use std::fmt;

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}
