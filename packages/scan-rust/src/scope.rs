//! Which part of a store a scan covers.

use std::fmt;
use std::str::FromStr;

use crate::error::RequestError;

/// Scan scope: the whole store, or every key starting with a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Prefix(String),
}

impl Scope {
    /// Scope string that selects the whole store.
    pub const ALL_SENTINEL: &'static str = "*";

    /// Parses a scope string. The sentinel selects everything; any other
    /// non-blank string is used verbatim as a server-side prefix.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::EmptyScope`] for an empty or blank string.
    pub fn parse(scope: &str) -> Result<Self, RequestError> {
        if scope.trim().is_empty() {
            Err(RequestError::EmptyScope)
        } else if scope == Self::ALL_SENTINEL {
            Ok(Scope::All)
        } else {
            Ok(Scope::Prefix(scope.to_owned()))
        }
    }

    /// Prefix to send with listing calls; `None` lists everything.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        match self {
            Scope::All => None,
            Scope::Prefix(prefix) => Some(prefix),
        }
    }
}

impl FromStr for Scope {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::parse(s)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::All => f.write_str(Self::ALL_SENTINEL),
            Scope::Prefix(prefix) => f.write_str(prefix),
        }
    }
}
