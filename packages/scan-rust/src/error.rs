//! Error types for stores, requests, and per-item listener results.

use std::fmt::{Debug, Display};

/// Errors returned by an [`ObjectStore`](crate::store::ObjectStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },
    #[error("invalid object key: {key}")]
    InvalidKey { key: String },
    #[error("invalid continuation token: {token}")]
    InvalidToken { token: String },
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Errors raised while validating a scan or load request.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("scan scope must not be empty (use \"*\" for the whole store)")]
    EmptyScope,
}

/// Per-item failure reported by a listener.
///
/// `Skip` drops the item and leaves the aggregate untouched; `Abort` marks
/// the item's operation as failed. Neither stops sibling items.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("item skipped: {0:#}")]
    Skip(anyhow::Error),
    #[error("item aborted: {0:#}")]
    Abort(anyhow::Error),
}

impl ItemError {
    pub fn skip(reason: impl Display + Debug + Send + Sync + 'static) -> Self {
        Self::Skip(anyhow::Error::msg(reason))
    }

    pub fn abort(reason: impl Display + Debug + Send + Sync + 'static) -> Self {
        Self::Abort(anyhow::Error::msg(reason))
    }
}

impl From<anyhow::Error> for ItemError {
    fn from(err: anyhow::Error) -> Self {
        Self::Skip(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anyhow_errors_become_skips() {
        fn listener_body() -> Result<(), ItemError> {
            Err(anyhow::anyhow!("bad payload"))?;
            Ok(())
        }
        assert!(matches!(listener_body(), Err(ItemError::Skip(_))));
    }

    #[test]
    fn constructors_accept_owned_and_borrowed_reasons() {
        let key = "logs/a.json";
        assert!(matches!(ItemError::skip(format!("{key} is empty")), ItemError::Skip(_)));
        assert!(matches!(ItemError::abort("index offline"), ItemError::Abort(_)));
        assert_eq!(
            ItemError::skip(format!("{key} is empty")).to_string(),
            "item skipped: logs/a.json is empty"
        );
    }

    #[test]
    fn messages_render() {
        assert_eq!(ItemError::abort("corrupt").to_string(), "item aborted: corrupt");
        assert_eq!(
            StoreError::NotFound { key: "a/b".into() }.to_string(),
            "object not found: a/b"
        );
    }
}
