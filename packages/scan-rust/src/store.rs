//! Storage/listing contract consumed by the scan pipeline.
//!
//! A store lists keys page by page: each [`ListPage`] may carry an opaque
//! continuation token that is only valid for requesting the very next page,
//! so pages are always requested in sequence.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreError;

/// One page of a key listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Keys in listing order.
    pub keys: Vec<String>,
    /// Token for the next page, or `None` when the listing is exhausted.
    pub next_token: Option<String>,
}

impl ListPage {
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.next_token.is_none()
    }
}

/// Paginated object listing plus whole-object fetch.
///
/// Used as `Arc<dyn ObjectStore>`; implementations must be safe to call from
/// many tasks at once.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Lists up to `page_size` keys starting with `prefix` (all keys when
    /// `None`), resuming after `token` when given.
    async fn list_page(
        &self,
        prefix: Option<&str>,
        token: Option<&str>,
        page_size: usize,
    ) -> Result<ListPage, StoreError>;

    /// Fetches the full body of one object.
    async fn fetch(&self, key: &str) -> Result<Bytes, StoreError>;
}

/// Rejects tokens that cannot have come from a listing of `prefix`.
///
/// Both bundled stores use the last returned key as the token, so a valid
/// token is non-empty and starts with the prefix.
pub(crate) fn validate_token(prefix: Option<&str>, token: Option<&str>) -> Result<(), StoreError> {
    let Some(token) = token else {
        return Ok(());
    };
    if token.is_empty() || prefix.is_some_and(|p| !token.starts_with(p)) {
        return Err(StoreError::InvalidToken {
            token: token.to_owned(),
        });
    }
    Ok(())
}
