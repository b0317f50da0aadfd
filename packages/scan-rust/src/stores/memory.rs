//! In-memory [`ObjectStore`] backed by an ordered map.
//!
//! Keys are listed in lexicographic order. The continuation token is the
//! last key of the previous page, so a listing stays consistent with
//! concurrent inserts behind the cursor.

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::store::{validate_token, ListPage, ObjectStore};

/// Ordered in-memory object store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from `(key, body)` pairs.
    pub fn from_objects<I, K, V>(objects: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        let store = Self::new();
        for (key, body) in objects {
            store.put(key, body);
        }
        store
    }

    /// Inserts or replaces an object. Returns the previous body if any.
    pub fn put(&self, key: impl Into<String>, body: impl Into<Bytes>) -> Option<Bytes> {
        self.objects.write().insert(key.into(), body.into())
    }

    pub fn remove(&self, key: &str) -> Option<Bytes> {
        self.objects.write().remove(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn page(&self, prefix: Option<&str>, token: Option<&str>, page_size: usize) -> ListPage {
        let page_size = page_size.max(1);
        let lower = match (token, prefix) {
            (Some(token), _) => Bound::Excluded(token.to_owned()),
            (None, Some(prefix)) => Bound::Included(prefix.to_owned()),
            (None, None) => Bound::Unbounded,
        };

        let objects = self.objects.read();
        // Keys sharing a prefix are contiguous in sorted order.
        let mut keys: Vec<String> = objects
            .range::<String, _>((lower, Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| prefix.map_or(true, |p| key.starts_with(p)))
            .take(page_size + 1)
            .cloned()
            .collect();

        let next_token = if keys.len() > page_size {
            keys.truncate(page_size);
            keys.last().cloned()
        } else {
            None
        };
        ListPage { keys, next_token }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        prefix: Option<&str>,
        token: Option<&str>,
        page_size: usize,
    ) -> Result<ListPage, StoreError> {
        validate_token(prefix, token)?;
        Ok(self.page(prefix, token, page_size))
    }

    async fn fetch(&self, key: &str) -> Result<Bytes, StoreError> {
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_owned(),
            })
    }
}
