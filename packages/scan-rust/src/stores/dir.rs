//! Local-directory [`ObjectStore`].
//!
//! Every regular file under the root is one object; its key is the
//! `/`-separated path relative to the root. Keys are listed in global
//! lexicographic order and the continuation token is the last key returned.
//! Each page walks the tree again on the blocking pool, which keeps the
//! adapter stateless at the cost of O(n) work per page.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::StoreError;
use crate::store::{validate_token, ListPage, ObjectStore};

/// Object store over a directory tree.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let path = Path::new(key);
        let plain = !key.is_empty()
            && path
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !plain {
            return Err(StoreError::InvalidKey {
                key: key.to_owned(),
            });
        }
        Ok(self.root.join(path))
    }
}

/// Collects every file key under `root`, sorted.
fn collect_keys(root: &Path) -> Result<Vec<String>, StoreError> {
    let mut keys = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|err| StoreError::Backend(err.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let parts: Option<Vec<&str>> = relative
            .components()
            .map(|component| component.as_os_str().to_str())
            .collect();
        match parts {
            Some(parts) => keys.push(parts.join("/")),
            None => warn!(path = %entry.path().display(), "skipping non UTF-8 path"),
        }
    }
    keys.sort_unstable();
    Ok(keys)
}

fn page_of(keys: &[String], prefix: Option<&str>, token: Option<&str>, page_size: usize) -> ListPage {
    let page_size = page_size.max(1);
    let start = match (token, prefix) {
        (Some(token), _) => keys.partition_point(|key| key.as_str() <= token),
        (None, Some(prefix)) => keys.partition_point(|key| key.as_str() < prefix),
        (None, None) => 0,
    };

    let mut page: Vec<String> = keys[start..]
        .iter()
        .take_while(|key| prefix.map_or(true, |p| key.starts_with(p)))
        .take(page_size + 1)
        .cloned()
        .collect();

    let next_token = if page.len() > page_size {
        page.truncate(page_size);
        page.last().cloned()
    } else {
        None
    };
    ListPage {
        keys: page,
        next_token,
    }
}

#[async_trait]
impl ObjectStore for DirStore {
    async fn list_page(
        &self,
        prefix: Option<&str>,
        token: Option<&str>,
        page_size: usize,
    ) -> Result<ListPage, StoreError> {
        validate_token(prefix, token)?;
        let root = self.root.clone();
        let keys = tokio::task::spawn_blocking(move || collect_keys(&root))
            .await
            .map_err(|err| StoreError::Backend(err.into()))??;
        Ok(page_of(&keys, prefix, token, page_size))
    }

    async fn fetch(&self, key: &str) -> Result<Bytes, StoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Bytes::from(body)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                key: key.to_owned(),
            }),
            Err(err) => Err(StoreError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, key: &str, body: &str) {
        let path = root.join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn sample() -> (tempfile::TempDir, DirStore) {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "logs/2020/01.log", "a");
        write(dir.path(), "logs/2020/02.log", "b");
        write(dir.path(), "logs/2021/01.log", "c");
        write(dir.path(), "logs-archive.txt", "d");
        write(dir.path(), "other/readme.md", "e");
        let store = DirStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn lists_in_global_key_order() {
        let (_dir, store) = sample();
        let page = store.list_page(None, None, 100).await.unwrap();
        assert_eq!(
            page.keys,
            vec![
                "logs-archive.txt",
                "logs/2020/01.log",
                "logs/2020/02.log",
                "logs/2021/01.log",
                "other/readme.md",
            ]
        );
        assert!(page.is_last());
    }

    #[tokio::test]
    async fn paginates_with_prefix() {
        let (_dir, store) = sample();
        let first = store.list_page(Some("logs/"), None, 2).await.unwrap();
        assert_eq!(first.keys, vec!["logs/2020/01.log", "logs/2020/02.log"]);
        let token = first.next_token.expect("more pages");

        let second = store
            .list_page(Some("logs/"), Some(&token), 2)
            .await
            .unwrap();
        assert_eq!(second.keys, vec!["logs/2021/01.log"]);
        assert!(second.is_last());
    }

    #[tokio::test]
    async fn fetch_reads_file_bodies() {
        let (_dir, store) = sample();
        assert_eq!(store.fetch("other/readme.md").await.unwrap(), Bytes::from("e"));
        assert!(matches!(
            store.fetch("other/missing.md").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let (_dir, store) = sample();
        for key in ["../etc/passwd", "/etc/passwd", "", "logs/../other/readme.md"] {
            assert!(
                matches!(store.fetch(key).await, Err(StoreError::InvalidKey { .. })),
                "{key} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn token_outside_prefix_is_rejected() {
        let (_dir, store) = sample();
        assert!(matches!(
            store.list_page(Some("logs/"), Some("zzz"), 2).await,
            Err(StoreError::InvalidToken { .. })
        ));
    }

    #[tokio::test]
    async fn missing_root_is_a_backend_error() {
        let store = DirStore::new("/definitely/not/a/real/driftnet/root");
        assert!(matches!(
            store.list_page(None, None, 10).await,
            Err(StoreError::Backend(_))
        ));
    }
}
