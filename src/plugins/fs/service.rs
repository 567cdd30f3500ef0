use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use url::Url;

use crate::plugins::registry::{
    AssetFetchService, FetchContext, FetchError, FetchHandle, FetchHandleSender, SourceSpec,
};

/// Resolves asset keys as files under a local directory. This is the local /
/// pre-deployed analog of the HTTP backend, useful for development builds
/// where the bundles ship next to the executable.
pub struct FsFetchService;

impl FsFetchService {
    pub fn new() -> Self {
        Self
    }

    fn key_path(root: &Path, key: &str) -> Result<PathBuf, FetchError> {
        let rel = Path::new(key);
        // keys must stay inside the root
        let escapes = rel.is_absolute()
            || rel.components().any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
        if escapes {
            return Err(FetchError::MissingKey(key.to_string()));
        }
        Ok(root.join(rel))
    }

    async fn read_all(
        root: PathBuf,
        keys: Vec<String>,
        tx: &FetchHandleSender,
    ) -> Result<Vec<Bytes>, FetchError> {
        // size pass first, so the total is known before any bytes move
        let mut total: u64 = 0;
        let mut paths = Vec::with_capacity(keys.len());
        for key in &keys {
            let path = Self::key_path(&root, key)?;
            let meta = tokio::fs::metadata(&path)
                .await
                .map_err(|_| FetchError::MissingKey(key.clone()))?;
            total += meta.len();
            paths.push(path);
        }
        tx.publish(total, 0, false);

        let mut out = Vec::with_capacity(paths.len());
        let mut downloaded: u64 = 0;
        for path in paths {
            let data = tokio::fs::read(&path).await?;
            downloaded += data.len() as u64;
            tx.publish(total, downloaded, false);
            out.push(Bytes::from(data));
        }

        tx.publish(total, downloaded, true);
        Ok(out)
    }
}

#[async_trait]
impl AssetFetchService for FsFetchService {
    fn name(&self) -> &'static str {
        "fs-fetch"
    }

    fn can_handle(&self, source: &SourceSpec) -> u8 {
        // anything that is not a URL is treated as a directory path
        match Url::parse(&source.raw) {
            Ok(_) => 0,
            Err(_) => 50,
        }
    }

    async fn fetch_by_keys(
        &self,
        source: &SourceSpec,
        keys: &[String],
        _ctx: &FetchContext,
    ) -> Result<FetchHandle, FetchError> {
        let root = PathBuf::from(&source.raw);
        let meta = tokio::fs::metadata(&root)
            .await
            .map_err(|_| FetchError::InvalidSource(format!("{} is not readable", root.display())))?;
        if !meta.is_dir() {
            return Err(FetchError::InvalidSource(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let keys = keys.to_vec();
        let (tx, handle) = FetchHandle::channel();
        tokio::spawn(async move {
            let result = Self::read_all(root, keys, &tx).await;
            tx.settle(result);
        });
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hotload-fs-test-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        dir
    }

    #[tokio::test]
    async fn reads_keys_in_request_order_with_progress() {
        let dir = scratch_dir().await;
        tokio::fs::write(dir.join("a.dll.bytes"), b"aaaa").await.unwrap();
        tokio::fs::write(dir.join("b.dll.bytes"), b"bb").await.unwrap();

        let svc = FsFetchService::new();
        let handle = svc
            .fetch_by_keys(
                &SourceSpec::new(dir.to_string_lossy().to_string()),
                &["b.dll.bytes".to_string(), "a.dll.bytes".to_string()],
                &FetchContext::default(),
            )
            .await
            .unwrap();

        let items = handle.result.await.unwrap().unwrap();
        assert_eq!(items, vec![Bytes::from_static(b"bb"), Bytes::from_static(b"aaaa")]);

        let progress = *handle.progress.borrow();
        assert!(progress.done);
        assert_eq!(progress.total_bytes, 6);
        assert_eq!(progress.downloaded_bytes, 6);
        assert_eq!(progress.percent_complete, 1.0);

        tokio::fs::remove_dir_all(dir).await.unwrap();
    }

    #[tokio::test]
    async fn missing_key_settles_with_an_error() {
        let dir = scratch_dir().await;

        let svc = FsFetchService::new();
        let handle = svc
            .fetch_by_keys(
                &SourceSpec::new(dir.to_string_lossy().to_string()),
                &["nope.dll.bytes".to_string()],
                &FetchContext::default(),
            )
            .await
            .unwrap();

        let res = handle.result.await.unwrap();
        assert!(matches!(res, Err(FetchError::MissingKey(_))));

        tokio::fs::remove_dir_all(dir).await.unwrap();
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_root() {
        let dir = scratch_dir().await;

        let svc = FsFetchService::new();
        let handle = svc
            .fetch_by_keys(
                &SourceSpec::new(dir.to_string_lossy().to_string()),
                &["../etc/passwd".to_string()],
                &FetchContext::default(),
            )
            .await
            .unwrap();

        assert!(matches!(handle.result.await.unwrap(), Err(FetchError::MissingKey(_))));

        tokio::fs::remove_dir_all(dir).await.unwrap();
    }

    #[tokio::test]
    async fn missing_root_is_a_setup_error() {
        let svc = FsFetchService::new();
        let err = svc
            .fetch_by_keys(
                &SourceSpec::new("/definitely/not/here"),
                &["a".to_string()],
                &FetchContext::default(),
            )
            .await;
        assert!(matches!(err, Err(FetchError::InvalidSource(_))));
    }
}
