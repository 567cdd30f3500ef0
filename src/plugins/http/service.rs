use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use url::Url;

use crate::plugins::registry::{
    AssetFetchService, FetchContext, FetchError, FetchHandle, FetchHandleSender, SourceSpec,
};

/// Fetches asset keys relative to an HTTP(S) base URL, e.g. a CDN prefix the
/// bundles were published under. Keys are joined as path segments.
pub struct HttpFetchService {
    client: reqwest::Client,
}

impl HttpFetchService {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .expect("reqwest client");
        Self { client }
    }

    fn build_headers(ctx: &FetchContext) -> Result<HeaderMap, FetchError> {
        let mut h = HeaderMap::new();
        h.insert(
            USER_AGENT,
            HeaderValue::from_str(&ctx.user_agent)
                .map_err(|_| FetchError::InvalidSource(format!("bad user agent: {}", ctx.user_agent)))?,
        );
        for (k, v) in &ctx.headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|_| FetchError::InvalidSource(format!("bad header name: {k}")))?;
            let value = HeaderValue::from_str(v)
                .map_err(|_| FetchError::InvalidSource(format!("bad header value for {k}")))?;
            h.insert(name, value);
        }
        Ok(h)
    }

    /// Joins every key against the base. The base gets a trailing slash so
    /// `Url::join` appends instead of replacing the last path segment.
    fn resolve_urls(base: &str, keys: &[String]) -> Result<Vec<(String, Url)>, FetchError> {
        let normalized = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };
        let base = Url::parse(&normalized)
            .map_err(|e| FetchError::InvalidSource(format!("{base}: {e}")))?;

        keys.iter()
            .map(|key| {
                base.join(key)
                    .map(|url| (key.clone(), url))
                    .map_err(|_| FetchError::MissingKey(key.clone()))
            })
            .collect()
    }

    async fn fetch_all(
        client: reqwest::Client,
        targets: Vec<(String, Url)>,
        headers: HeaderMap,
        tx: &FetchHandleSender,
    ) -> Result<Vec<bytes::Bytes>, FetchError> {
        let mut out = Vec::with_capacity(targets.len());
        let mut total: u64 = 0;
        let mut downloaded: u64 = 0;

        for (_key, url) in targets {
            let resp = client.get(url).headers(headers.clone()).send().await?;
            if !resp.status().is_success() {
                return Err(FetchError::Status(resp.status()));
            }

            if let Some(len) = resp.content_length() {
                total += len;
                tx.publish(total, downloaded, false);
            }

            let mut buf = BytesMut::new();
            let mut stream = resp.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                downloaded += chunk.len() as u64;
                buf.extend_from_slice(&chunk);
                tx.publish(total, downloaded, false);
            }
            out.push(buf.freeze());
        }

        tx.publish(total, downloaded, true);
        Ok(out)
    }
}

#[async_trait]
impl AssetFetchService for HttpFetchService {
    fn name(&self) -> &'static str {
        "http-fetch"
    }

    fn can_handle(&self, source: &SourceSpec) -> u8 {
        if let Ok(u) = Url::parse(&source.raw) {
            if u.scheme() == "http" || u.scheme() == "https" {
                return 60;
            }
        }
        0
    }

    async fn fetch_by_keys(
        &self,
        source: &SourceSpec,
        keys: &[String],
        ctx: &FetchContext,
    ) -> Result<FetchHandle, FetchError> {
        let targets = Self::resolve_urls(&source.raw, keys)?;
        let headers = Self::build_headers(ctx)?;
        let client = self.client.clone();

        let (tx, handle) = FetchHandle::channel();
        tokio::spawn(async move {
            let result = Self::fetch_all(client, targets, headers, &tx).await;
            tx.settle(result);
        });
        Ok(handle)
    }
}
