//! Credential decorators for agency upstreams.
//!
//! Agencies split between header keys (WMATA's `api_key`, MBTA's `x-api-key`,
//! Swiftly's `Authorization`) and query-parameter keys (CTA's `key`, MARTA's
//! `apiKey`, 511's `api_key`). Both are modeled as wrappers around an inner
//! [`HttpClient`] so an adapter never handles its credential directly.

use super::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

/// Injects an API key as an HTTP header on every request.
pub struct HeaderAuth<C> {
    inner: C,
    header: HeaderName,
    value: HeaderValue,
}

impl<C> HeaderAuth<C> {
    /// Builds the decorator, rejecting names or values that are not legal
    /// header content. A bad credential fails loudly at startup instead of
    /// on the first rider query.
    pub fn new(inner: C, header: &str, key: &str) -> anyhow::Result<Self> {
        let header = HeaderName::from_bytes(header.as_bytes())?;
        let mut value: HeaderValue = key.parse()?;
        value.set_sensitive(true);
        Ok(Self {
            inner,
            header,
            value,
        })
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for HeaderAuth<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header.clone(), self.value.clone());
        self.inner.execute(req).await
    }
}

/// Appends an API key as a URL query parameter on every request.
pub struct QueryAuth<C> {
    inner: C,
    param: String,
    key: String,
}

impl<C> QueryAuth<C> {
    pub fn new(inner: C, param: &str, key: &str) -> Self {
        Self {
            inner,
            param: param.to_string(),
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for QueryAuth<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.url_mut()
            .query_pairs_mut()
            .append_pair(&self.param, &self.key);
        self.inner.execute(req).await
    }
}
