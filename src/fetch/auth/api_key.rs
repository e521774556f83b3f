use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that sends an API key in a request header.
///
/// The header name and value are checked on construction; the value is
/// marked sensitive so it stays out of debug output.
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    key: HeaderValue,
}

impl<C> ApiKey<C> {
    pub fn header(inner: C, header_name: &str, key: &str) -> anyhow::Result<Self> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid API key header name '{header_name}': {e}"))?;
        let mut key = HeaderValue::from_str(key)
            .map_err(|e| anyhow::anyhow!("invalid API key value: {e}"))?;
        key.set_sensitive(true);
        Ok(Self {
            inner,
            header_name,
            key,
        })
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.key.clone());
        self.inner.execute(req).await
    }
}
