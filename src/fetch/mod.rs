//! HTTP plumbing shared by the data-source clients.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::Result;
use bytes::Bytes;

/// GETs `url` and returns the response body.
///
/// Non-success statuses are errors.
#[tracing::instrument(skip(client))]
pub async fn fetch_bytes<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Bytes> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);
    send(client, req).await
}

/// GETs `url` with `params` appended to its query string.
#[tracing::instrument(skip(client, params))]
pub async fn fetch_with_query<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    params: &[(&str, &str)],
) -> Result<Bytes> {
    let mut url: reqwest::Url = url.parse()?;
    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in params {
            pairs.append_pair(name, value);
        }
    }
    let req = reqwest::Request::new(reqwest::Method::GET, url);
    send(client, req).await
}

async fn send<C: HttpClient + ?Sized>(client: &C, req: reqwest::Request) -> Result<Bytes> {
    let resp = client.execute(req).await?.error_for_status()?;
    let body = resp.bytes().await?;
    tracing::debug!(bytes = body.len(), "Response body received");
    Ok(body)
}
