use async_trait::async_trait;
use reqwest::{Request, Response};

/// Sends requests for the Overpass and timetable sources.
///
/// Decorators such as [`ApiKey`](super::auth::ApiKey) wrap another client and
/// adjust each request before passing it on.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
