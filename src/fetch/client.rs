use async_trait::async_trait;
use reqwest::{Request, Response};

/// Transport used by the hub pulls; swapped out in tests or to add headers.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
