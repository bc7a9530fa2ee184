use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes a single HTTP request.
///
/// Adapters are generic over this so auth decorators compose around the base
/// client and tests can substitute a canned transport.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
