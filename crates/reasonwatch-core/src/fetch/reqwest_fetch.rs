//! [`Fetch`] over a reqwest client

use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use super::{Fetch, FetchRequest, FetchResponse};
use crate::error::FetchError;

/// Network fetch backed by `reqwest`
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetch for ReqwestFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        debug!("{} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| FetchError::Transport(e.to_string())))
            .boxed();

        Ok(FetchResponse::new(status, headers, body))
    }
}
