//! Fetch boundary
//!
//! The [`Fetch`] trait stands in for the host's network-fetch capability.
//! The interceptor wraps one implementation with another of the same shape.

pub mod interceptor;
pub mod reqwest_fetch;
pub mod tee;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::fmt;
use std::sync::Arc;

use crate::error::FetchError;

/// Response body as a stream of byte chunks
pub type BodyStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// A network-fetch capability
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

#[async_trait]
impl<F: Fetch + ?Sized> Fetch for Arc<F> {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        (**self).fetch(request).await
    }
}

/// Outgoing request: locator plus the options that travel with it
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let mut request = Self::new(Method::POST, url);
        request.body = Some(body.into());
        request
    }

    /// Append a header, validating name and value
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, FetchError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FetchError::InvalidHeader(format!("{name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| FetchError::InvalidHeader(format!("{name}: {e}")))?;
        self.headers.append(name, value);
        Ok(self)
    }
}

/// Incoming response with a streaming body
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl FetchResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: BodyStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Response whose body yields the given chunks, in order
    pub fn from_chunks(status: StatusCode, headers: HeaderMap, chunks: Vec<Bytes>) -> Self {
        let body = stream::iter(chunks.into_iter().map(Ok)).boxed();
        Self::new(status, headers, body)
    }

    /// First `content-type` value, if it is valid text
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Read the whole body
    pub async fn bytes(mut self) -> Result<Bytes, FetchError> {
        let mut collected = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            collected.extend_from_slice(&chunk?);
        }
        Ok(collected.freeze())
    }
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
