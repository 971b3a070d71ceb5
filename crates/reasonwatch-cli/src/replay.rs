//! Replay a recorded event stream through the interceptor

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use reasonwatch_core::{DetectorConfig, Fetch, FetchError, FetchRequest, FetchResponse};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use std::time::Duration;

/// Serves a fixed body as a qualifying stream, `chunk_size` bytes at a time
pub struct RecordedFetch {
    data: Bytes,
    chunk_size: usize,
    delay: Duration,
    media_type: String,
}

impl RecordedFetch {
    pub fn new(data: Bytes, chunk_size: usize, delay: Duration, config: &DetectorConfig) -> Self {
        Self {
            data,
            chunk_size: chunk_size.max(1),
            delay,
            media_type: config.media_type.clone(),
        }
    }

    /// A request that satisfies the configured predicate
    pub fn request(config: &DetectorConfig) -> Result<FetchRequest, FetchError> {
        FetchRequest::post(format!("replay://local{}", config.endpoint), "{}")
            .with_header("accept", &config.media_type)
    }
}

#[async_trait]
impl Fetch for RecordedFetch {
    async fn fetch(&self, _request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut headers = HeaderMap::new();
        let content_type = HeaderValue::from_str(&self.media_type)
            .map_err(|e| FetchError::InvalidHeader(e.to_string()))?;
        headers.insert(CONTENT_TYPE, content_type);

        let chunks: Vec<Bytes> = self
            .data
            .chunks(self.chunk_size)
            .map(Bytes::copy_from_slice)
            .collect();
        let delay = self.delay;
        let body = stream::iter(chunks)
            .then(move |chunk| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, FetchError>(chunk)
            })
            .boxed();

        Ok(FetchResponse::new(StatusCode::OK, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reasonwatch_core::{intercept, StateMachine, Status};
    use std::sync::{Arc, Mutex};

    async fn replay_statuses(data: &'static [u8], chunk_size: usize) -> Vec<Status> {
        let config = DetectorConfig::default();
        let machine = StateMachine::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = machine.subscribe(move |s| sink.lock().unwrap().push(s));

        let fetch = intercept(
            RecordedFetch::new(Bytes::from_static(data), chunk_size, Duration::ZERO, &config),
            config.predicate(),
            Arc::clone(&machine),
        );
        let response = fetch
            .fetch(RecordedFetch::request(&config).unwrap())
            .await
            .unwrap();
        assert_eq!(response.bytes().await.unwrap().as_ref(), data);

        for _ in 0..100 {
            if machine.current() == Status::Idle {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let statuses = seen.lock().unwrap().clone();
        statuses
    }

    #[tokio::test]
    async fn test_replay_reasoning_demo() {
        let data = include_bytes!("../../../demos/reasoning_stream.sse");
        for chunk_size in [1, 7, 4096] {
            assert_eq!(
                replay_statuses(data, chunk_size).await,
                vec![Status::Thinking, Status::Streaming, Status::Idle]
            );
        }
    }

    #[tokio::test]
    async fn test_replay_legacy_demo() {
        let data = include_bytes!("../../../demos/legacy_stream.sse");
        assert_eq!(
            replay_statuses(data, 5).await,
            vec![Status::Thinking, Status::Streaming, Status::Idle]
        );
    }

    #[tokio::test]
    async fn test_recorded_body_round_trips_in_chunks() {
        let config = DetectorConfig::default();
        let fetch = RecordedFetch::new(
            Bytes::from_static(b"data: [DONE]\n\n"),
            4,
            Duration::ZERO,
            &config,
        );
        let request = RecordedFetch::request(&config).unwrap();
        assert!(config.predicate().request_qualifies(&request));

        let response = fetch.fetch(request).await.unwrap();
        assert!(config.predicate().response_qualifies(&response));
        assert_eq!(
            response.bytes().await.unwrap(),
            Bytes::from_static(b"data: [DONE]\n\n")
        );
    }
}
