//! Fetch interception
//!
//! [`InterceptedFetch`] forwards every call to the wrapped capability. When
//! the call is a qualifying conversation stream it requests `Thinking`,
//! duplicates the body, and spawns a consumer task over the duplicate that
//! drives a [`Session`] until the stream ends. The caller always gets the
//! response back without waiting on that task.

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::tee::tee;
use super::{BodyStream, Fetch, FetchRequest, FetchResponse};
use crate::config::DetectorConfig;
use crate::error::FetchError;
use crate::session::Session;
use crate::sse::Verdict;
use crate::state_machine::StateMachine;
use crate::status::Status;

/// Decides which request/response pairs are inspected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifyingPredicate {
    endpoint: String,
    media_type: String,
}

impl QualifyingPredicate {
    pub fn new(endpoint: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            media_type: media_type.into(),
        }
    }

    /// URL contains the endpoint segment and `accept` asks for the media type
    pub fn request_qualifies(&self, request: &FetchRequest) -> bool {
        request.url.contains(&self.endpoint)
            && request
                .headers
                .get_all(ACCEPT)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .any(|value| value.contains(&self.media_type))
    }

    /// `content-type` begins with the media type
    pub fn response_qualifies(&self, response: &FetchResponse) -> bool {
        response
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with(&self.media_type))
    }
}

impl Default for QualifyingPredicate {
    fn default() -> Self {
        DetectorConfig::default().predicate()
    }
}

/// A [`Fetch`] that watches qualifying streams on the way through
pub struct InterceptedFetch<F> {
    inner: F,
    predicate: QualifyingPredicate,
    machine: Arc<StateMachine>,
    next_session: AtomicU64,
}

/// Wrap `original` so qualifying streams drive `machine`
///
/// Installing the result as the host's effective fetch is up to the host.
pub fn intercept<F: Fetch>(
    original: F,
    predicate: QualifyingPredicate,
    machine: Arc<StateMachine>,
) -> InterceptedFetch<F> {
    InterceptedFetch {
        inner: original,
        predicate,
        machine,
        next_session: AtomicU64::new(1),
    }
}

impl<F> InterceptedFetch<F> {
    /// Status machine this fetch drives
    pub fn machine(&self) -> &Arc<StateMachine> {
        &self.machine
    }
}

#[async_trait]
impl<F: Fetch> Fetch for InterceptedFetch<F> {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let wants_stream = self.predicate.request_qualifies(&request);
        let response = self.inner.fetch(request).await?;

        if !wants_stream || !self.predicate.response_qualifies(&response) {
            return Ok(response);
        }

        self.machine.set_state(Status::Thinking);

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        info!("Intercepted qualifying stream, starting session {}", id);

        let FetchResponse {
            status,
            headers,
            body,
        } = response;
        let (caller_body, inspector_body) = tee(body);

        tokio::spawn(watch_stream(
            Session::new(id),
            inspector_body,
            Arc::clone(&self.machine),
        ));

        Ok(FetchResponse::new(status, headers, caller_body))
    }
}

/// Why a session's consumer loop stopped
enum Exit {
    Ended,
    Sentinel,
    Failed(FetchError),
}

/// Consumer task for one session. Always ends by requesting `Idle`.
async fn watch_stream(mut session: Session, body: BodyStream, machine: Arc<StateMachine>) {
    let outcome = AssertUnwindSafe(consume(&mut session, body, &machine))
        .catch_unwind()
        .await;

    let discarded = session.finish();
    if discarded > 0 {
        debug!(
            "Session {}: discarded {} unterminated chars at end of stream",
            session.id(),
            discarded
        );
    }

    let summary = format!(
        "{:?} elapsed, {} blocks, {} bytes",
        session.elapsed(),
        session.blocks_processed(),
        session.bytes_received()
    );
    match outcome {
        Ok(Exit::Sentinel) => {
            info!("Session {} [DONE] received: {}", session.id(), summary)
        }
        Ok(Exit::Ended) => info!("Session {} stream ended: {}", session.id(), summary),
        Ok(Exit::Failed(err)) => {
            warn!("Session {} stream failed: {} ({})", session.id(), err, summary)
        }
        Err(_) => warn!("Session {} consumer panicked ({})", session.id(), summary),
    }

    machine.set_state(Status::Idle);
}

async fn consume(session: &mut Session, mut body: BodyStream, machine: &StateMachine) -> Exit {
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => return Exit::Failed(err),
        };

        for block in session.feed(&chunk) {
            debug!("Session {} event block: {} bytes", session.id(), block.len());
            for verdict in session.process_block(&block) {
                match verdict {
                    Verdict::Transition(status) => {
                        machine.set_state(status);
                    }
                    Verdict::Done => return Exit::Sentinel,
                    Verdict::NoChange => {}
                }
            }
        }
    }
    Exit::Ended
}
