//! Body duplication
//!
//! Splits one body into two independently readable copies. A pump task reads
//! the source once and forwards every item to both sides, so neither reader
//! can stall or consume data from the other.

use futures::{FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

use super::BodyStream;
use crate::error::FetchError;

/// Duplicate `body` into (caller copy, inspector copy)
///
/// Must be called inside a tokio runtime. Either copy may be dropped early;
/// the pump stops reading the source once both are gone. A source that
/// panics while being read ends both copies with a transport error.
pub fn tee(body: BodyStream) -> (BodyStream, BodyStream) {
    let (caller_tx, caller_rx) = mpsc::unbounded_channel();
    let (inspector_tx, inspector_rx) = mpsc::unbounded_channel();

    tokio::spawn(pump(body, caller_tx, inspector_tx));

    (
        UnboundedReceiverStream::new(caller_rx).boxed(),
        UnboundedReceiverStream::new(inspector_rx).boxed(),
    )
}

type Item = Result<bytes::Bytes, FetchError>;

async fn pump(
    mut body: BodyStream,
    caller_tx: mpsc::UnboundedSender<Item>,
    inspector_tx: mpsc::UnboundedSender<Item>,
) {
    loop {
        let item = match AssertUnwindSafe(body.next()).catch_unwind().await {
            Ok(Some(item)) => item,
            Ok(None) => return,
            Err(_) => {
                warn!("Response body panicked while being read");
                let err = FetchError::Transport("response body panicked".into());
                let _ = caller_tx.send(Err(err.clone()));
                let _ = inspector_tx.send(Err(err));
                return;
            }
        };

        let caller_open = caller_tx.send(item.clone()).is_ok();
        let inspector_open = inspector_tx.send(item).is_ok();
        if !caller_open && !inspector_open {
            debug!("Both body readers dropped, stopping tee");
            return;
        }
    }
}
