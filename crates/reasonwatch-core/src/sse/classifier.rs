//! Payload classification
//!
//! Interprets one `data:` payload as a generation signal and applies it to a
//! session's progress flags. Two payload schemas are understood:
//!
//! - delta-encoded conversation patches (`{"p": path, "o": op, "v": value}`),
//!   with reasoning progress reported under `v.message.metadata`
//! - chat-completion chunks (`{"choices": [{"delta": {"content": ...}}]}`)

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::session::Session;
use crate::status::Status;

/// End-of-stream sentinel
pub const DONE_SENTINEL: &str = "[DONE]";

const REASONING_STATUS_POINTER: &str = "/v/message/metadata/reasoning_status";
const REASONING_ACTIVE: &str = "is_reasoning";
const REASONING_ENDED: &str = "reasoning_ended";
const THOUGHTS_SEGMENT: &str = "/message/content/thoughts/";

static VISIBLE_PART_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/message/content/parts/\d+").unwrap());

/// What a single payload says about generation progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// The `[DONE]` sentinel
    Done,
    /// Data that is not valid JSON
    Malformed,
    /// Reasoning is still in progress
    Reasoning,
    /// Reasoning has finished
    ReasoningEnded,
    /// Patch into the internal reasoning trace
    ThoughtPatch,
    /// Non-empty text appended to a visible message part
    VisibleToken,
    /// Chat-completion delta with non-empty content
    LegacyDelta,
    /// Valid JSON that matches no known shape
    Unrecognized,
}

/// Outcome of classifying one payload against a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing to report
    NoChange,
    /// Ask the state machine for a transition
    Transition(Status),
    /// Sentinel seen: go idle and stop processing this session
    Done,
}

/// Recognize which signal a raw payload string carries
///
/// Rules are checked in priority order and the first match wins.
pub fn detect_signal(data: &str) -> Signal {
    if data == DONE_SENTINEL {
        return Signal::Done;
    }

    let payload: Value = match serde_json::from_str(data) {
        Ok(payload) => payload,
        Err(_) => return Signal::Malformed,
    };

    match payload
        .pointer(REASONING_STATUS_POINTER)
        .and_then(Value::as_str)
    {
        Some(REASONING_ACTIVE) => return Signal::Reasoning,
        Some(REASONING_ENDED) => return Signal::ReasoningEnded,
        _ => {}
    }

    let path = payload.get("p").and_then(Value::as_str);
    if path.is_some_and(|p| p.contains(THOUGHTS_SEGMENT)) {
        return Signal::ThoughtPatch;
    }

    let is_append = payload.get("o").and_then(Value::as_str) == Some("append");
    let appends_visible_part = path.is_some_and(|p| VISIBLE_PART_PATH.is_match(p));
    let appended_text = payload
        .get("v")
        .and_then(Value::as_str)
        .is_some_and(|v| !v.is_empty());
    if is_append && appends_visible_part && appended_text {
        return Signal::VisibleToken;
    }

    let delta_text = payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .is_some_and(|content| !content.is_empty());
    if delta_text {
        return Signal::LegacyDelta;
    }

    Signal::Unrecognized
}

/// Classify one payload string and update the session's flags
pub fn classify(session: &mut Session, data: &str) -> Verdict {
    let signal = detect_signal(data);
    debug!("Session {} signal: {:?}", session.id(), signal);

    match signal {
        Signal::Done => {
            session.mark_finished();
            Verdict::Done
        }
        Signal::Malformed => {
            if !data.is_empty() {
                debug!(
                    "Session {}: skipping unparseable payload ({} bytes)",
                    session.id(),
                    data.len()
                );
            }
            Verdict::NoChange
        }
        Signal::ReasoningEnded => {
            session.reasoning_ended = true;
            Verdict::NoChange
        }
        Signal::VisibleToken => maybe_start_streaming(session),
        Signal::LegacyDelta if !session.streaming_begun => {
            session.reasoning_ended = true;
            maybe_start_streaming(session)
        }
        Signal::LegacyDelta
        | Signal::Reasoning
        | Signal::ThoughtPatch
        | Signal::Unrecognized => Verdict::NoChange,
    }
}

/// Fires `Streaming` at most once, and only after reasoning has ended
///
/// A visible token seen before the reasoning-ended signal does not fire; a
/// later token re-runs the check.
fn maybe_start_streaming(session: &mut Session) -> Verdict {
    if !session.streaming_begun && session.reasoning_ended {
        session.streaming_begun = true;
        Verdict::Transition(Status::Streaming)
    } else {
        Verdict::NoChange
    }
}
