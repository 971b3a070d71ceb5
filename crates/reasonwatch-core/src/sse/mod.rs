//! SSE stream processing
//!
//! Framing of raw chunks into event blocks, and classification of the
//! payloads those blocks carry.

pub mod classifier;
pub mod decoder;

pub use classifier::{classify, detect_signal, Signal, Verdict, DONE_SENTINEL};
pub use decoder::{data_lines, FrameDecoder, Utf8StreamDecoder, DATA_PREFIX};
