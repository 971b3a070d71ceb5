//! Per-response session state
//!
//! One session exists for each intercepted qualifying response. It owns the
//! frame decoder buffer and the two progress flags, and is dropped when its
//! consumer task exits.

use std::time::{Duration, Instant};

use crate::sse::{classify, data_lines, FrameDecoder, Verdict};

/// Mutable state threaded through framing and classification
#[derive(Debug)]
pub struct Session {
    id: u64,
    frames: FrameDecoder,
    /// Reasoning is known to have finished
    pub reasoning_ended: bool,
    /// `Streaming` has already been requested for this session
    pub streaming_begun: bool,
    finished: bool,
    started: Instant,
    bytes_received: usize,
    blocks_processed: usize,
}

impl Session {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            frames: FrameDecoder::new(),
            reasoning_ended: false,
            streaming_begun: false,
            finished: false,
            started: Instant::now(),
            bytes_received: 0,
            blocks_processed: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Feed a raw chunk and get back the event blocks it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.bytes_received += chunk.len();
        self.frames.feed(chunk)
    }

    /// Classify every `data:` line of one event block, in order
    ///
    /// Stops at the sentinel; lines after it are never looked at. Returns the
    /// verdicts that ask for something, in the order produced.
    pub fn process_block(&mut self, block: &str) -> Vec<Verdict> {
        self.blocks_processed += 1;
        let mut verdicts = Vec::new();
        for line in data_lines(block) {
            if self.finished {
                break;
            }
            match classify(self, line) {
                Verdict::NoChange => {}
                verdict => verdicts.push(verdict),
            }
        }
        verdicts
    }

    /// Drop any unterminated tail, returning how many characters it held
    pub fn finish(&mut self) -> usize {
        self.frames.finish().chars().count()
    }

    pub(crate) fn mark_finished(&mut self) {
        self.finished = true;
    }

    /// The sentinel has been seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn bytes_received(&self) -> usize {
        self.bytes_received
    }

    pub fn blocks_processed(&self) -> usize {
        self.blocks_processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;

    #[test]
    fn test_new_session_flags_default_false() {
        let session = Session::new(3);
        assert_eq!(session.id(), 3);
        assert!(!session.reasoning_ended);
        assert!(!session.streaming_begun);
        assert!(!session.is_finished());
    }

    #[test]
    fn test_lines_after_sentinel_are_ignored() {
        let mut session = Session::new(1);
        let block = "data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}";
        assert_eq!(session.process_block(block), vec![Verdict::Done]);
        assert!(session.is_finished());

        let later = "data: {\"choices\":[{\"delta\":{\"content\":\"later\"}}]}";
        assert!(session.process_block(later).is_empty());
        assert!(!session.streaming_begun);
    }

    #[test]
    fn test_feed_then_process_counts() {
        let mut session = Session::new(1);
        let blocks = session.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DO");
        assert_eq!(blocks.len(), 1);
        assert_eq!(
            session.process_block(&blocks[0]),
            vec![Verdict::Transition(Status::Streaming)]
        );
        assert_eq!(session.blocks_processed(), 1);
        assert_eq!(session.finish(), "data: [DO".len());
    }
}
