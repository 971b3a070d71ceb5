//! Incremental SSE framing
//!
//! Turns raw byte chunks into complete event blocks. Chunks may end anywhere:
//! inside a multi-byte character, inside `data:`, or between the two line
//! breaks of a delimiter. Nothing here parses JSON.

use bytes::BytesMut;

/// Prefix marking a payload-carrying line
pub const DATA_PREFIX: &str = "data:";

/// Stateful UTF-8 decoder that holds back incomplete trailing sequences
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: BytesMut,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `chunk` as possible, appending the text to `out`
    ///
    /// Invalid sequences become U+FFFD. An incomplete sequence at the end is
    /// kept until the next call supplies the rest.
    pub fn decode_into(&mut self, chunk: &[u8], out: &mut String) {
        self.pending.extend_from_slice(chunk);

        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(err) => {
                    let valid_end = start + err.valid_up_to();
                    // valid_up_to guarantees this range is UTF-8
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + bad;
                        }
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        let _ = self.pending.split_to(start);
    }

    /// Bytes held back waiting for the rest of a character
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Splits decoded text into blank-line delimited event blocks
#[derive(Debug, Default)]
pub struct FrameDecoder {
    utf8: Utf8StreamDecoder,
    buffer: String,
    /// Offset below which the buffer is known to hold no delimiter
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every event block completed by it
    ///
    /// Blocks are returned without their delimiter. Text after the last
    /// delimiter stays buffered for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.utf8.decode_into(chunk, &mut self.buffer);

        let mut blocks = Vec::new();
        while let Some((end, next)) = find_delimiter(&self.buffer, self.scanned) {
            let block = self.buffer[..end].to_string();
            self.buffer.drain(..next);
            self.scanned = 0;
            blocks.push(block);
        }
        // A delimiter may still straddle the last two bytes, so rescan them
        self.scanned = floor_char_boundary(&self.buffer, self.buffer.len().saturating_sub(2));

        blocks
    }

    /// Text waiting for a delimiter
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// End of stream: discard and return whatever never formed a block
    ///
    /// A dangling incomplete character is dropped too.
    pub fn finish(&mut self) -> String {
        self.utf8 = Utf8StreamDecoder::new();
        self.scanned = 0;
        std::mem::take(&mut self.buffer)
    }
}

/// Find the first blank-line delimiter at or after `from`
///
/// Returns (block end, start of the following text). A line break is `\n`
/// or `\r\n`, so `\n\n`, `\n\r\n`, and `\r\n\r\n` all delimit.
fn find_delimiter(buffer: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = buffer.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            match (bytes.get(i + 1), bytes.get(i + 2)) {
                (Some(b'\n'), _) => return Some((block_end(bytes, i), i + 2)),
                (Some(b'\r'), Some(b'\n')) => return Some((block_end(bytes, i), i + 3)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn block_end(bytes: &[u8], newline: usize) -> usize {
    if newline > 0 && bytes[newline - 1] == b'\r' {
        newline - 1
    } else {
        newline
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Payload strings carried by the `data:` lines of one event block
///
/// Each line is trimmed, the prefix stripped, and the remainder trimmed
/// again. Lines without the prefix (`event:`, `id:`, comments) are dropped.
pub fn data_lines(block: &str) -> impl Iterator<Item = &str> {
    block
        .split('\n')
        .filter_map(|line| line.trim().strip_prefix(DATA_PREFIX))
        .map(str::trim)
}
