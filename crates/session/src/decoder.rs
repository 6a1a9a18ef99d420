use core_types::{StreamFrame, StreamParseError};

/// Splits a chunked byte stream into newline-delimited lines.
///
/// Chunks may end anywhere, including inside a multi-byte UTF-8 sequence, so
/// buffering happens on raw bytes and text decoding is left to whole lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every line it completed, oldest first.
    /// Blank lines are skipped and a trailing `\r` is stripped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|byte| *byte == b'\n') {
            let end = start + offset;
            push_line(&mut lines, &self.buffer[start..end]);
            start = end + 1;
        }
        self.buffer.drain(..start);
        lines
    }

    /// Returns the unterminated tail once the stream has ended.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.buffer);
        let mut lines = Vec::with_capacity(1);
        push_line(&mut lines, &rest);
        lines.pop()
    }

    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

fn push_line(lines: &mut Vec<Vec<u8>>, raw: &[u8]) {
    let line = raw.strip_suffix(b"\r").unwrap_or(raw);
    if line.iter().all(u8::is_ascii_whitespace) {
        return;
    }
    lines.push(line.to_vec());
}

pub fn parse_frame(line: Vec<u8>) -> Result<StreamFrame, StreamParseError> {
    let text = String::from_utf8(line)?;
    Ok(serde_json::from_str(text.trim())?)
}
