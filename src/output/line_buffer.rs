/// Reassembles arbitrarily fragmented process output into complete lines.
///
/// Works on bytes so a multi-byte glyph split across two reads is never
/// decoded half-way; `\n` can't occur inside a UTF-8 sequence, so each
/// complete line is a whole string.
#[derive(Debug, Default)]
pub struct LineBuffer {
    carry: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.feed_bytes(chunk.as_bytes())
    }

    /// Append a chunk and return every line it completed, in order.
    pub fn feed_bytes(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);

        let Some(last_newline) = self.carry.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, rest);

        // `complete` ends with '\n', so the final split piece is always empty.
        let mut lines: Vec<String> = complete
            .split(|&b| b == b'\n')
            .map(decode_line)
            .collect();
        lines.pop();
        lines
    }

    /// Hand out the trailing fragment at end of stream, if it is non-empty.
    pub fn flush(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let fragment = std::mem::take(&mut self.carry);
        Some(decode_line(&fragment))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
