//! Byte stream to logical lines.

/// Accumulates raw bytes and emits complete lines.
///
/// A line is any maximal run of bytes terminated by `\r`, `\n`, or `\r\n`.
/// Empty segments (for example the gap inside `\r\n`) are dropped. An
/// unterminated tail stays buffered until the next chunk arrives.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every newly completed line, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        for (i, &b) in self.buf.iter().enumerate() {
            if b == b'\r' || b == b'\n' {
                if i > start {
                    lines.push(String::from_utf8_lossy(&self.buf[start..i]).into_owned());
                }
                start = i + 1;
            }
        }
        self.buf.drain(..start);
        lines
    }

    /// Bytes currently buffered without a terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drops any buffered partial line.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
