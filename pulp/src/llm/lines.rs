//! Line framing for streamed response bodies

/// Accumulates raw body bytes and yields complete lines
///
/// A line is decoded only once its newline has arrived, so a multi-byte
/// character split across network chunks survives intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Next complete line with surrounding whitespace trimmed
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.bytes.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.bytes.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_split_across_chunks() {
        let line = "data: {\"content\":\"café\"}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut buffer = LineBuffer::new();
        buffer.push(&line[..split]);
        assert_eq!(buffer.next_line(), None);

        buffer.push(&line[split..]);
        assert_eq!(buffer.next_line().as_deref(), Some("data: {\"content\":\"café\"}"));
        assert_eq!(buffer.next_line(), None);
    }

    #[test]
    fn test_several_lines_in_one_chunk() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"first\r\n\nsecond\nthird");

        assert_eq!(buffer.next_line().as_deref(), Some("first"));
        assert_eq!(buffer.next_line().as_deref(), Some(""));
        assert_eq!(buffer.next_line().as_deref(), Some("second"));
        assert_eq!(buffer.next_line(), None);

        buffer.push(b"\n");
        assert_eq!(buffer.next_line().as_deref(), Some("third"));
    }
}
