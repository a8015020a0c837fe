/// Decoder for streaming bytes that may split multi-byte UTF-8 sequences across chunks.
///
/// Pipe reads are arbitrary byte boundaries, so a multi-byte character
/// (e.g. `─` = 3 bytes) may be split across two chunks. This buffers trailing
/// incomplete bytes and prepends them to the next chunk.
pub(crate) struct Utf8StreamDecoder {
    buf: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed a chunk of bytes and return the longest valid UTF-8 string.
    /// Any trailing incomplete multi-byte sequence is retained for the next call.
    /// Genuinely invalid bytes are replaced with U+FFFD.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.buf.extend_from_slice(chunk);
        let mut result = String::new();

        loop {
            match std::str::from_utf8(&self.buf) {
                Ok(s) => {
                    result.push_str(s);
                    self.buf.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    result.push_str(&String::from_utf8_lossy(&self.buf[..valid_up_to]));

                    match e.error_len() {
                        None => {
                            // incomplete sequence at end, keep for next call
                            self.buf.drain(..valid_up_to);
                            break;
                        }
                        Some(len) => {
                            result.push('\u{FFFD}');
                            self.buf.drain(..valid_up_to + len);
                        }
                    }
                }
            }
        }

        result
    }

    /// Flush whatever is left once the stream has ended
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        rest
    }
}

/// Accumulates text, keeping only the last `limit` bytes
pub(crate) struct TailCapture {
    text: String,
    limit: usize,
}

impl TailCapture {
    pub fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
        }
    }

    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        if self.text.len() > self.limit {
            let mut cut = self.text.len() - self.limit;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            self.text.drain(..cut);
        }
    }

    pub fn into_string(self) -> String {
        self.text
    }
}
