/// Scanner for Gemini's streamed JSON array
///
/// The body looks like `[{...}\n,\r\n{...}\n]`. Top-level objects are cut
/// out by tracking brace depth outside string literals; brackets, commas,
/// and whitespace between elements are envelope noise. The closing `]`
/// ends the stream.
#[derive(Debug, Default)]
pub struct GeminiDecoder {
    element: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
    opened: bool,
    terminated: bool,
}

impl GeminiDecoder {
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut frames = Vec::new();

        for &byte in bytes {
            if self.terminated {
                break;
            }

            if self.depth == 0 {
                match byte {
                    b'[' if !self.opened => self.opened = true,
                    b']' => self.terminated = true,
                    b'{' => {
                        self.depth = 1;
                        self.element.push(byte);
                    }
                    _ => {}
                }
                continue;
            }

            self.element.push(byte);

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        let element = std::mem::take(&mut self.element);
                        frames.push(String::from_utf8_lossy(&element).into_owned());
                    }
                }
                _ => {}
            }
        }

        frames
    }

    /// An element still open at end of body is incomplete and dropped
    pub fn finish(&mut self) -> Vec<String> {
        if !self.element.is_empty() {
            tracing::debug!(buffered = self.element.len(), "discarding incomplete Gemini element");
            self.element.clear();
        }
        Vec::new()
    }

    pub const fn is_terminated(&self) -> bool {
        self.terminated
    }
}
