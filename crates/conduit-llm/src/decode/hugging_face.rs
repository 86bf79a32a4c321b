/// Line decoder for HuggingFace server-sent events
///
/// Only `data:` lines carry payloads; other SSE fields, comments, and blank
/// keep-alive lines are skipped. `data: [DONE]` ends the stream.
#[derive(Debug, Default)]
pub struct HuggingFaceDecoder {
    line: Vec<u8>,
    terminated: bool,
}

const SENTINEL: &str = "[DONE]";

impl HuggingFaceDecoder {
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut frames = Vec::new();
        let mut rest = bytes;

        while !self.terminated {
            let Some(newline) = rest.iter().position(|&b| b == b'\n') else {
                self.line.extend_from_slice(rest);
                break;
            };

            self.line.extend_from_slice(&rest[..newline]);
            rest = &rest[newline + 1..];

            let line = std::mem::take(&mut self.line);
            frames.extend(self.payload(&line));
        }

        frames
    }

    /// Flush a trailing line that lacks its newline
    ///
    /// Only the sentinel or a payload that is complete JSON is kept; a line
    /// cut off mid-payload is dropped.
    pub fn finish(&mut self) -> Vec<String> {
        let line = std::mem::take(&mut self.line);
        if self.terminated || line.is_empty() {
            return Vec::new();
        }

        let Some(payload) = self.payload(&line) else {
            return Vec::new();
        };

        if serde_json::from_str::<serde::de::IgnoredAny>(&payload).is_err() {
            tracing::debug!(buffered = line.len(), "discarding incomplete HuggingFace frame");
            return Vec::new();
        }

        vec![payload]
    }

    pub const fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn payload(&mut self, line: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(line);
        let data = line.trim().strip_prefix("data:")?.trim();

        if data == SENTINEL {
            self.terminated = true;
            return None;
        }

        (!data.is_empty()).then(|| data.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(reads: &[&str]) -> (Vec<String>, bool) {
        let mut decoder = HuggingFaceDecoder::default();
        let mut frames: Vec<String> = reads.iter().flat_map(|read| decoder.decode(read.as_bytes())).collect();
        frames.extend(decoder.finish());
        (frames, decoder.is_terminated())
    }

    #[test]
    fn data_lines_until_sentinel() {
        let (frames, terminated) = decode_all(&[
            "data: {\"token\":{\"text\":\"Hi\",\"special\":false}}\n\n",
            "data: {\"token\":{\"text\":\"\",\"special\":true}}\n\n",
            "data: [DONE]\n\n",
        ]);

        assert_eq!(
            frames,
            [
                r#"{"token":{"text":"Hi","special":false}}"#,
                r#"{"token":{"text":"","special":true}}"#
            ]
        );
        assert!(terminated);
    }

    #[test]
    fn line_split_across_reads() {
        let (frames, _) = decode_all(&["da", "ta: {\"a\":", "1}\r", "\n"]);

        assert_eq!(frames, [r#"{"a":1}"#]);
    }

    #[test]
    fn multibyte_character_split_across_reads() {
        let bytes = "data: {\"text\":\"héllo\"}\n".as_bytes();
        let mut decoder = HuggingFaceDecoder::default();

        let mut frames = decoder.decode(&bytes[..17]);
        frames.extend(decoder.decode(&bytes[17..]));

        assert_eq!(frames, [r#"{"text":"héllo"}"#]);
    }

    #[test]
    fn non_data_lines_are_noise() {
        let (frames, terminated) = decode_all(&[": keep-alive\n", "event: message\n", "\n", "data:\n", "data: [DONE]\n"]);

        assert!(frames.is_empty());
        assert!(terminated);
    }

    #[test]
    fn content_after_sentinel_is_ignored() {
        let (frames, terminated) = decode_all(&["data: [DONE]\ndata: {\"late\":true}\n"]);

        assert!(frames.is_empty());
        assert!(terminated);
    }

    #[test]
    fn trailing_line_without_newline_is_flushed() {
        let (frames, terminated) = decode_all(&["data: {\"a\":1}\n", "data: [DONE]"]);

        assert_eq!(frames, [r#"{"a":1}"#]);
        assert!(terminated);
    }

    #[test]
    fn trailing_complete_payload_is_kept() {
        let (frames, terminated) = decode_all(&["data: {\"a\":1}\n", "data: {\"b\":2}"]);

        assert_eq!(frames, [r#"{"a":1}"#, r#"{"b":2}"#]);
        assert!(!terminated);
    }

    #[test]
    fn payload_cut_off_at_end_of_body_is_dropped() {
        let (frames, terminated) = decode_all(&[
            "data: {\"token\":{\"text\":\"Hi\",\"special\":false}}\n\n",
            "data: {\"token\":{\"text\":\"the",
        ]);

        assert_eq!(frames, [r#"{"token":{"text":"Hi","special":false}}"#]);
        assert!(!terminated);
    }

    #[test]
    fn empty_stream_is_not_terminated() {
        let (frames, terminated) = decode_all(&[]);

        assert!(frames.is_empty());
        assert!(!terminated);
    }
}
