//! Splitting streamed response bytes into provider frames
//!
//! Decoders are stateful per call. Input may be cut at any byte, so each
//! decoder buffers incomplete frames until the rest arrives. Decoding never
//! fails; only the extractor judges whether a frame is well-formed.

mod gemini;
mod hugging_face;

pub use gemini::GeminiDecoder;
pub use hugging_face::HuggingFaceDecoder;

/// Per-provider chunk decoder
#[derive(Debug)]
pub enum ChunkDecoder {
    /// JSON array, one element per line
    Gemini(GeminiDecoder),
    /// `data:`-prefixed lines ending with `[DONE]`
    HuggingFace(HuggingFaceDecoder),
}

impl ChunkDecoder {
    /// Feed one raw read, returning every frame payload it completes
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<String> {
        match self {
            Self::Gemini(decoder) => decoder.decode(bytes),
            Self::HuggingFace(decoder) => decoder.decode(bytes),
        }
    }

    /// Flush input still buffered when the body ends
    pub fn finish(&mut self) -> Vec<String> {
        match self {
            Self::Gemini(decoder) => decoder.finish(),
            Self::HuggingFace(decoder) => decoder.finish(),
        }
    }

    /// Whether the end-of-stream marker has been seen
    pub const fn is_terminated(&self) -> bool {
        match self {
            Self::Gemini(decoder) => decoder.is_terminated(),
            Self::HuggingFace(decoder) => decoder.is_terminated(),
        }
    }
}
