//! Stored-value framing with optional gzip compression.
//!
//! Frame layout: one tag byte (`0` raw, `1` gzip) followed by the payload.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use thiserror::Error;

const TAG_RAW: u8 = 0;
const TAG_GZIP: u8 = 1;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("empty frame")]
    Empty,
    #[error("unknown frame tag {0}")]
    UnknownTag(u8),
    #[error("compression failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct Codec {
    pub compression_enabled: bool,
    pub threshold_bytes: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            compression_enabled: false,
            threshold_bytes: 1024,
        }
    }
}

impl Codec {
    pub fn new(compression_enabled: bool, threshold_bytes: usize) -> Self {
        Self {
            compression_enabled,
            threshold_bytes,
        }
    }

    pub fn encode(&self, value: &[u8]) -> Result<Vec<u8>, CodecError> {
        if self.compression_enabled && value.len() > self.threshold_bytes {
            let mut out = vec![TAG_GZIP];
            let mut encoder = GzEncoder::new(&mut out, Compression::default());
            encoder.write_all(value)?;
            encoder.finish()?;
            return Ok(out);
        }
        let mut out = Vec::with_capacity(value.len() + 1);
        out.push(TAG_RAW);
        out.extend_from_slice(value);
        Ok(out)
    }

    /// Decoding does not depend on the current settings, so frames written
    /// before a config change stay readable.
    pub fn decode(&self, frame: &[u8]) -> Result<Vec<u8>, CodecError> {
        match frame.split_first() {
            None => Err(CodecError::Empty),
            Some((&TAG_RAW, body)) => Ok(body.to_vec()),
            Some((&TAG_GZIP, body)) => {
                let mut out = Vec::new();
                GzDecoder::new(body).read_to_end(&mut out)?;
                Ok(out)
            }
            Some((&tag, _)) => Err(CodecError::UnknownTag(tag)),
        }
    }
}
