//! NDJSON framing for the portal helper's stdout.
//!
//! Wraps [`LinesCodec`] with a maximum line length so a runaway helper
//! cannot make us buffer an unbounded page dump.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum accepted line length: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Line decoder for helper responses.
///
/// Lines longer than [`MAX_LINE_BYTES`] fail with
/// `AppError::Browser("line too long: …")`.
#[derive(Debug)]
pub struct HelperCodec(LinesCodec);

impl HelperCodec {
    /// Codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for HelperCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for HelperCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

fn map_codec_error(err: LinesCodecError) -> AppError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Browser(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
