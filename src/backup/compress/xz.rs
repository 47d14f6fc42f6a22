use crate::backup::compress::{Compressor, CompressorBuilder};
use crate::backup::result_error::result::Result;
use bon::Builder;
use liblzma::stream::{Check, MtStreamBuilder};
use liblzma::write::XzEncoder;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::io::Write;
use validator::Validate;

static DEFAULT_COMPRESSION_LEVEL: u32 = 3;

/// XZ compression of the archive blob.
///
/// Single threaded unless `thread` is set above 1, which keeps the output
/// stable for a given input so unchanged directories fingerprint the same.
#[skip_serializing_none]
#[derive(Clone, Default, Validate, Serialize, Deserialize, Debug, Builder, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct XzConfig {
    /// 0 (fastest) to 9 (smallest)
    #[validate(range(min = 0, max = 9))]
    level: Option<u32>,
    #[validate(range(min = 1))]
    thread: Option<u32>,
}

impl<W: Write> CompressorBuilder<W> for XzConfig {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>> {
        let level = self.level.unwrap_or(DEFAULT_COMPRESSION_LEVEL);
        let thread = self.thread.unwrap_or(1);
        tracing::debug!("Creating XZ compressor with level={level}, threads={thread}");

        if thread == 1 {
            return Ok(XzEncoder::new(writer, level).into());
        }
        let stream = MtStreamBuilder::new()
            .preset(level)
            .check(Check::Crc64)
            .threads(thread)
            .encoder()?;
        Ok(XzEncoder::new_stream(writer, stream).into())
    }
}
