/*!
    FFmpeg-backed capabilities.

    Containers come from libavformat, decoders from libavcodec and filter
    graphs from libavfilter. Decoded frames keep their native FFmpeg frame in
    [`FrameData`](ffmpeg_types::FrameData) so filters and renderers can use it
    without a copy.
*/

mod convert;
mod decode;
mod filter;
mod source;

use std::sync::Arc;

use ffmpeg_types::{Error, Result};

use crate::capability::Capabilities;

pub use decode::FfmpegCodecs;
pub use filter::FfmpegFilters;
pub use source::FfmpegOpener;

/**
    Capabilities backed by the system FFmpeg libraries.
*/
pub fn capabilities() -> Result<Capabilities> {
    ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;
    let parameters = source::ParameterStore::default();
    Ok(Capabilities {
        containers: Arc::new(FfmpegOpener::new(parameters.clone())),
        codecs: Arc::new(FfmpegCodecs::new(parameters)),
        filters: Arc::new(FfmpegFilters),
    })
}
