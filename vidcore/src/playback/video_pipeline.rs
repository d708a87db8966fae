use std::ops::ControlFlow;
use std::sync::Arc;

use ffmpeg_types::Rational;
use tracing::debug;

use crate::decode::{DecodeResult, Decoder};
use crate::error::Result;
use crate::filter::{Drained, FilterStage};

use super::frame::Frame;
use super::frame_queue::FrameQueue;

/**
    Body of the video decode thread. Returns when the packet queue is aborted
    or the codec fails.

    `stream_sar` is used for frames whose own sample aspect ratio is unknown.
*/
pub(crate) fn decode_video_frames(
    mut decoder: Decoder,
    mut filters: FilterStage,
    frames: Arc<FrameQueue>,
    stream_sar: Rational,
) -> Result<()> {
    loop {
        let raw = match decoder.decode_next(true)? {
            DecodeResult::Frame(raw) => raw,
            DecodeResult::Aborted => break,
            DecodeResult::NoFrame | DecodeResult::Subtitle(_) => continue,
        };

        let serial = decoder.pkt_serial();
        let mut aborted = false;
        let drained = filters.submit(raw, serial, |frame, output| {
            let Some(slot) = frames.peek_writable() else {
                aborted = true;
                return ControlFlow::Break(());
            };
            let duration = output
                .frame_rate
                .filter(|rate| rate.is_valid() && rate.num > 0)
                .map_or(0.0, |rate| rate.invert().to_f64());
            let pts = frame.pts.map(|pts| output.time_base.seconds(pts));
            let sar = frame
                .video_format()
                .map(|format| format.sample_aspect_ratio)
                .filter(|sar| sar.num > 0 && sar.is_valid())
                .unwrap_or(stream_sar);
            slot.push(Frame::picture(frame, pts, duration, output.serial, sar));
            ControlFlow::Continue(())
        })?;

        if aborted {
            break;
        }
        if drained == Drained::EndOfStream {
            decoder.mark_finished(serial);
        }
    }
    debug!("video decoder stopped");
    Ok(())
}
