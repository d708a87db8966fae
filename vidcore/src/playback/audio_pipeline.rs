use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::debug;

use crate::decode::{DecodeResult, Decoder};
use crate::error::Result;
use crate::filter::{Drained, FilterStage};

use super::frame::Frame;
use super::frame_queue::FrameQueue;

/**
    Body of the audio decode thread. Returns when the packet queue is aborted
    or the codec fails.
*/
pub(crate) fn decode_audio_frames(
    mut decoder: Decoder,
    mut filters: FilterStage,
    frames: Arc<FrameQueue>,
) -> Result<()> {
    loop {
        let raw = match decoder.decode_next(true)? {
            DecodeResult::Frame(raw) => raw,
            DecodeResult::Aborted => break,
            DecodeResult::NoFrame | DecodeResult::Subtitle(_) => continue,
        };

        let serial = decoder.pkt_serial();
        let packets = decoder.packets();
        let mut aborted = false;
        let drained = filters.submit(raw, serial, |frame, output| {
            let Some(slot) = frames.peek_writable() else {
                aborted = true;
                return ControlFlow::Break(());
            };
            let pts = frame.pts.map(|pts| output.time_base.seconds(pts));
            let duration = frame
                .audio_format()
                .filter(|format| format.sample_rate > 0)
                .map_or(0.0, |format| frame.nb_samples as f64 / format.sample_rate as f64);
            slot.push(Frame::samples(frame, pts, duration, output.serial));
            // A seek landed while draining; stop feeding stale samples.
            if packets.serial() != output.serial {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;

        if aborted {
            break;
        }
        if drained == Drained::EndOfStream {
            decoder.mark_finished(serial);
        }
    }
    debug!("audio decoder stopped");
    Ok(())
}
