use std::sync::Arc;

use crate::decode::{DecodeResult, Decoder};
use crate::error::Result;

use super::frame::Frame;
use super::frame_queue::FrameQueue;

/**
    Subtitle decoding runs on the caller's thread instead of a decode thread.
*/
pub struct SubtitleStream {
    decoder: Decoder,
    frames: Arc<FrameQueue>,
}

impl SubtitleStream {
    pub fn new(decoder: Decoder, frames: Arc<FrameQueue>) -> Self {
        Self { decoder, frames }
    }

    pub fn frames(&self) -> &Arc<FrameQueue> {
        &self.frames
    }

    /**
        Decode whatever subtitle packets are queued, without blocking.
        Returns the number of subtitles added to the frame queue.
    */
    pub fn poll(&mut self) -> Result<usize> {
        let mut queued = 0;
        while !self.frames.is_full() {
            match self.decoder.decode_next(false)? {
                DecodeResult::Subtitle(subtitle) => {
                    let Some(slot) = self.frames.peek_writable() else {
                        break;
                    };
                    slot.push(Frame::subtitle(subtitle, self.decoder.pkt_serial()));
                    queued += 1;
                }
                DecodeResult::Frame(_) => {}
                DecodeResult::NoFrame | DecodeResult::Aborted => break,
            }
        }
        Ok(queued)
    }
}
