use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ffmpeg_types::{
    Error as MediaError, FrameFormat, MediaType, Packet, Rational, RawFrame, StreamInfo, Subtitle,
};
use tracing::{debug, trace, warn};

use crate::capability::{Codec, Decoded};
use crate::control::ContinueRead;
use crate::error::Result;

use super::packet_queue::{Dequeued, FlushMarker, PacketQueue, Queued};

const MILLIS: Rational = Rational::new(1, 1000);

/**
    Result of one [`Decoder::decode_next`] call.
*/
#[derive(Debug)]
pub enum DecodeResult {
    Frame(RawFrame),
    Subtitle(Subtitle),
    /// Nothing decoded: the queue is empty (non-blocking) or the epoch finished.
    NoFrame,
    Aborted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderState {
    /// Waiting for the next packet.
    DrainingQueue,
    /// Part of a packet or buffered output is left to hand out.
    DecodingPending,
    /// Discarding frames until the precise seek target is reached.
    SeekingForward { target_ms: i64 },
    /// The codec drained at the end of the current epoch.
    Finished,
}

/**
    Decoder progress visible to the read loop.
*/
#[derive(Debug, Default)]
pub struct DecoderStatus {
    finished: AtomicU64,
    pkt_serial: AtomicU64,
}

impl DecoderStatus {
    /// Serial at which the codec drained, 0 if it has not.
    pub fn finished(&self) -> u64 {
        self.finished.load(Ordering::Acquire)
    }

    pub fn pkt_serial(&self) -> u64 {
        self.pkt_serial.load(Ordering::Acquire)
    }
}

enum Fetch {
    Packet,
    WouldBlock,
    Aborted,
}

/**
    Pulls packets from a [`PacketQueue`] through a [`Codec`] and stamps the
    frames that come out.

    Flush markers reset the codec and start a new epoch. Packets and
    buffered output from an older epoch are dropped without being decoded or
    returned.
*/
pub struct Decoder {
    codec: Box<dyn Codec>,
    packets: Arc<PacketQueue>,
    media_type: MediaType,
    pkt_time_base: Rational,
    pending: Option<Packet>,
    ready: VecDeque<(Decoded, Option<i64>)>,
    pkt_serial: u64,
    status: Arc<DecoderStatus>,
    seek_target_ms: Option<i64>,
    next_pts: Option<i64>,
    next_pts_tb: Rational,
    start_pts: Option<i64>,
    start_pts_tb: Rational,
    continue_read: Option<Arc<ContinueRead>>,
}

impl Decoder {
    pub fn new(codec: Box<dyn Codec>, stream: &StreamInfo, packets: Arc<PacketQueue>) -> Self {
        Self {
            codec,
            packets,
            media_type: stream.media_type,
            pkt_time_base: stream.time_base,
            pending: None,
            ready: VecDeque::new(),
            pkt_serial: 0,
            status: Arc::new(DecoderStatus::default()),
            seek_target_ms: None,
            next_pts: None,
            next_pts_tb: stream.time_base,
            start_pts: None,
            start_pts_tb: stream.time_base,
            continue_read: None,
        }
    }

    pub(crate) fn with_continue_read(mut self, continue_read: Arc<ContinueRead>) -> Self {
        self.continue_read = Some(continue_read);
        self
    }

    /**
        Seed timestamp prediction for frames that arrive without timestamps
        at the start of each epoch.
    */
    pub fn set_start_pts(&mut self, pts: i64, time_base: Rational) {
        self.start_pts = Some(pts);
        self.start_pts_tb = time_base;
    }

    pub fn state(&self) -> DecoderState {
        if let Some(target_ms) = self.seek_target_ms {
            return DecoderState::SeekingForward { target_ms };
        }
        if self.pending.is_some() || !self.ready.is_empty() {
            return DecoderState::DecodingPending;
        }
        let finished = self.status.finished();
        if finished != 0 && finished == self.pkt_serial {
            return DecoderState::Finished;
        }
        DecoderState::DrainingQueue
    }

    pub fn pkt_serial(&self) -> u64 {
        self.pkt_serial
    }

    pub fn status(&self) -> &Arc<DecoderStatus> {
        &self.status
    }

    pub fn packets(&self) -> &Arc<PacketQueue> {
        &self.packets
    }

    /**
        Record that the stream drained at `serial`. Called when the filter
        graph behind this decoder reports end of stream.
    */
    pub fn mark_finished(&self, serial: u64) {
        self.status.finished.store(serial, Ordering::Release);
    }

    /**
        Produce the next frame or subtitle.

        Keeps decoding until something comes out, the epoch finishes, or the
        queue is aborted. Abort is reported as [`DecodeResult::Aborted`], never
        as an error. Bad packets are skipped; other codec errors are returned.
    */
    pub fn decode_next(&mut self, block: bool) -> Result<DecodeResult> {
        loop {
            if self.packets.is_aborted() {
                return Ok(DecodeResult::Aborted);
            }
            if self.packets.serial() != self.pkt_serial {
                self.pending = None;
                self.ready.clear();
            }

            if let Some((item, pkt_pts)) = self.ready.pop_front() {
                if let Some(result) = self.accept(item, pkt_pts) {
                    return Ok(result);
                }
                continue;
            }

            if self.pending.is_none() {
                match self.next_packet(block) {
                    Fetch::Packet => {}
                    Fetch::WouldBlock => return Ok(DecodeResult::NoFrame),
                    Fetch::Aborted => return Ok(DecodeResult::Aborted),
                }
            }

            if self.decode_pending()? {
                return Ok(DecodeResult::NoFrame);
            }
        }
    }

    fn next_packet(&mut self, block: bool) -> Fetch {
        loop {
            if self.packets.is_empty() {
                if let Some(continue_read) = &self.continue_read {
                    continue_read.notify();
                }
            }
            let entry = match self.packets.get(block) {
                Dequeued::Entry(entry) => entry,
                Dequeued::WouldBlock => return Fetch::WouldBlock,
                Dequeued::Aborted => return Fetch::Aborted,
            };
            self.pkt_serial = entry.serial;
            self.status.pkt_serial.store(entry.serial, Ordering::Release);
            match entry.item {
                Queued::Flush(marker) => self.restart(marker),
                Queued::Packet(packet) => {
                    if entry.serial == self.packets.serial() {
                        self.pending = Some(packet);
                        return Fetch::Packet;
                    }
                }
            }
        }
    }

    fn restart(&mut self, marker: FlushMarker) {
        self.codec.flush();
        self.pending = None;
        self.ready.clear();
        self.status.finished.store(0, Ordering::Release);
        self.next_pts = self.start_pts;
        self.next_pts_tb = self.start_pts_tb;
        match marker.seek_target_ms {
            Some(target_ms) => self.enter_seeking_forward(target_ms),
            None => self.exit_seeking_forward(),
        }
        debug!(serial = self.pkt_serial, media = ?self.media_type, "decoder flushed");
    }

    fn enter_seeking_forward(&mut self, target_ms: i64) {
        debug!(target_ms, media = ?self.media_type, "seeking forward");
        self.seek_target_ms = Some(target_ms);
    }

    fn exit_seeking_forward(&mut self) {
        if let Some(target_ms) = self.seek_target_ms.take() {
            debug!(target_ms, media = ?self.media_type, "seek target reached");
        }
    }

    /**
        Feed the pending packet to the codec once. Returns true when a null
        packet produced nothing, which finishes the epoch.
    */
    fn decode_pending(&mut self) -> Result<bool> {
        let Some(packet) = self.pending.as_mut() else {
            return Ok(false);
        };
        let pkt_pts = packet.pts;
        let output = match self.codec.decode(packet) {
            Ok(output) => output,
            Err(MediaError::InvalidData(reason)) => {
                warn!(%reason, media = ?self.media_type, "skipping undecodable packet");
                self.pending = None;
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        if packet.is_null() {
            if output.items.is_empty() {
                self.pending = None;
                self.mark_finished(self.pkt_serial);
                debug!(serial = self.pkt_serial, media = ?self.media_type, "decoder finished");
                return Ok(true);
            }
        } else {
            let consumed = match self.media_type {
                MediaType::Audio if output.consumed > 0 => output.consumed.min(packet.size()),
                _ => packet.size(),
            };
            packet.data.drain(..consumed);
            packet.pts = None;
            packet.dts = None;
            if packet.data.is_empty() {
                self.pending = None;
            }
        }

        self.ready.extend(output.items.into_iter().map(|item| (item, pkt_pts)));
        Ok(false)
    }

    fn accept(&mut self, item: Decoded, pkt_pts: Option<i64>) -> Option<DecodeResult> {
        let mut frame = match item {
            Decoded::Subtitle(subtitle) => return Some(DecodeResult::Subtitle(subtitle)),
            Decoded::Frame(frame) => frame,
        };
        let format = frame.format;
        let time_base = match format {
            FrameFormat::Audio(audio) => self.stamp_audio(&mut frame, audio.sample_rate, pkt_pts),
            FrameFormat::Video(_) => {
                frame.pts = frame.pts.or(frame.pkt_dts).or(pkt_pts);
                self.pkt_time_base
            }
        };

        if let Some(target_ms) = self.seek_target_ms {
            let time_ms = pkt_pts
                .map(|pts| self.pkt_time_base.rescale(pts, MILLIS))
                .or_else(|| frame.pts.map(|pts| time_base.rescale(pts, MILLIS)));
            if matches!(time_ms, Some(time_ms) if time_ms < target_ms) {
                trace!(?time_ms, target_ms, "dropping frame before seek target");
                return None;
            }
            self.exit_seeking_forward();
        }
        Some(DecodeResult::Frame(frame))
    }

    /**
        Move an audio frame's pts into 1/sample_rate, filling it in from the
        packet or the running prediction when the codec left it unset.
    */
    fn stamp_audio(
        &mut self,
        frame: &mut RawFrame,
        sample_rate: u32,
        pkt_pts: Option<i64>,
    ) -> Rational {
        let time_base = match i32::try_from(sample_rate) {
            Ok(rate) if rate > 0 => Rational::new(1, rate),
            _ => self.pkt_time_base,
        };
        let pts = frame
            .pts
            .or(pkt_pts)
            .map(|pts| self.pkt_time_base.rescale(pts, time_base))
            .or_else(|| self.next_pts.map(|pts| self.next_pts_tb.rescale(pts, time_base)));
        if let Some(pts) = pts {
            self.next_pts = Some(pts + frame.nb_samples as i64);
            self.next_pts_tb = time_base;
        }
        frame.pts = pts;
        time_base
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("media_type", &self.media_type)
            .field("state", &self.state())
            .field("pkt_serial", &self.pkt_serial)
            .finish_non_exhaustive()
    }
}
