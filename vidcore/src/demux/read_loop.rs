use std::sync::Arc;
use std::time::Duration;

use ffmpeg_types::{Packet, Rational};
use tracing::{debug, error, info, trace, warn};

use crate::capability::{Container, ReadOutcome, SeekRequest, StreamKind};
use crate::control::{SeekCommand, Shared};
use crate::decode::{DecoderStatus, FlushMarker, PacketQueue};
use crate::engine::PlaybackState;
use crate::error::Error;
use crate::playback::FrameQueue;

const MILLIS: Rational = Rational::new(1, 1000);

/**
    Read loop view of one opened stream.
*/
pub(crate) struct StreamSlot {
    pub kind: StreamKind,
    pub index: usize,
    pub time_base: Rational,
    pub start_time: Option<i64>,
    pub packets: Arc<PacketQueue>,
    pub frames: Arc<FrameQueue>,
    /// Absent for subtitles, which have no decode thread.
    pub status: Option<Arc<DecoderStatus>>,
    pub attached_pic: Option<Packet>,
}

impl StreamSlot {
    fn has_enough_packets(&self, min_packets: usize) -> bool {
        self.packets.is_aborted() || self.attached_pic.is_some() || self.packets.len() > min_packets
    }
}

enum Step {
    Continue,
    Stop,
}

/**
    The demux thread: applies pause and seek requests, paces itself against
    the packet queues, and routes packets to their streams.
*/
pub(crate) struct ReadLoop {
    container: Box<dyn Container>,
    shared: Arc<Shared>,
    slots: Vec<StreamSlot>,
    eof: bool,
    paused: bool,
    queue_attachments: bool,
    completed_epoch: Option<Vec<u64>>,
}

impl ReadLoop {
    pub fn new(
        container: Box<dyn Container>,
        shared: Arc<Shared>,
        slots: Vec<StreamSlot>,
    ) -> Self {
        Self {
            container,
            shared,
            slots,
            eof: false,
            paused: false,
            queue_attachments: true,
            completed_epoch: None,
        }
    }

    pub fn run(mut self) {
        info!(streams = self.slots.len(), "read loop started");
        while let Step::Continue = self.step() {}
        info!("read loop stopped");
    }

    fn step(&mut self) -> Step {
        let (abort, paused, seek) = {
            let control = self.shared.control.lock();
            (control.abort, control.paused, control.seek)
        };
        if abort {
            return Step::Stop;
        }

        if paused != self.paused {
            self.paused = paused;
            self.apply_pause(paused);
        }

        if let Some(seek) = seek {
            self.apply_seek(seek);
        }

        if self.queue_attachments {
            self.queue_attachments = false;
            self.enqueue_attached_pictures();
        }

        if self.queues_full() {
            self.idle();
            return Step::Continue;
        }

        if !paused {
            if let Step::Stop = self.check_completion() {
                return Step::Stop;
            }
        }

        self.read()
    }

    fn apply_pause(&mut self, paused: bool) {
        let result = if paused {
            self.container.pause()
        } else {
            self.container.resume()
        };
        match result {
            Ok(()) => debug!(paused, "container pause state changed"),
            Err(e) => warn!(error = %e, paused, "container pause hook failed"),
        }
    }

    fn apply_seek(&mut self, seek: SeekCommand) {
        let start_time = self.container.start_time().unwrap_or(0);
        let request = seek_request(&seek, start_time);
        match self.container.seek(&request) {
            Ok(()) => {
                let seek_target_ms = (self.shared.config.precise_seek && !seek.flags.byte)
                    .then(|| request.target / 1000);
                for slot in &self.slots {
                    slot.packets.flush();
                    let _ = slot.packets.put_flush_marker(FlushMarker { seek_target_ms });
                }
                info!(target = request.target, byte = seek.flags.byte, "seek applied");
            }
            Err(e) => error!(error = %e, target = request.target, "seek failed"),
        }
        {
            let mut control = self.shared.control.lock();
            control.seek = None;
            if control.state == PlaybackState::Completed {
                control.state = PlaybackState::Playing;
            }
        }
        self.eof = false;
        self.queue_attachments = true;
        self.shared.events.on_seek_completed(seek.flags);
    }

    fn enqueue_attached_pictures(&self) {
        for slot in &self.slots {
            if let Some(picture) = &slot.attached_pic {
                let _ = slot.packets.put(picture.clone());
                let _ = slot.packets.put_null(slot.index);
                debug!(kind = slot.kind.name(), stream = slot.index, "queued attached picture");
            }
        }
    }

    /**
        True when the queues hold more than the byte ceiling and every stream
        already has enough packets.
    */
    fn queues_full(&self) -> bool {
        let config = &self.shared.config;
        let total: usize = self.slots.iter().map(|slot| slot.packets.byte_size()).sum();
        total > config.max_queue_bytes
            && self
                .slots
                .iter()
                .all(|slot| slot.has_enough_packets(config.min_queued_packets))
    }

    /**
        Fires the completion callback once per epoch, when every decoded stream
        has drained at its current serial and no frames are left to show.
    */
    fn check_completion(&mut self) -> Step {
        let Some(epoch) = self.drained_epoch() else {
            return Step::Continue;
        };
        if self.completed_epoch.as_ref() == Some(&epoch) {
            return Step::Continue;
        }
        self.completed_epoch = Some(epoch);
        self.shared.set_state(PlaybackState::Completed);
        info!("playback completed");
        if self.shared.events.on_playback_completed() {
            self.shared.set_state(PlaybackState::Stopped);
            return Step::Stop;
        }
        Step::Continue
    }

    fn drained_epoch(&self) -> Option<Vec<u64>> {
        let mut epoch = Vec::new();
        for slot in &self.slots {
            let Some(status) = &slot.status else {
                continue;
            };
            let serial = slot.packets.serial();
            if status.finished() != serial || slot.frames.remaining() > 0 {
                return None;
            }
            epoch.push(serial);
        }
        (!epoch.is_empty()).then_some(epoch)
    }

    fn read(&mut self) -> Step {
        match self.container.read_packet() {
            Ok(ReadOutcome::Packet(packet)) => {
                self.eof = false;
                self.route(packet);
            }
            Ok(ReadOutcome::EndOfStream) => {
                if !self.eof {
                    for slot in &self.slots {
                        let _ = slot.packets.put_null(slot.index);
                    }
                    self.eof = true;
                    debug!("end of stream");
                }
                self.idle();
            }
            Ok(ReadOutcome::Retry) => self.idle(),
            Err(e) => {
                error!(error = %e, "container read failed");
                let e = Error::from(e);
                self.shared.events.on_error(None, &e);
                self.shared.set_state(PlaybackState::Stopped);
                return Step::Stop;
            }
        }
        Step::Continue
    }

    fn route(&self, packet: Packet) {
        let Some(slot) = self
            .slots
            .iter()
            .find(|slot| slot.index == packet.stream_index)
        else {
            return;
        };
        if slot.attached_pic.is_some() {
            return;
        }
        let start_time_ms = self.shared.config.start_time_ms;
        let Some(duration_ms) = self.shared.config.play_duration_ms else {
            let _ = slot.packets.put(packet);
            return;
        };
        if in_play_range(&packet, slot.time_base, slot.start_time, start_time_ms, duration_ms) {
            let _ = slot.packets.put(packet);
        } else {
            trace!(kind = slot.kind.name(), pts = ?packet.pts, "packet outside play range");
        }
    }

    fn idle(&self) {
        let timeout = Duration::from_millis(self.shared.config.idle_wait_ms);
        self.shared.continue_read.wait(timeout);
    }
}

/**
    Translate a seek command into a container request.

    Time seeks are converted from milliseconds to microseconds and offset by
    the container start time. A relative hint narrows the window on the side
    the user came from, so a forward seek never lands before its origin.
*/
fn seek_request(seek: &SeekCommand, start_time: i64) -> SeekRequest {
    let (target, relative) = if seek.flags.byte {
        (seek.position, seek.relative)
    } else {
        (
            seek.position.saturating_mul(1000).saturating_add(start_time),
            seek.relative.saturating_mul(1000),
        )
    };
    SeekRequest {
        target,
        min: if relative > 0 {
            target - relative + 2
        } else {
            i64::MIN
        },
        max: if relative < 0 {
            target - relative - 2
        } else {
            i64::MAX
        },
        flags: seek.flags,
    }
}

fn in_play_range(
    packet: &Packet,
    time_base: Rational,
    stream_start: Option<i64>,
    start_time_ms: i64,
    duration_ms: i64,
) -> bool {
    let Some(timestamp) = packet.timestamp() else {
        return true;
    };
    let position_ms = time_base.rescale(timestamp - stream_start.unwrap_or(0), MILLIS);
    position_ms - start_time_ms <= duration_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::SeekFlags;

    fn command(position: i64, relative: i64, byte: bool) -> SeekCommand {
        SeekCommand {
            position,
            relative,
            flags: SeekFlags { byte },
        }
    }

    #[test]
    fn forward_seek_window_excludes_origin() {
        let request = seek_request(&command(5000, 2000, false), 0);
        assert_eq!(request.target, 5_000_000);
        assert_eq!(request.min, 3_000_002);
        assert_eq!(request.max, i64::MAX);
    }

    #[test]
    fn backward_seek_window_excludes_origin() {
        let request = seek_request(&command(5000, -2000, false), 0);
        assert_eq!(request.min, i64::MIN);
        assert_eq!(request.max, 6_999_998);
    }

    #[test]
    fn time_seek_adds_container_start() {
        let request = seek_request(&command(1000, 0, false), 500_000);
        assert_eq!(request.target, 1_500_000);
        assert_eq!((request.min, request.max), (i64::MIN, i64::MAX));
    }

    #[test]
    fn byte_seek_is_passed_through() {
        let request = seek_request(&command(65536, 4096, true), 500_000);
        assert_eq!(request.target, 65536);
        assert_eq!(request.min, 61442);
        assert!(request.flags.byte);
    }

    #[test]
    fn play_range_is_relative_to_start_offset() {
        let packet = |pts| Packet::new(0, vec![0], Some(pts), None);
        let tb = Rational::new(1, 90000);
        assert!(in_play_range(&packet(90000 * 3), tb, Some(0), 1000, 2000));
        assert!(!in_play_range(&packet(90000 * 4), tb, Some(0), 1000, 2000));
        assert!(in_play_range(&packet(90000 * 4), tb, Some(90000), 1000, 2000));
        assert!(in_play_range(&Packet::new(0, vec![0], None, None), tb, None, 0, 0));
    }
}
