/*!
    Lifecycle and control surface of a playback session.
*/

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ffmpeg_types::StreamInfo;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::capability::{Capabilities, EventSink, Prepared, SeekFlags, SeekRequest, StreamKind};
use crate::config::EngineConfig;
use crate::control::{SeekCommand, Shared};
use crate::decode::{Decoder, FlushMarker, PacketQueue};
use crate::demux::{ReadLoop, StreamSlot, select_streams};
use crate::error::{Error, Result};
use crate::filter::FilterStage;
use crate::playback::{
    Frame, FrameQueue, SubtitleStream, decode_audio_frames, decode_video_frames,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
    /// Every stream drained; a seek starts playback again.
    Completed,
    Stopped,
}

/**
    Consumer-side handle to one opened stream.
*/
pub struct StreamHandle {
    info: StreamInfo,
    packets: Arc<PacketQueue>,
    frames: Arc<FrameQueue>,
}

impl StreamHandle {
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn frames(&self) -> &Arc<FrameQueue> {
        &self.frames
    }

    /**
        Current epoch. Frames with an older serial predate the last seek.
    */
    pub fn serial(&self) -> u64 {
        self.packets.serial()
    }

    pub fn is_current(&self, frame: &Frame) -> bool {
        frame.serial == self.serial()
    }

    pub fn queued_packets(&self) -> usize {
        self.packets.len()
    }

    pub fn queued_bytes(&self) -> usize {
        self.packets.byte_size()
    }
}

/**
    A running playback session.

    `open` starts one read loop thread and one decode thread per audio and
    video stream. Dropping the engine closes it.
*/
pub struct Engine {
    shared: Arc<Shared>,
    read_thread: Option<JoinHandle<()>>,
    decode_threads: Vec<JoinHandle<()>>,
    video: Option<StreamHandle>,
    audio: Option<StreamHandle>,
    subtitle: Option<StreamHandle>,
    subtitle_stream: Mutex<Option<SubtitleStream>>,
    closed: bool,
}

impl Engine {
    /**
        Open `source`, pick its streams and start playback.

        Fails if the container cannot be opened, has no audio or video
        stream, or a decoder cannot be created. Anything started before the
        failure is shut down again.
    */
    pub fn open(
        source: &str,
        capabilities: Capabilities,
        config: EngineConfig,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let mut container = capabilities.containers.open(source)?;

        let mut first_epoch = FlushMarker::default();
        if config.start_time_ms != 0 {
            let request = SeekRequest {
                target: config
                    .start_time_ms
                    .saturating_mul(1000)
                    .saturating_add(container.start_time().unwrap_or(0)),
                min: i64::MIN,
                max: i64::MAX,
                flags: SeekFlags::default(),
            };
            match container.seek(&request) {
                Ok(()) if config.precise_seek => {
                    first_epoch.seek_target_ms = Some(request.target / 1000);
                }
                Ok(()) => {}
                Err(e) => warn!(
                    source,
                    error = %e,
                    start_time_ms = config.start_time_ms,
                    "could not seek to start position"
                ),
            }
        }

        let streams = container.streams().to_vec();
        let selection = select_streams(&streams, &config.wanted_streams, config.enable_subtitles);
        if !selection.has_playable() {
            return Err(Error::NoPlayableStream(source.to_string()));
        }
        let seeks_by_timestamp = container.seeks_by_timestamp();

        let mut engine = Self {
            shared: Arc::new(Shared::new(config, events)),
            read_thread: None,
            decode_threads: Vec::new(),
            video: None,
            audio: None,
            subtitle: None,
            subtitle_stream: Mutex::new(None),
            closed: false,
        };

        let mut slots = Vec::new();
        let wanted = [
            (StreamKind::Audio, selection.audio),
            (StreamKind::Video, selection.video),
            (StreamKind::Subtitle, selection.subtitle),
        ];
        for (kind, index) in wanted {
            let stream = index.and_then(|index| streams.iter().find(|s| s.index == index));
            let Some(info) = stream else {
                continue;
            };
            slots.push(engine.open_stream(
                kind,
                info,
                &capabilities,
                seeks_by_timestamp,
                first_epoch,
            )?);
        }
        // Route video first so completion epochs list video before audio.
        slots.sort_by_key(|slot| match slot.kind {
            StreamKind::Video => 0,
            StreamKind::Audio => 1,
            StreamKind::Subtitle => 2,
        });

        let read_loop = ReadLoop::new(container, Arc::clone(&engine.shared), slots);
        let read_thread = thread::Builder::new()
            .name("vidcore-read".into())
            .spawn(move || read_loop.run())
            .map_err(|source| Error::Spawn {
                name: "vidcore-read",
                source,
            })?;
        engine.read_thread = Some(read_thread);

        let prepared = Prepared {
            video: selection.video,
            audio: selection.audio,
            subtitle: selection.subtitle,
        };
        info!(source, ?prepared, "playback started");
        engine.shared.events.on_prepared(&prepared);
        Ok(engine)
    }

    fn open_stream(
        &mut self,
        kind: StreamKind,
        info: &StreamInfo,
        capabilities: &Capabilities,
        seeks_by_timestamp: bool,
        first_epoch: FlushMarker,
    ) -> Result<StreamSlot> {
        let shared = Arc::clone(&self.shared);
        let config = &shared.config;
        let (capacity, keep_last) = match kind {
            StreamKind::Video => (config.video_queue_capacity(), true),
            StreamKind::Audio => (config.audio_queue_capacity(), true),
            StreamKind::Subtitle => (config.subtitle_queue_capacity(), false),
        };
        let packets = Arc::new(PacketQueue::new());
        let frames = Arc::new(FrameQueue::new(Arc::clone(&packets), capacity, keep_last));

        let codec = capabilities.codecs.open(info)?;
        let mut decoder = Decoder::new(codec, info, Arc::clone(&packets))
            .with_continue_read(Arc::clone(&shared.continue_read));
        let status = Arc::clone(decoder.status());

        packets.start_with(first_epoch);
        let handle = StreamHandle {
            info: info.clone(),
            packets: Arc::clone(&packets),
            frames: Arc::clone(&frames),
        };
        match kind {
            StreamKind::Video => self.video = Some(handle),
            StreamKind::Audio => self.audio = Some(handle),
            StreamKind::Subtitle => self.subtitle = Some(handle),
        }

        let status = match kind {
            StreamKind::Audio => {
                if !seeks_by_timestamp {
                    if let Some(start) = info.start_time {
                        decoder.set_start_pts(start, info.time_base);
                    }
                }
                let filters = FilterStage::new(
                    Arc::clone(&capabilities.filters),
                    config.audio_filter.clone(),
                    info,
                );
                let frames = Arc::clone(&frames);
                self.spawn_decoder(kind, move || decode_audio_frames(decoder, filters, frames))?;
                Some(status)
            }
            StreamKind::Video => {
                let filters = FilterStage::new(
                    Arc::clone(&capabilities.filters),
                    config.video_filter.clone(),
                    info,
                );
                let frames = Arc::clone(&frames);
                let sar = info.codec.sample_aspect_ratio;
                self.spawn_decoder(kind, move || {
                    decode_video_frames(decoder, filters, frames, sar)
                })?;
                Some(status)
            }
            StreamKind::Subtitle => {
                *self.subtitle_stream.lock() =
                    Some(SubtitleStream::new(decoder, Arc::clone(&frames)));
                None
            }
        };

        debug!(
            kind = kind.name(),
            index = info.index,
            codec = %info.codec.codec_name,
            "stream opened"
        );
        Ok(StreamSlot {
            kind,
            index: info.index,
            time_base: info.time_base,
            start_time: info.start_time,
            packets,
            frames,
            status,
            attached_pic: info
                .has_attached_pic()
                .then(|| info.attached_pic.clone())
                .flatten(),
        })
    }

    fn spawn_decoder<F>(&mut self, kind: StreamKind, body: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let name = match kind {
            StreamKind::Video => "vidcore-video",
            StreamKind::Audio => "vidcore-audio",
            StreamKind::Subtitle => "vidcore-subtitle",
        };
        let events = Arc::clone(&self.shared.events);
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                if let Err(e) = body() {
                    error!(kind = kind.name(), error = %e, "decoder failed");
                    events.on_error(Some(kind), &e);
                }
            })
            .map_err(|source| Error::Spawn { name, source })?;
        self.decode_threads.push(handle);
        Ok(())
    }

    /**
        Ask the read loop to seek.

        `position_ms` is the target and `relative_ms` the distance from the
        current position (0 when unknown); both are bytes when `byte_mode` is
        set. Returns false if another seek is still pending, in which case
        this one is dropped.
    */
    pub fn seek(&self, position_ms: i64, relative_ms: i64, byte_mode: bool) -> bool {
        let command = SeekCommand {
            position: position_ms,
            relative: relative_ms,
            flags: SeekFlags { byte: byte_mode },
        };
        let accepted = self.shared.control.lock().request_seek(command);
        if accepted {
            debug!(position_ms, relative_ms, byte_mode, "seek requested");
            self.shared.continue_read.notify();
        } else {
            debug!(position_ms, "seek ignored while another is pending");
        }
        accepted
    }

    pub fn pause(&self) {
        self.set_paused(true);
    }

    pub fn resume(&self) {
        self.set_paused(false);
    }

    pub fn toggle_pause(&self) {
        let paused = self.is_paused();
        self.set_paused(!paused);
    }

    fn set_paused(&self, paused: bool) {
        {
            let mut control = self.shared.control.lock();
            control.paused = paused;
            control.state = match (control.state, paused) {
                (PlaybackState::Playing, true) => PlaybackState::Paused,
                (PlaybackState::Paused, false) => PlaybackState::Playing,
                (state, _) => state,
            };
        }
        self.shared.continue_read.notify();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.control.lock().paused
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.control.lock().state
    }

    pub fn video(&self) -> Option<&StreamHandle> {
        self.video.as_ref()
    }

    pub fn audio(&self) -> Option<&StreamHandle> {
        self.audio.as_ref()
    }

    pub fn subtitle(&self) -> Option<&StreamHandle> {
        self.subtitle.as_ref()
    }

    /**
        Byte position of the frame on screen, for byte-based seeking.
    */
    pub fn byte_position(&self) -> Option<i64> {
        self.video
            .as_ref()
            .and_then(|video| video.frames.last_pos())
            .or_else(|| self.audio.as_ref().and_then(|audio| audio.frames.last_pos()))
    }

    /**
        Decode queued subtitle packets into the subtitle frame queue.
        Returns how many subtitles were added.
    */
    pub fn poll_subtitles(&self) -> Result<usize> {
        if self.closed {
            return Err(Error::Stopped);
        }
        match self.subtitle_stream.lock().as_mut() {
            Some(stream) => stream.poll(),
            None => Ok(0),
        }
    }

    /**
        Stop every thread and release the queues. Safe to call twice.
    */
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.shared.control.lock().abort = true;
        for handle in [&self.video, &self.audio, &self.subtitle].into_iter().flatten() {
            handle.packets.abort();
            handle.frames.signal();
        }
        self.shared.continue_read.notify();

        if let Some(handle) = self.read_thread.take() {
            if handle.join().is_err() {
                error!("read thread panicked");
            }
        }
        for handle in self.decode_threads.drain(..) {
            if handle.join().is_err() {
                error!("decode thread panicked");
            }
        }
        *self.subtitle_stream.lock() = None;
        self.shared.set_state(PlaybackState::Stopped);
        info!("playback closed");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    use crate::playback::Payload;
    use crate::synthetic::{SyntheticEvent, SyntheticMedia};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Event {
        Prepared(Prepared),
        SeekCompleted,
        Completed,
        Error(Option<StreamKind>),
    }

    struct Recorder {
        tx: Mutex<mpsc::Sender<Event>>,
        completed: AtomicUsize,
        stop_on_complete: bool,
        media: SyntheticMedia,
    }

    impl Recorder {
        fn new(
            media: &SyntheticMedia,
            stop_on_complete: bool,
        ) -> (Arc<Self>, mpsc::Receiver<Event>) {
            let (tx, rx) = mpsc::channel();
            let recorder = Arc::new(Self {
                tx: Mutex::new(tx),
                completed: AtomicUsize::new(0),
                stop_on_complete,
                media: media.clone(),
            });
            (recorder, rx)
        }

        fn send(&self, event: Event) {
            let _ = self.tx.lock().send(event);
        }
    }

    impl EventSink for Recorder {
        fn on_prepared(&self, prepared: &Prepared) {
            self.send(Event::Prepared(*prepared));
        }

        fn on_seek_completed(&self, _flags: SeekFlags) {
            self.media.note("seek-completed");
            self.send(Event::SeekCompleted);
        }

        fn on_playback_completed(&self) -> bool {
            self.completed.fetch_add(1, Ordering::SeqCst);
            self.send(Event::Completed);
            self.stop_on_complete
        }

        fn on_error(&self, kind: Option<StreamKind>, _error: &Error) {
            self.send(Event::Error(kind));
        }
    }

    fn wait_for(rx: &mpsc::Receiver<Event>, wanted: Event) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match rx.recv_timeout(left) {
                Ok(event) if event == wanted => return true,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
        false
    }

    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    type Seen = Arc<Mutex<Vec<(u64, Option<f64>)>>>;

    /// Drains a frame queue the way a renderer would, until it is aborted.
    fn consume(frames: &Arc<FrameQueue>) -> (JoinHandle<()>, Seen) {
        let frames = Arc::clone(frames);
        let seen: Seen = Arc::default();
        let log = Arc::clone(&seen);
        let handle = thread::spawn(move || {
            loop {
                let Some(frame) = frames.peek_readable() else {
                    break;
                };
                let entry = (frame.serial, frame.pts);
                drop(frame);
                log.lock().push(entry);
                frames.next();
            }
        });
        (handle, seen)
    }

    fn first_pts_with_serial(seen: &Seen, serial: u64) -> Option<f64> {
        seen.lock()
            .iter()
            .find(|(frame_serial, _)| *frame_serial == serial)
            .and_then(|(_, pts)| *pts)
    }

    fn open(media: &SyntheticMedia, config: EngineConfig, events: Arc<Recorder>) -> Engine {
        Engine::open("synthetic://test", media.capabilities(), config, events).unwrap()
    }

    #[test]
    fn two_stream_playback_completes_once() {
        let media = SyntheticMedia::new().with_video(30, 30).with_audio(30, 48000, 1600);
        let (events, rx) = Recorder::new(&media, false);
        let mut engine = open(&media, EngineConfig::default(), Arc::clone(&events));

        assert!(wait_for(
            &rx,
            Event::Prepared(Prepared {
                video: Some(0),
                audio: Some(1),
                subtitle: None,
            })
        ));
        let (video, video_seen) = consume(engine.video().unwrap().frames());
        let (audio, audio_seen) = consume(engine.audio().unwrap().frames());

        assert!(wait_for(&rx, Event::Completed));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(events.completed.load(Ordering::SeqCst), 1);
        assert_eq!(engine.state(), PlaybackState::Completed);
        assert_eq!(video_seen.lock().len(), 30);
        assert_eq!(audio_seen.lock().len(), 30);

        engine.close();
        video.join().unwrap();
        audio.join().unwrap();
        assert_eq!(engine.state(), PlaybackState::Stopped);
    }

    #[test]
    fn seek_flushes_queues_and_starts_new_epoch() {
        let media = SyntheticMedia::new().with_video(300, 30).with_audio(300, 48000, 1600);
        let (events, rx) = Recorder::new(&media, false);
        let mut engine = open(&media, EngineConfig::default(), events);

        let video_frames = Arc::clone(engine.video().unwrap().frames());
        let audio_frames = Arc::clone(engine.audio().unwrap().frames());
        assert!(wait_until(|| video_frames.is_full() && audio_frames.is_full()));
        assert_eq!(engine.video().unwrap().serial(), 1);

        assert!(engine.seek(5000, 0, false));
        assert!(wait_for(&rx, Event::SeekCompleted));
        assert_eq!(engine.video().unwrap().serial(), 2);
        assert_eq!(engine.audio().unwrap().serial(), 2);

        let (video, video_seen) = consume(&video_frames);
        let (audio, audio_seen) = consume(&audio_frames);
        assert!(wait_until(|| {
            first_pts_with_serial(&video_seen, 2).is_some()
                && first_pts_with_serial(&audio_seen, 2).is_some()
        }));
        assert!(first_pts_with_serial(&video_seen, 2).unwrap() >= 4.99);
        assert!(first_pts_with_serial(&audio_seen, 2).unwrap() >= 4.99);

        let log = media.events();
        let seek = log
            .iter()
            .position(|event| matches!(event, SyntheticEvent::Seek(_)))
            .unwrap();
        let completed = log
            .iter()
            .position(|event| *event == SyntheticEvent::Note("seek-completed".into()))
            .unwrap();
        let next_read = log[seek..]
            .iter()
            .position(|event| matches!(event, SyntheticEvent::Read { .. }))
            .map(|offset| seek + offset)
            .unwrap();
        assert!(seek < completed && completed < next_read);

        engine.close();
        video.join().unwrap();
        audio.join().unwrap();
    }

    fn first_frame_after_seek(precise_seek: bool) -> (f64, f64) {
        let media = SyntheticMedia::new()
            .with_video_gop(300, 30, 30)
            .with_audio(300, 48000, 1600);
        let (events, rx) = Recorder::new(&media, false);
        let config = EngineConfig {
            precise_seek,
            ..Default::default()
        };
        let mut engine = open(&media, config, events);
        let (video, video_seen) = consume(engine.video().unwrap().frames());
        let (audio, audio_seen) = consume(engine.audio().unwrap().frames());

        assert!(engine.seek(5500, 0, false));
        assert!(wait_for(&rx, Event::SeekCompleted));
        assert!(wait_until(|| {
            first_pts_with_serial(&video_seen, 2).is_some()
                && first_pts_with_serial(&audio_seen, 2).is_some()
        }));
        let first = (
            first_pts_with_serial(&video_seen, 2).unwrap(),
            first_pts_with_serial(&audio_seen, 2).unwrap(),
        );

        engine.close();
        video.join().unwrap();
        audio.join().unwrap();
        first
    }

    #[test]
    fn coarse_seek_starts_at_keyframe() {
        let (video, audio) = first_frame_after_seek(false);
        assert!((video - 5.0).abs() < 0.01, "video started at {video}");
        assert!((audio - 5.0).abs() < 0.01, "audio started at {audio}");
    }

    #[test]
    fn precise_seek_skips_to_target() {
        let (video, audio) = first_frame_after_seek(true);
        assert!(video >= 5.49, "video started at {video}");
        assert!(audio >= 5.49, "audio started at {audio}");
    }

    #[test]
    fn byte_ceiling_alone_does_not_stall_reading() {
        let media = SyntheticMedia::new().with_video(200, 30).with_audio(200, 48000, 1600);
        let (events, _rx) = Recorder::new(&media, false);
        let config = EngineConfig {
            max_queue_bytes: 1,
            min_queued_packets: 1000,
            ..Default::default()
        };
        let engine = open(&media, config, events);

        assert!(wait_until(|| media.events().contains(&SyntheticEvent::EndOfStream)));
        assert!(engine.video().unwrap().queued_packets() > 0);
        drop(engine);
    }

    #[test]
    fn full_queues_pause_reading() {
        let media = SyntheticMedia::new().with_video(300, 30).with_audio(300, 48000, 1600);
        let (events, _rx) = Recorder::new(&media, false);
        let config = EngineConfig {
            max_queue_bytes: 1,
            min_queued_packets: 5,
            ..Default::default()
        };
        let engine = open(&media, config, events);

        assert!(wait_until(|| {
            engine.video().unwrap().queued_packets() > 5
                && engine.audio().unwrap().queued_packets() > 5
        }));
        thread::sleep(Duration::from_millis(100));
        let reads = media
            .events()
            .iter()
            .filter(|event| matches!(event, SyntheticEvent::Read { .. }))
            .count();
        assert!(reads < 600, "read {reads} packets");
        assert!(!media.events().contains(&SyntheticEvent::EndOfStream));
    }

    #[test]
    fn attached_picture_is_queued_once() {
        let media = SyntheticMedia::new()
            .with_attached_picture()
            .with_audio(30, 48000, 1600);
        let (events, rx) = Recorder::new(&media, false);
        let mut engine = open(&media, EngineConfig::default(), events);
        let (video, video_seen) = consume(engine.video().unwrap().frames());
        let (audio, _) = consume(engine.audio().unwrap().frames());

        assert!(wait_for(&rx, Event::Completed));
        assert_eq!(video_seen.lock().len(), 1);

        engine.close();
        video.join().unwrap();
        audio.join().unwrap();
    }

    #[test]
    fn pause_and_resume_reach_the_container() {
        let media = SyntheticMedia::new().with_video(300, 30);
        let (events, _rx) = Recorder::new(&media, false);
        let engine = open(&media, EngineConfig::default(), events);

        engine.pause();
        assert!(engine.is_paused());
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert!(wait_until(|| media.events().contains(&SyntheticEvent::Pause)));

        engine.resume();
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert!(wait_until(|| media.events().contains(&SyntheticEvent::Resume)));
    }

    #[test]
    fn second_seek_is_dropped_until_first_applies() {
        let media = SyntheticMedia::new().with_video(300, 30);
        let (events, rx) = Recorder::new(&media, false);
        let engine = open(&media, EngineConfig::default(), events);

        assert!(engine.seek(1000, 0, false));
        let second = engine.seek(2000, 0, false);
        assert!(wait_for(&rx, Event::SeekCompleted));
        if second {
            assert!(wait_for(&rx, Event::SeekCompleted));
        }
        let seeks = media
            .events()
            .iter()
            .filter(|event| matches!(event, SyntheticEvent::Seek(_)))
            .count();
        assert_eq!(seeks, 1 + usize::from(second));
    }

    #[test]
    fn read_error_stops_playback() {
        let media = SyntheticMedia::new().with_video(30, 30).failing_read_at(5);
        let (events, rx) = Recorder::new(&media, false);
        let engine = open(&media, EngineConfig::default(), events);

        assert!(wait_for(&rx, Event::Error(None)));
        assert!(wait_until(|| engine.state() == PlaybackState::Stopped));
    }

    #[test]
    fn subtitles_only_is_not_playable() {
        let media = SyntheticMedia::new().with_subtitles(3, 100);
        let (events, _rx) = Recorder::new(&media, false);
        let config = EngineConfig {
            enable_subtitles: true,
            ..Default::default()
        };
        let result = Engine::open("subs.srt", media.capabilities(), config, events);
        assert!(matches!(result, Err(Error::NoPlayableStream(_))));
    }

    #[test]
    fn failed_decoder_open_tears_down_started_streams() {
        let media = SyntheticMedia::new()
            .with_audio(30, 48000, 1600)
            .with_video(30, 30)
            .with_codec_name(1, "unsupported_video");
        let (events, _rx) = Recorder::new(&media, false);
        let capabilities = media.capabilities();

        let (tx, rx) = mpsc::channel();
        let opener = thread::spawn(move || {
            let result = Engine::open("broken", capabilities, EngineConfig::default(), events);
            let _ = tx.send(matches!(
                result,
                Err(Error::Media(ffmpeg_types::Error::UnsupportedFormat(_)))
            ));
        });
        assert!(rx.recv_timeout(TIMEOUT).unwrap());
        opener.join().unwrap();
    }

    #[test]
    fn corrupt_packet_is_skipped() {
        let media = SyntheticMedia::new().with_video(10, 30).with_corrupt_packet(0, 3);
        let (events, rx) = Recorder::new(&media, false);
        let mut engine = open(&media, EngineConfig::default(), events);
        let (video, seen) = consume(engine.video().unwrap().frames());

        assert!(wait_for(&rx, Event::Completed));
        assert_eq!(seen.lock().len(), 9);

        engine.close();
        video.join().unwrap();
    }

    #[test]
    fn subtitles_are_decoded_on_poll() {
        let media = SyntheticMedia::new().with_video(30, 30).with_subtitles(5, 100);
        let (events, _rx) = Recorder::new(&media, false);
        let config = EngineConfig {
            enable_subtitles: true,
            ..Default::default()
        };
        let engine = open(&media, config, events);
        let subtitles = Arc::clone(engine.subtitle().unwrap().frames());

        let total = AtomicUsize::new(0);
        assert!(wait_until(|| {
            total.fetch_add(engine.poll_subtitles().unwrap(), Ordering::SeqCst);
            total.load(Ordering::SeqCst) == 5
        }));

        let first = subtitles.next().unwrap();
        match first.payload {
            Payload::Subtitle(subtitle) => assert_eq!(subtitle.text, vec!["subtitle 0"]),
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(first.pts, Some(0.0));
    }

    #[test]
    fn completion_callback_can_stop_the_read_loop() {
        let media = SyntheticMedia::new().with_video(10, 30);
        let (events, rx) = Recorder::new(&media, true);
        let mut engine = open(&media, EngineConfig::default(), events);
        let (video, _) = consume(engine.video().unwrap().frames());

        assert!(wait_for(&rx, Event::Completed));
        assert!(wait_until(|| engine.state() == PlaybackState::Stopped));

        engine.close();
        video.join().unwrap();
    }

    #[test]
    fn close_unblocks_decoders_waiting_on_full_queues() {
        let media = SyntheticMedia::new().with_video(300, 30).with_audio(300, 48000, 1600);
        let (events, _rx) = Recorder::new(&media, false);
        let mut engine = open(&media, EngineConfig::default(), events);
        let frames = Arc::clone(engine.video().unwrap().frames());
        assert!(wait_until(|| frames.is_full()));

        let (tx, rx) = mpsc::channel();
        let closer = thread::spawn(move || {
            engine.close();
            let _ = tx.send(engine.state());
        });
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), PlaybackState::Stopped);
        closer.join().unwrap();
    }

    #[test]
    fn start_offset_seeks_before_reading() {
        let media = SyntheticMedia::new().with_video(300, 30);
        let (events, _rx) = Recorder::new(&media, false);
        let config = EngineConfig {
            start_time_ms: 2000,
            ..Default::default()
        };
        let engine = open(&media, config, events);
        let (video, seen) = consume(engine.video().unwrap().frames());

        assert!(wait_until(|| !seen.lock().is_empty()));
        let first = seen.lock()[0].1.unwrap();
        assert!((first - 2.0).abs() < 0.01, "started at {first}");
        drop(engine);
        video.join().unwrap();
    }

    #[test]
    fn play_duration_drops_late_packets() {
        let media = SyntheticMedia::new().with_video(300, 30);
        let (events, rx) = Recorder::new(&media, false);
        let config = EngineConfig {
            play_duration_ms: Some(1000),
            ..Default::default()
        };
        let engine = open(&media, config, events);
        let (video, seen) = consume(engine.video().unwrap().frames());

        assert!(wait_for(&rx, Event::Completed));
        let last = seen.lock().last().and_then(|(_, pts)| *pts).unwrap();
        assert!(last <= 1.0 + 1e-9, "last frame at {last}");
        assert_eq!(seen.lock().len(), 31);
        drop(engine);
        video.join().unwrap();
    }

    #[test]
    fn precise_start_offset_skips_to_target() {
        let media = SyntheticMedia::new().with_video_gop(300, 30, 30);
        let (events, _rx) = Recorder::new(&media, false);
        let config = EngineConfig {
            start_time_ms: 5500,
            precise_seek: true,
            ..Default::default()
        };
        let engine = open(&media, config, events);
        let (video, seen) = consume(engine.video().unwrap().frames());

        assert!(wait_until(|| !seen.lock().is_empty()));
        let first = seen.lock()[0].1.unwrap();
        assert!(first >= 5.49, "started at {first}");
        drop(engine);
        video.join().unwrap();
    }
}
