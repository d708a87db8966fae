/*!
    In-memory media backend.

    Generates evenly spaced audio, video and subtitle packets, decodes each
    packet into one frame, and passes frames through filters unchanged. Every
    container call is recorded so callers can check what the engine did.

    ```ignore
    let media = SyntheticMedia::new().with_video(300, 30).with_audio(300, 48000, 1600);
    let engine = Engine::open("synthetic", media.capabilities(), config, events)?;
    ```
*/

use std::collections::VecDeque;
use std::sync::Arc;

use ffmpeg_types::{
    AudioFormat, ChannelLayout, Error, FrameData, FrameFormat, MediaType, Packet, PixelFormat,
    Rational, RawFrame, Result, SampleFormat, StreamInfo, Subtitle, VideoFormat,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::capability::{
    Capabilities, Codec, CodecFactory, Container, ContainerOpener, Decoded, DecodeOutput,
    FilterFactory, FilterGraph, FilterSource, Pull, ReadOutcome, SeekRequest,
};

/// First payload byte of a packet the synthetic codec rejects as corrupt.
pub const CORRUPT_MARKER: u8 = 0xFF;

const DEFAULT_PACKET_SIZE: usize = 512;

/**
    Something the synthetic container or codec was asked to do.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyntheticEvent {
    Opened(String),
    Read { stream: usize, pts: Option<i64> },
    EndOfStream,
    Seek(SeekRequest),
    Pause,
    Resume,
    CodecFlush(usize),
    Note(String),
}

pub type SyntheticLog = Arc<Mutex<Vec<SyntheticEvent>>>;

#[derive(Clone, Debug)]
struct Track {
    info: StreamInfo,
    packets: Vec<Packet>,
}

/**
    Description of a synthetic source. Cloning shares the event log.
*/
#[derive(Clone, Debug)]
pub struct SyntheticMedia {
    tracks: Vec<Track>,
    packet_size: usize,
    fail_read_at: Option<usize>,
    log: SyntheticLog,
}

impl Default for SyntheticMedia {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticMedia {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            packet_size: DEFAULT_PACKET_SIZE,
            fail_read_at: None,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /**
        Add a 320x240 video stream of `frames` frames at `fps`, every frame a
        keyframe.
    */
    pub fn with_video(self, frames: usize, fps: i32) -> Self {
        self.with_video_gop(frames, fps, 1)
    }

    /**
        Add a video stream with a keyframe every `gop` frames.
    */
    pub fn with_video_gop(mut self, frames: usize, fps: i32, gop: usize) -> Self {
        let index = self.tracks.len();
        let mut info = StreamInfo::new(index, MediaType::Video, Rational::new(1, fps));
        info.start_time = Some(0);
        info.frame_rate = Some(Rational::new(fps, 1));
        info.codec.codec_name = "synthetic_video".into();
        info.codec.width = 320;
        info.codec.height = 240;
        info.codec.pixel_format = Some(PixelFormat::Yuv420p);
        info.codec.sample_aspect_ratio = Rational::new(1, 1);
        let packets = (0..frames)
            .map(|frame| {
                let pts = frame as i64;
                let mut packet = Packet::new(index, self.payload(), Some(pts), Some(pts));
                packet.duration = 1;
                packet.keyframe = frame % gop.max(1) == 0;
                packet
            })
            .collect();
        self.tracks.push(Track { info, packets });
        self
    }

    /**
        Add a stereo f32 audio stream of `packets` packets, each holding
        `samples_per_packet` samples.
    */
    pub fn with_audio(
        mut self,
        packets: usize,
        sample_rate: u32,
        samples_per_packet: usize,
    ) -> Self {
        let index = self.tracks.len();
        let rate = i32::try_from(sample_rate).unwrap_or(48000);
        let mut info = StreamInfo::new(index, MediaType::Audio, Rational::new(1, rate));
        info.start_time = Some(0);
        info.codec.codec_name = "synthetic_audio".into();
        info.codec.sample_rate = sample_rate;
        info.codec.channels = 2;
        info.codec.channel_layout = Some(ChannelLayout::Stereo);
        info.codec.sample_format = Some(SampleFormat::F32);
        let packets = (0..packets)
            .map(|packet| {
                let pts = (packet * samples_per_packet) as i64;
                let mut packet = Packet::new(index, self.payload(), Some(pts), Some(pts));
                packet.duration = samples_per_packet as i64;
                packet.keyframe = true;
                packet
            })
            .collect();
        self.tracks.push(Track { info, packets });
        self
    }

    /**
        Add a subtitle stream with one event every `interval_ms`.
    */
    pub fn with_subtitles(mut self, count: usize, interval_ms: i64) -> Self {
        let index = self.tracks.len();
        let mut info = StreamInfo::new(index, MediaType::Subtitle, Rational::new(1, 1000));
        info.codec.codec_name = "synthetic_text".into();
        let packets = (0..count)
            .map(|event| {
                let pts = event as i64 * interval_ms;
                let text = format!("subtitle {event}").into_bytes();
                let mut packet = Packet::new(index, text, Some(pts), Some(pts));
                packet.duration = interval_ms;
                packet.keyframe = true;
                packet
            })
            .collect();
        self.tracks.push(Track { info, packets });
        self
    }

    /**
        Add a video stream that only carries a cover image.
    */
    pub fn with_attached_picture(mut self) -> Self {
        let index = self.tracks.len();
        let mut info = StreamInfo::new(index, MediaType::Video, Rational::new(1, 90000));
        info.codec.codec_name = "synthetic_video".into();
        info.codec.width = 600;
        info.codec.height = 600;
        info.codec.pixel_format = Some(PixelFormat::Rgb24);
        info.disposition.attached_pic = true;
        let mut picture = Packet::new(index, self.payload(), Some(0), Some(0));
        picture.keyframe = true;
        info.attached_pic = Some(picture);
        self.tracks.push(Track {
            info,
            packets: Vec::new(),
        });
        self
    }

    /**
        Payload size of packets added after this call.
    */
    pub fn with_packet_size(mut self, bytes: usize) -> Self {
        self.packet_size = bytes.max(1);
        self
    }

    /**
        Rename the codec of stream `index`. Codec names starting with
        `unsupported` fail to open.
    */
    pub fn with_codec_name(mut self, index: usize, name: &str) -> Self {
        if let Some(track) = self.tracks.get_mut(index) {
            track.info.codec.codec_name = name.into();
        }
        self
    }

    /**
        Replace the payload of one packet so the codec rejects it.
    */
    pub fn with_corrupt_packet(mut self, stream: usize, packet: usize) -> Self {
        if let Some(packet) = self
            .tracks
            .get_mut(stream)
            .and_then(|track| track.packets.get_mut(packet))
        {
            packet.data[0] = CORRUPT_MARKER;
        }
        self
    }

    /**
        Make the `read`-th container read (0-based, across all streams) fail
        with an i/o error.
    */
    pub fn failing_read_at(mut self, read: usize) -> Self {
        self.fail_read_at = Some(read);
        self
    }

    fn payload(&self) -> Vec<u8> {
        vec![0x42; self.packet_size]
    }

    pub fn streams(&self) -> Vec<StreamInfo> {
        self.tracks.iter().map(|track| track.info.clone()).collect()
    }

    pub fn log(&self) -> &SyntheticLog {
        &self.log
    }

    pub fn events(&self) -> Vec<SyntheticEvent> {
        self.log.lock().clone()
    }

    pub fn note(&self, text: impl Into<String>) {
        self.log.lock().push(SyntheticEvent::Note(text.into()));
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            containers: Arc::new(SyntheticOpener {
                media: self.clone(),
            }),
            codecs: Arc::new(SyntheticCodecs {
                log: Arc::clone(&self.log),
            }),
            filters: Arc::new(PassthroughFilters),
        }
    }
}

struct SyntheticOpener {
    media: SyntheticMedia,
}

impl ContainerOpener for SyntheticOpener {
    fn open(&self, uri: &str) -> Result<Box<dyn Container>> {
        let media = &self.media;
        let mut timed: Vec<(i64, Packet)> = media
            .tracks
            .iter()
            .flat_map(|track| {
                let time_base = track.info.time_base;
                track.packets.iter().map(move |packet| {
                    let micros = time_base.rescale(packet.pts.unwrap_or(0), Rational::micros());
                    (micros, packet.clone())
                })
            })
            .collect();
        timed.sort_by_key(|(micros, packet)| (*micros, packet.stream_index));

        let mut offset = 0;
        let mut times = Vec::with_capacity(timed.len());
        let mut packets = Vec::with_capacity(timed.len());
        for (micros, mut packet) in timed {
            packet.pos = Some(offset);
            offset += packet.size() as i64;
            times.push(micros);
            packets.push(packet);
        }

        media.log.lock().push(SyntheticEvent::Opened(uri.to_string()));
        debug!(uri, packets = packets.len(), "opened synthetic container");
        Ok(Box::new(SyntheticContainer {
            streams: media.streams(),
            packets,
            times,
            cursor: 0,
            reads: 0,
            at_end: false,
            fail_read_at: media.fail_read_at,
            log: Arc::clone(&media.log),
        }))
    }
}

struct SyntheticContainer {
    streams: Vec<StreamInfo>,
    packets: Vec<Packet>,
    /// Packet times in microseconds.
    times: Vec<i64>,
    cursor: usize,
    reads: usize,
    at_end: bool,
    fail_read_at: Option<usize>,
    log: SyntheticLog,
}

impl SyntheticContainer {
    fn landing_time(&self, target: i64, min: i64) -> i64 {
        let video = self
            .streams
            .iter()
            .find(|stream| stream.media_type == MediaType::Video && !stream.has_attached_pic())
            .map(|stream| stream.index);
        let Some(video) = video else {
            return target;
        };
        let keyframe = self
            .packets
            .iter()
            .zip(&self.times)
            .filter(|(packet, time)| {
                packet.stream_index == video && packet.keyframe && **time <= target
            })
            .map(|(_, time)| *time)
            .last();
        keyframe.unwrap_or(target).max(min)
    }
}

impl Container for SyntheticContainer {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<ReadOutcome> {
        if self.fail_read_at == Some(self.reads) {
            return Err(Error::Io(std::io::Error::other("injected read failure")));
        }
        let Some(packet) = self.packets.get(self.cursor) else {
            if !self.at_end {
                self.at_end = true;
                self.log.lock().push(SyntheticEvent::EndOfStream);
            }
            return Ok(ReadOutcome::EndOfStream);
        };
        self.cursor += 1;
        self.reads += 1;
        self.log.lock().push(SyntheticEvent::Read {
            stream: packet.stream_index,
            pts: packet.pts,
        });
        Ok(ReadOutcome::Packet(packet.clone()))
    }

    fn seek(&mut self, request: &SeekRequest) -> Result<()> {
        self.log.lock().push(SyntheticEvent::Seek(*request));
        let target = request.target.clamp(request.min, request.max);
        self.cursor = if request.flags.byte {
            self.packets
                .iter()
                .position(|packet| packet.pos.unwrap_or(0) >= target)
                .unwrap_or(self.packets.len())
        } else {
            let landing = self.landing_time(target, request.min);
            self.times
                .iter()
                .position(|time| *time >= landing)
                .unwrap_or(self.packets.len())
        };
        self.at_end = false;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.log.lock().push(SyntheticEvent::Pause);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.log.lock().push(SyntheticEvent::Resume);
        Ok(())
    }
}

struct SyntheticCodecs {
    log: SyntheticLog,
}

impl CodecFactory for SyntheticCodecs {
    fn open(&self, stream: &StreamInfo) -> Result<Box<dyn Codec>> {
        if stream.codec.codec_name.starts_with("unsupported") {
            return Err(Error::unsupported_format(stream.codec.codec_name.clone()));
        }
        Ok(Box::new(SyntheticCodec {
            stream: stream.clone(),
            log: Arc::clone(&self.log),
        }))
    }
}

/**
    Decodes every packet into exactly one frame carrying the payload length.
*/
struct SyntheticCodec {
    stream: StreamInfo,
    log: SyntheticLog,
}

impl SyntheticCodec {
    fn frame(&self, packet: &Packet) -> Decoded {
        let codec = &self.stream.codec;
        let data = FrameData::new(packet.size());
        match self.stream.media_type {
            MediaType::Audio => {
                let format = AudioFormat {
                    sample_rate: codec.sample_rate,
                    channels: codec.channels,
                    channel_layout: codec.channel_layout,
                    sample_format: codec.sample_format.unwrap_or(SampleFormat::F32),
                };
                let samples = usize::try_from(packet.duration).unwrap_or(0);
                let mut frame = RawFrame::audio(format, samples, None, data);
                frame.pos = packet.pos;
                Decoded::Frame(frame)
            }
            MediaType::Subtitle => Decoded::Subtitle(Subtitle {
                pts: packet
                    .pts
                    .map(|pts| self.stream.time_base.rescale(pts, Rational::micros())),
                start_display_ms: 0,
                end_display_ms: u32::try_from(packet.duration).unwrap_or(0),
                text: vec![String::from_utf8_lossy(&packet.data).into_owned()],
            }),
            _ => {
                let format = VideoFormat {
                    width: codec.width,
                    height: codec.height,
                    pixel_format: codec.pixel_format.unwrap_or(PixelFormat::Yuv420p),
                    sample_aspect_ratio: codec.sample_aspect_ratio,
                };
                let mut frame = RawFrame::video(format, packet.pts, data);
                frame.pkt_dts = packet.dts;
                frame.pos = packet.pos;
                Decoded::Frame(frame)
            }
        }
    }
}

impl Codec for SyntheticCodec {
    fn decode(&mut self, packet: &Packet) -> Result<DecodeOutput> {
        if packet.is_null() {
            return Ok(DecodeOutput::default());
        }
        if packet.data[0] == CORRUPT_MARKER {
            return Err(Error::invalid_data("corrupt synthetic packet"));
        }
        Ok(DecodeOutput {
            items: vec![self.frame(packet)],
            consumed: packet.size(),
        })
    }

    fn flush(&mut self) {
        self.log.lock().push(SyntheticEvent::CodecFlush(self.stream.index));
    }
}

/**
    Filter factory whose graphs return their input unchanged.
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughFilters;

impl FilterFactory for PassthroughFilters {
    fn build(
        &self,
        source: &FilterSource,
        _description: Option<&str>,
    ) -> Result<Box<dyn FilterGraph>> {
        Ok(Box::new(PassthroughGraph::new(source)))
    }
}

/**
    Filter factory whose graphs emit every frame twice and release at most
    one frame per drain, so output trails input like a buffering filter.
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoFilters;

impl FilterFactory for EchoFilters {
    fn build(
        &self,
        source: &FilterSource,
        _description: Option<&str>,
    ) -> Result<Box<dyn FilterGraph>> {
        Ok(Box::new(EchoGraph {
            inner: PassthroughGraph::new(source),
            blocked: false,
        }))
    }
}

struct PassthroughGraph {
    frames: VecDeque<RawFrame>,
    time_base: Rational,
    frame_rate: Option<Rational>,
}

impl PassthroughGraph {
    fn new(source: &FilterSource) -> Self {
        let (time_base, frame_rate) = match *source {
            FilterSource::Audio { time_base, .. } => (time_base, None),
            FilterSource::Video {
                time_base,
                frame_rate,
                ..
            } => (time_base, frame_rate),
        };
        Self {
            frames: VecDeque::new(),
            time_base,
            frame_rate,
        }
    }
}

impl FilterGraph for PassthroughGraph {
    fn push(&mut self, frame: RawFrame) -> Result<()> {
        if matches!(frame.format, FrameFormat::Video(format) if format.width == 0) {
            return Err(Error::filter("empty picture"));
        }
        self.frames.push_back(frame);
        Ok(())
    }

    fn pull(&mut self) -> Result<Pull> {
        Ok(match self.frames.pop_front() {
            Some(frame) => Pull::Frame(frame),
            None => Pull::WouldBlock,
        })
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn frame_rate(&self) -> Option<Rational> {
        self.frame_rate
    }
}

struct EchoGraph {
    inner: PassthroughGraph,
    blocked: bool,
}

impl FilterGraph for EchoGraph {
    fn push(&mut self, frame: RawFrame) -> Result<()> {
        let echo = RawFrame {
            format: frame.format,
            pts: frame.pts,
            pkt_dts: frame.pkt_dts,
            pos: frame.pos,
            nb_samples: frame.nb_samples,
            data: FrameData::new(()),
        };
        self.inner.push(frame)?;
        self.inner.push(echo)
    }

    fn pull(&mut self) -> Result<Pull> {
        if self.blocked {
            self.blocked = false;
            return Ok(Pull::WouldBlock);
        }
        let pulled = self.inner.pull()?;
        self.blocked = matches!(pulled, Pull::Frame(_));
        Ok(pulled)
    }

    fn time_base(&self) -> Rational {
        self.inner.time_base()
    }

    fn frame_rate(&self) -> Option<Rational> {
        self.inner.frame_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::SeekFlags;

    fn read_all(container: &mut dyn Container) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Ok(ReadOutcome::Packet(packet)) = container.read_packet() {
            packets.push(packet);
        }
        packets
    }

    fn time_seek(target: i64) -> SeekRequest {
        SeekRequest {
            target,
            min: i64::MIN,
            max: i64::MAX,
            flags: SeekFlags::default(),
        }
    }

    #[test]
    fn packets_are_interleaved_by_time() {
        let media = SyntheticMedia::new().with_video(3, 10).with_audio(3, 1000, 100);
        let mut container = media.capabilities().containers.open("test").unwrap();
        let order: Vec<(usize, Option<i64>)> = read_all(container.as_mut())
            .iter()
            .map(|packet| (packet.stream_index, packet.pts))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, Some(0)),
                (1, Some(0)),
                (0, Some(1)),
                (1, Some(100)),
                (0, Some(2)),
                (1, Some(200)),
            ]
        );
        assert_eq!(media.events().last(), Some(&SyntheticEvent::EndOfStream));
    }

    #[test]
    fn seek_lands_on_previous_keyframe() {
        let media = SyntheticMedia::new().with_video_gop(50, 10, 10);
        let mut container = media.capabilities().containers.open("test").unwrap();
        container.seek(&time_seek(2_500_000)).unwrap();
        let packets = read_all(container.as_mut());
        assert_eq!(packets[0].pts, Some(20));
    }

    #[test]
    fn seek_window_minimum_is_respected() {
        let media = SyntheticMedia::new().with_video_gop(50, 10, 10);
        let mut container = media.capabilities().containers.open("test").unwrap();
        let mut request = time_seek(2_500_000);
        request.min = 2_300_000;
        container.seek(&request).unwrap();
        let packets = read_all(container.as_mut());
        assert_eq!(packets[0].pts, Some(23));
    }

    #[test]
    fn byte_seek_uses_positions() {
        let media = SyntheticMedia::new().with_packet_size(100).with_video(10, 10);
        let mut container = media.capabilities().containers.open("test").unwrap();
        container
            .seek(&SeekRequest {
                target: 450,
                min: i64::MIN,
                max: i64::MAX,
                flags: SeekFlags { byte: true },
            })
            .unwrap();
        let packets = read_all(container.as_mut());
        assert_eq!(packets[0].pos, Some(500));
    }

    #[test]
    fn injected_read_failure() {
        let media = SyntheticMedia::new().with_video(10, 10).failing_read_at(2);
        let mut container = media.capabilities().containers.open("test").unwrap();
        assert_eq!(read_all(container.as_mut()).len(), 2);
        assert!(container.read_packet().is_err());
    }

    #[test]
    fn codec_produces_one_frame_per_packet() {
        let media = SyntheticMedia::new().with_audio(1, 48000, 960);
        let stream = media.streams().remove(0);
        let mut codec = media.capabilities().codecs.open(&stream).unwrap();
        let mut packet = Packet::new(0, vec![1; 16], Some(960), Some(960));
        packet.duration = 960;
        let output = codec.decode(&packet).unwrap();
        assert_eq!(output.consumed, 16);
        match &output.items[..] {
            [Decoded::Frame(frame)] => assert_eq!(frame.nb_samples, 960),
            other => panic!("unexpected output {other:?}"),
        }
        assert!(codec.decode(&Packet::null(0)).unwrap().items.is_empty());
    }

    #[test]
    fn unsupported_codec_fails_to_open() {
        let media = SyntheticMedia::new()
            .with_video(1, 10)
            .with_codec_name(0, "unsupported_h266");
        let stream = media.streams().remove(0);
        assert!(media.capabilities().codecs.open(&stream).is_err());
    }
}
