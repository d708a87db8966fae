/*!
    Capability traits the engine is generic over.

    A backend supplies three factories: one that opens containers, one that
    opens decoders for a stream, and one that builds filter graphs. The engine
    never talks to a media library directly.
*/

use std::sync::Arc;

use ffmpeg_types::{
    AudioFormat, MediaType, Packet, Rational, RawFrame, Result, StreamInfo, Subtitle, VideoFormat,
};

use crate::error::Error;

/**
    The three stream kinds the engine plays.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

impl StreamKind {
    pub const fn media_type(self) -> MediaType {
        match self {
            Self::Video => MediaType::Video,
            Self::Audio => MediaType::Audio,
            Self::Subtitle => MediaType::Subtitle,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
        }
    }
}

/**
    Flags describing a seek request.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeekFlags {
    /// Target and window are byte offsets instead of microseconds.
    pub byte: bool,
}

/**
    A seek as handed to a container.

    `target` is the position the container should land on; the container may
    land anywhere in `min..=max`. Units are microseconds, or bytes when
    `flags.byte` is set.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeekRequest {
    pub target: i64,
    pub min: i64,
    pub max: i64,
    pub flags: SeekFlags,
}

/**
    Result of one container read.
*/
#[derive(Debug)]
pub enum ReadOutcome {
    Packet(Packet),
    /// No more packets until the next seek.
    EndOfStream,
    /// Nothing available right now; try again.
    Retry,
}

/**
    An opened container.
*/
pub trait Container: Send {
    fn streams(&self) -> &[StreamInfo];

    /// Container start time in microseconds.
    fn start_time(&self) -> Option<i64> {
        None
    }

    fn read_packet(&mut self) -> Result<ReadOutcome>;

    fn seek(&mut self, request: &SeekRequest) -> Result<()>;

    /// Network containers pause their transport here.
    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    /// False for formats that only support byte or frame seeking. The audio
    /// decoder then predicts timestamps from the stream start time.
    fn seeks_by_timestamp(&self) -> bool {
        true
    }
}

pub trait ContainerOpener: Send + Sync {
    fn open(&self, uri: &str) -> Result<Box<dyn Container>>;
}

/**
    One item produced by a decode engine.
*/
#[derive(Debug)]
pub enum Decoded {
    Frame(RawFrame),
    Subtitle(Subtitle),
}

/**
    Output of one [`Codec::decode`] call.
*/
#[derive(Debug, Default)]
pub struct DecodeOutput {
    pub items: Vec<Decoded>,
    /// Bytes of the packet the engine consumed. Only audio decoders may
    /// consume less than the whole packet.
    pub consumed: usize,
}

/**
    A decode engine for one stream.

    A null packet asks the engine to drain buffered frames. Returning
    [`ffmpeg_types::Error::InvalidData`] marks the packet as bad and playback
    carries on; any other error stops the stream.
*/
pub trait Codec: Send {
    fn decode(&mut self, packet: &Packet) -> Result<DecodeOutput>;

    /// Drop all buffered state, as after a seek.
    fn flush(&mut self);
}

pub trait CodecFactory: Send + Sync {
    fn open(&self, stream: &StreamInfo) -> Result<Box<dyn Codec>>;
}

/**
    Description of the frames fed into a filter graph.
*/
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FilterSource {
    Audio {
        format: AudioFormat,
        time_base: Rational,
    },
    Video {
        format: VideoFormat,
        time_base: Rational,
        frame_rate: Option<Rational>,
    },
}

/**
    Result of pulling from a filter graph.
*/
#[derive(Debug)]
pub enum Pull {
    Frame(RawFrame),
    WouldBlock,
    EndOfStream,
}

pub trait FilterGraph: Send {
    fn push(&mut self, frame: RawFrame) -> Result<()>;

    fn pull(&mut self) -> Result<Pull>;

    /// Time base of frames returned by [`pull`](Self::pull).
    fn time_base(&self) -> Rational;

    fn frame_rate(&self) -> Option<Rational> {
        None
    }
}

pub trait FilterFactory: Send + Sync {
    fn build(
        &self,
        source: &FilterSource,
        description: Option<&str>,
    ) -> Result<Box<dyn FilterGraph>>;
}

/**
    Streams chosen at open time.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Prepared {
    pub video: Option<usize>,
    pub audio: Option<usize>,
    pub subtitle: Option<usize>,
}

/**
    Callbacks from the engine threads.

    Callbacks run on the read loop or decode threads and must not block.
*/
pub trait EventSink: Send + Sync {
    fn on_prepared(&self, _prepared: &Prepared) {}

    /// Fires once per applied seek, whether or not the container seek succeeded.
    fn on_seek_completed(&self, _flags: SeekFlags) {}

    /// Fires once when every stream has drained. Return true to stop the read loop.
    fn on_playback_completed(&self) -> bool {
        false
    }

    fn on_error(&self, _kind: Option<StreamKind>, _error: &Error) {}
}

/**
    Event sink that ignores everything.
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct NoEvents;

impl EventSink for NoEvents {}

/**
    Everything the engine needs from a media backend.
*/
#[derive(Clone)]
pub struct Capabilities {
    pub containers: Arc<dyn ContainerOpener>,
    pub codecs: Arc<dyn CodecFactory>,
    pub filters: Arc<dyn FilterFactory>,
}
