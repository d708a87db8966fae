/*!
    Demux, decode and synchronize engine for media playback.

    The engine opens a container, picks one audio, video and subtitle stream,
    and runs a read loop thread plus one decode thread per audio/video stream.
    Decoded frames land in bounded [`FrameQueue`]s that a renderer or audio
    device drains.

    Containers, codecs and filter graphs are supplied through the traits in
    [`capability`]. The `ffmpeg` feature provides implementations backed by
    `ffmpeg-next`; [`synthetic`] provides an in-memory backend.
*/

pub mod capability;
pub mod config;
mod control;
pub mod decode;
pub mod demux;
mod engine;
mod error;
pub mod filter;
pub mod playback;
pub mod synthetic;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

pub use capability::{
    Capabilities, Codec, CodecFactory, Container, ContainerOpener, Decoded, DecodeOutput,
    EventSink, FilterFactory, FilterGraph, FilterSource, NoEvents, Prepared, Pull, ReadOutcome,
    SeekFlags, SeekRequest, StreamKind,
};
pub use config::EngineConfig;
pub use decode::{Aborted, DecodeResult, Decoder, DecoderState, FlushMarker, PacketQueue};
pub use engine::{Engine, PlaybackState, StreamHandle};
pub use error::{Error, Result};
pub use playback::{Frame, FrameQueue, Payload};

pub use ffmpeg_types;
