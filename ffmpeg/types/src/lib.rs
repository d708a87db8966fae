/*!
    Shared types for the ffmpeg crate ecosystem.

    These are the types that cross crate boundaries: packets, stream
    descriptions, decoded frames and the shared error type. The crate has no
    dependency on FFmpeg, so capability implementations and tests can use it
    without pulling in FFmpeg bindings.
*/

mod error;
mod format;
mod frame;
mod packet;
mod rational;
mod stream;

pub use error::{Error, Result};
pub use format::{ChannelLayout, PixelFormat, SampleFormat};
pub use frame::{AudioFormat, FrameData, FrameFormat, RawFrame, Subtitle, VideoFormat};
pub use packet::Packet;
pub use rational::{Rational, TIME_BASE_MICROS};
pub use stream::{CodecParameters, Disposition, MediaType, StreamInfo};
