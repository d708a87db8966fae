/*!
    Decoded frame types.
*/

use std::any::Any;
use std::fmt;

use crate::{ChannelLayout, PixelFormat, Rational, SampleFormat};

/**
    Opaque decoded payload.

    Decode engines store whatever they natively produce here (a native frame
    handle, or plain bytes) so it can travel from decoder to filter graph to
    consumer without copies. Consumers downcast to the type their engine uses.
*/
pub struct FrameData(Box<dyn Any + Send>);

impl FrameData {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.0.downcast_mut()
    }

    /**
        Take the payload out, or give it back unchanged if the type is wrong.
    */
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        self.0.downcast::<T>().map(|b| *b).map_err(Self)
    }
}

impl fmt::Debug for FrameData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameData").finish_non_exhaustive()
    }
}

/**
    Picture layout of a decoded video frame.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Sample aspect ratio (0/1 when unknown).
    pub sample_aspect_ratio: Rational,
}

/**
    Sample layout of a decoded audio frame.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub channel_layout: Option<ChannelLayout>,
    pub sample_format: SampleFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Video(VideoFormat),
    Audio(AudioFormat),
}

/**
    A frame as produced by a decode engine or filter graph.

    `pts` is expressed in the time base of whoever produced the frame: the
    stream time base for decoder output, the sink time base for filter output.
*/
#[derive(Debug)]
pub struct RawFrame {
    pub format: FrameFormat,
    /// Presentation timestamp, if the producer knows it.
    pub pts: Option<i64>,
    /// Decode timestamp of the packet the frame came from.
    pub pkt_dts: Option<i64>,
    /// Byte offset of the source packet.
    pub pos: Option<i64>,
    /// Number of samples per channel (audio only).
    pub nb_samples: usize,
    /// Decoded payload.
    pub data: FrameData,
}

impl RawFrame {
    pub fn video(format: VideoFormat, pts: Option<i64>, data: FrameData) -> Self {
        Self {
            format: FrameFormat::Video(format),
            pts,
            pkt_dts: None,
            pos: None,
            nb_samples: 0,
            data,
        }
    }

    pub fn audio(format: AudioFormat, nb_samples: usize, pts: Option<i64>, data: FrameData) -> Self {
        Self {
            format: FrameFormat::Audio(format),
            pts,
            pkt_dts: None,
            pos: None,
            nb_samples,
            data,
        }
    }

    pub fn video_format(&self) -> Option<&VideoFormat> {
        match &self.format {
            FrameFormat::Video(format) => Some(format),
            FrameFormat::Audio(_) => None,
        }
    }

    pub fn audio_format(&self) -> Option<&AudioFormat> {
        match &self.format {
            FrameFormat::Audio(format) => Some(format),
            FrameFormat::Video(_) => None,
        }
    }
}

/**
    A decoded subtitle event.
*/
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subtitle {
    /// Presentation timestamp in microseconds.
    pub pts: Option<i64>,
    /// Display start relative to `pts`, in milliseconds.
    pub start_display_ms: u32,
    /// Display end relative to `pts`, in milliseconds.
    pub end_display_ms: u32,
    /// Text of each subtitle rectangle.
    pub text: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_data_downcast() {
        let data = FrameData::new(vec![1u8, 2, 3]);
        assert!(data.is::<Vec<u8>>());
        assert_eq!(data.downcast_ref::<Vec<u8>>().map(Vec::len), Some(3));

        let data = match data.downcast::<String>() {
            Ok(_) => panic!("wrong type accepted"),
            Err(data) => data,
        };
        assert_eq!(data.downcast::<Vec<u8>>().ok(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn raw_frame_format_accessors() {
        let format = AudioFormat {
            sample_rate: 48000,
            channels: 2,
            channel_layout: Some(ChannelLayout::Stereo),
            sample_format: SampleFormat::F32,
        };
        let frame = RawFrame::audio(format, 1024, Some(0), FrameData::new(()));
        assert_eq!(frame.audio_format(), Some(&format));
        assert!(frame.video_format().is_none());
    }
}
