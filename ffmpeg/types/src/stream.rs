/*!
    Stream information types.
*/

use std::time::Duration;

use crate::{ChannelLayout, Packet, PixelFormat, Rational, SampleFormat};

/**
    The kind of elementary stream.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaType {
    Video,
    Audio,
    Subtitle,
    Data,
    Attachment,
}

impl MediaType {
    /**
        Short specifier letter used by stream specifiers (`v`, `a`, `s`, `d`, `t`).
    */
    pub const fn specifier(self) -> char {
        match self {
            Self::Video => 'v',
            Self::Audio => 'a',
            Self::Subtitle => 's',
            Self::Data => 'd',
            Self::Attachment => 't',
        }
    }
}

/**
    Stream disposition flags relevant to playback.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Disposition {
    /// Marked as the default stream of its kind.
    pub default: bool,
    /// Video stream carrying a single cover image rather than moving video.
    pub attached_pic: bool,
}

/**
    Codec parameters needed to open a decoder and configure filters.

    Fields that do not apply to the stream's media type are left at their
    default values.
*/
#[derive(Clone, Debug, Default)]
pub struct CodecParameters {
    /// Codec name as reported by the container (e.g. "h264", "aac").
    pub codec_name: String,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format, if known.
    pub pixel_format: Option<PixelFormat>,
    /// Sample aspect ratio (0/1 when unknown).
    pub sample_aspect_ratio: Rational,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of audio channels.
    pub channels: u16,
    /// Channel layout, if known.
    pub channel_layout: Option<ChannelLayout>,
    /// Sample format, if known.
    pub sample_format: Option<SampleFormat>,
    /// Codec extradata (SPS/PPS for H.264, AudioSpecificConfig for AAC, etc.).
    pub extradata: Option<Vec<u8>>,
    /// Bitrate in bits per second (if known).
    pub bitrate: Option<u64>,
}

/**
    Information about one stream of an opened container.
*/
#[derive(Clone, Debug)]
pub struct StreamInfo {
    /// Index of the stream inside the container.
    pub index: usize,
    /// Stream kind.
    pub media_type: MediaType,
    /// Time base for packet timestamps.
    pub time_base: Rational,
    /// First timestamp of the stream, in `time_base` units.
    pub start_time: Option<i64>,
    /// Total duration (may be unavailable for some streams).
    pub duration: Option<Duration>,
    /// Guessed frame rate for video streams.
    pub frame_rate: Option<Rational>,
    /// Program the stream belongs to, if the container has programs.
    pub program: Option<u32>,
    /// Disposition flags.
    pub disposition: Disposition,
    /// Codec parameters.
    pub codec: CodecParameters,
    /// Cover image packet for streams with the attached picture disposition.
    pub attached_pic: Option<Packet>,
}

impl StreamInfo {
    /**
        Create a stream description with default codec parameters.
    */
    pub fn new(index: usize, media_type: MediaType, time_base: Rational) -> Self {
        Self {
            index,
            media_type,
            time_base,
            start_time: None,
            duration: None,
            frame_rate: None,
            program: None,
            disposition: Disposition::default(),
            codec: CodecParameters::default(),
            attached_pic: None,
        }
    }

    /**
        Returns true if this stream carries a cover image.
    */
    pub fn has_attached_pic(&self) -> bool {
        self.media_type == MediaType::Video && self.disposition.attached_pic
    }

    /**
        Returns the aspect ratio as a float.
    */
    pub fn aspect_ratio(&self) -> f64 {
        if self.codec.height == 0 {
            return 0.0;
        }
        self.codec.width as f64 / self.codec.height as f64
    }

    /**
        Returns the frame rate as fps, if available.
    */
    pub fn fps(&self) -> Option<f64> {
        self.frame_rate.filter(|r| r.is_valid()).map(|r| r.to_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_stream() -> StreamInfo {
        let mut info = StreamInfo::new(0, MediaType::Video, Rational::new(1, 90000));
        info.codec.width = 1920;
        info.codec.height = 1080;
        info.frame_rate = Some(Rational::new(24000, 1001));
        info
    }

    #[test]
    fn stream_info_aspect_ratio() {
        let aspect = video_stream().aspect_ratio();
        assert!((aspect - 16.0 / 9.0).abs() < 0.01);
    }

    #[test]
    fn stream_info_fps() {
        let mut info = video_stream();
        info.frame_rate = Some(Rational::new(30, 1));
        assert_eq!(info.fps(), Some(30.0));
        info.frame_rate = Some(Rational::new(0, 1));
        assert_eq!(info.fps(), None);
    }

    #[test]
    fn attached_pic_only_for_video() {
        let mut info = video_stream();
        assert!(!info.has_attached_pic());
        info.disposition.attached_pic = true;
        assert!(info.has_attached_pic());
        info.media_type = MediaType::Audio;
        assert!(!info.has_attached_pic());
    }

    #[test]
    fn specifier_letters() {
        assert_eq!(MediaType::Video.specifier(), 'v');
        assert_eq!(MediaType::Audio.specifier(), 'a');
        assert_eq!(MediaType::Subtitle.specifier(), 's');
    }
}
