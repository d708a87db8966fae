/*!
    Filter graphs built with libavfilter.
*/

use ffmpeg_next::{ffi, filter, frame};
use tracing::debug;

use ffmpeg_types::{Error, FrameData, RawFrame, Rational, Result};

use super::convert::{pixel_format_to_ffmpeg, rational_from_ffmpeg, sample_format_to_ffmpeg};
use super::decode::{wrap_audio, wrap_video};
use crate::capability::{FilterFactory, FilterGraph, FilterSource, Pull};

fn filter_error(e: ffmpeg_next::Error) -> Error {
    Error::filter(e.to_string())
}

/**
    Builds `buffer -> description -> buffersink` graphs, or their audio
    counterparts. Without a description the graph passes frames through.
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegFilters;

impl FilterFactory for FfmpegFilters {
    fn build(
        &self,
        source: &FilterSource,
        description: Option<&str>,
    ) -> Result<Box<dyn FilterGraph>> {
        let (kind, args) = match *source {
            FilterSource::Video {
                format,
                time_base,
                frame_rate,
            } => {
                let pixel = pixel_format_to_ffmpeg(format.pixel_format).ok_or_else(|| {
                    Error::unsupported_format(format!("{:?}", format.pixel_format))
                })?;
                let sar = if format.sample_aspect_ratio.is_valid() {
                    format.sample_aspect_ratio
                } else {
                    Rational::new(0, 1)
                };
                let mut args = format!(
                    "video_size={}x{}:pix_fmt={}:time_base={}/{}:pixel_aspect={}/{}",
                    format.width,
                    format.height,
                    ffi::AVPixelFormat::from(pixel) as i32,
                    time_base.num,
                    time_base.den,
                    sar.num,
                    sar.den,
                );
                if let Some(rate) = frame_rate.filter(|rate| rate.is_valid()) {
                    args.push_str(&format!(":frame_rate={}/{}", rate.num, rate.den));
                }
                (Kind::Video, args)
            }
            FilterSource::Audio { format, time_base } => {
                let sample = sample_format_to_ffmpeg(format.sample_format).ok_or_else(|| {
                    Error::unsupported_format(format!("{:?}", format.sample_format))
                })?;
                let args = format!(
                    "time_base={}/{}:sample_rate={}:sample_fmt={}:channels={}",
                    time_base.num,
                    time_base.den,
                    format.sample_rate,
                    sample.name(),
                    format.channels,
                );
                (Kind::Audio, args)
            }
        };

        let (buffer, buffersink, passthrough) = match kind {
            Kind::Video => ("buffer", "buffersink", "null"),
            Kind::Audio => ("abuffer", "abuffersink", "anull"),
        };
        let description = description.unwrap_or(passthrough);

        let mut graph = filter::Graph::new();
        let input =
            filter::find(buffer).ok_or_else(|| Error::filter(format!("no {buffer} filter")))?;
        let output = filter::find(buffersink)
            .ok_or_else(|| Error::filter(format!("no {buffersink} filter")))?;
        graph.add(&input, "in", &args).map_err(filter_error)?;
        graph.add(&output, "out", "").map_err(filter_error)?;
        graph
            .output("in", 0)
            .and_then(|parser| parser.input("out", 0))
            .and_then(|parser| parser.parse(description))
            .map_err(filter_error)?;
        graph.validate().map_err(filter_error)?;

        let (time_base, frame_rate) = {
            let sink = graph
                .get("out")
                .ok_or_else(|| Error::filter("filter graph lost its sink"))?;
            // SAFETY: the sink context is configured once the graph validates.
            unsafe {
                let ctx = sink.as_ptr();
                let time_base = ffi::av_buffersink_get_time_base(ctx);
                let frame_rate = ffi::av_buffersink_get_frame_rate(ctx);
                (
                    rational_from_ffmpeg(time_base.into()),
                    rational_from_ffmpeg(frame_rate.into()),
                )
            }
        };

        debug!(description, args = %args, %time_base, "libavfilter graph configured");
        Ok(Box::new(FfmpegGraph {
            graph,
            kind,
            time_base,
            frame_rate: frame_rate.is_valid().then_some(frame_rate),
            last_pos: None,
        }))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Video,
    Audio,
}

struct FfmpegGraph {
    graph: filter::Graph,
    kind: Kind,
    time_base: Rational,
    frame_rate: Option<Rational>,
    /// Byte position of the last pushed frame, carried onto what comes out.
    last_pos: Option<i64>,
}

impl FfmpegGraph {
    fn context(&mut self, name: &str) -> Result<filter::Context<'_>> {
        self.graph
            .get(name)
            .ok_or_else(|| Error::filter(format!("filter graph has no {name} context")))
    }
}

impl FilterGraph for FfmpegGraph {
    fn push(&mut self, frame: RawFrame) -> Result<()> {
        self.last_pos = frame.pos;
        let pts = frame.pts;
        let mut source = self.context("in")?;
        let mut source = source.source();
        let added = match native_frame(frame.data)? {
            Native::Video(mut video) => {
                video.set_pts(pts);
                source.add(&video)
            }
            Native::Audio(mut audio) => {
                audio.set_pts(pts);
                source.add(&audio)
            }
        };
        added.map_err(filter_error)
    }

    fn pull(&mut self) -> Result<Pull> {
        let pos = self.last_pos;
        let kind = self.kind;
        let mut context = self.context("out")?;
        let mut sink = context.sink();
        let pulled = match kind {
            Kind::Video => {
                let mut native = frame::Video::empty();
                sink.frame(&mut native).map(|()| {
                    let pts = native.pts();
                    wrap_video(native, pts, pos)
                })
            }
            Kind::Audio => {
                let mut native = frame::Audio::empty();
                sink.frame(&mut native).map(|()| wrap_audio(native, pos))
            }
        };
        match pulled {
            Ok(raw) => raw.map(Pull::Frame),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::EAGAIN => {
                Ok(Pull::WouldBlock)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(Pull::EndOfStream),
            Err(e) => Err(filter_error(e)),
        }
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn frame_rate(&self) -> Option<Rational> {
        self.frame_rate
    }
}

enum Native {
    Video(frame::Video),
    Audio(frame::Audio),
}

/**
    Recover the FFmpeg frame a decoder stored in [`FrameData`].
*/
fn native_frame(data: FrameData) -> Result<Native> {
    let data = match data.downcast::<frame::Video>() {
        Ok(video) => return Ok(Native::Video(video)),
        Err(data) => data,
    };
    data.downcast::<frame::Audio>()
        .map(Native::Audio)
        .map_err(|_| Error::filter("frame was not decoded by libavcodec"))
}
