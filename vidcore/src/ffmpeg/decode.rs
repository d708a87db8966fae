/*!
    Decoders opened through libavcodec.
*/

use std::ops::DerefMut;

use ffmpeg_next::codec::{self, decoder, subtitle::Rect};
use ffmpeg_next::{ffi, frame};
use tracing::{debug, trace};

use ffmpeg_types::{
    AudioFormat, ChannelLayout, Error, FrameData, MediaType, Packet, Rational, RawFrame, Result,
    StreamInfo, Subtitle, VideoFormat,
};

use super::convert::{
    pixel_format_from_ffmpeg, rational_from_ffmpeg, rational_to_ffmpeg,
    sample_format_from_ffmpeg, timestamp,
};
use super::source::ParameterStore;
use crate::capability::{Codec, CodecFactory, DecodeOutput, Decoded};

/**
    Map libavcodec errors onto the shared error type. Corrupt input becomes
    [`Error::InvalidData`] so the stream skips the packet and carries on.
*/
pub(super) fn codec_error(e: ffmpeg_next::Error) -> Error {
    match e {
        ffmpeg_next::Error::InvalidData => Error::invalid_data(e.to_string()),
        ffmpeg_next::Error::DecoderNotFound => Error::unsupported_format(e.to_string()),
        _ => Error::codec(e.to_string()),
    }
}

/**
    Opens a libavcodec decoder for streams of the last opened container.
*/
pub struct FfmpegCodecs {
    parameters: ParameterStore,
}

impl FfmpegCodecs {
    pub(crate) fn new(parameters: ParameterStore) -> Self {
        Self { parameters }
    }
}

impl CodecFactory for FfmpegCodecs {
    fn open(&self, stream: &StreamInfo) -> Result<Box<dyn Codec>> {
        let parameters = self.parameters.get(stream.index).ok_or_else(|| {
            Error::codec(format!("no codec parameters for stream {}", stream.index))
        })?;
        let mut context =
            codec::context::Context::from_parameters(parameters).map_err(codec_error)?;
        // SAFETY: the context is not opened yet, so its fields may be set.
        unsafe {
            (*context.as_mut_ptr()).pkt_timebase = rational_to_ffmpeg(stream.time_base).into();
        }

        let decoder = context.decoder();
        let engine = match stream.media_type {
            MediaType::Video => Engine::Video(decoder.video().map_err(codec_error)?),
            MediaType::Audio => Engine::Audio(decoder.audio().map_err(codec_error)?),
            MediaType::Subtitle => Engine::Subtitle(decoder.subtitle().map_err(codec_error)?),
            other => {
                return Err(Error::unsupported_format(format!(
                    "cannot decode {other:?} stream {}",
                    stream.index
                )));
            }
        };
        debug!(stream = stream.index, codec = %stream.codec.codec_name, "decoder opened");
        Ok(Box::new(FfmpegCodec {
            engine,
            time_base: stream.time_base,
        }))
    }
}

enum Engine {
    Video(decoder::Video),
    Audio(decoder::Audio),
    Subtitle(decoder::Subtitle),
}

struct FfmpegCodec {
    engine: Engine,
    time_base: Rational,
}

impl Codec for FfmpegCodec {
    fn decode(&mut self, packet: &Packet) -> Result<DecodeOutput> {
        let items = match &mut self.engine {
            Engine::Video(decoder) => exchange(decoder, packet, frame::Video::empty)?
                .into_iter()
                .map(|native| video_frame(native, packet.pos))
                .collect::<Result<Vec<_>>>()?,
            Engine::Audio(decoder) => exchange(decoder, packet, frame::Audio::empty)?
                .into_iter()
                .map(|native| audio_frame(native, packet.pos))
                .collect::<Result<Vec<_>>>()?,
            Engine::Subtitle(decoder) => {
                decode_subtitle(decoder, packet, self.time_base)?
                    .map(Decoded::Subtitle)
                    .into_iter()
                    .collect()
            }
        };
        Ok(DecodeOutput {
            items,
            consumed: packet.size(),
        })
    }

    fn flush(&mut self) {
        match &mut self.engine {
            Engine::Video(decoder) => decoder.flush(),
            Engine::Audio(decoder) => decoder.flush(),
            Engine::Subtitle(decoder) => decoder.flush(),
        }
    }
}

fn native_packet(packet: &Packet) -> ffmpeg_next::Packet {
    let mut native = ffmpeg_next::Packet::copy(&packet.data);
    native.set_pts(packet.pts);
    native.set_dts(packet.dts);
    native.set_duration(packet.duration);
    if let Some(pos) = packet.pos {
        native.set_position(pos as isize);
    }
    native
}

/**
    Send one packet (or end of stream for a null packet) and collect every
    frame the decoder can return.
*/
fn exchange<T>(decoder: &mut decoder::Opened, packet: &Packet, empty: fn() -> T) -> Result<Vec<T>>
where
    T: DerefMut<Target = frame::Frame>,
{
    let send = |decoder: &mut decoder::Opened| {
        if packet.is_null() {
            decoder.send_eof()
        } else {
            decoder.send_packet(&native_packet(packet))
        }
    };

    let mut frames = Vec::new();
    match send(decoder) {
        // A second end of stream is not an error.
        Ok(()) | Err(ffmpeg_next::Error::Eof) => {}
        Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::EAGAIN => {
            // Input buffer full: drain, then retry once.
            receive(decoder, empty, &mut frames)?;
            match send(decoder) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::EAGAIN => {
                    trace!("decoder still full, packet dropped");
                }
                Err(e) => return Err(codec_error(e)),
            }
        }
        Err(e) => return Err(codec_error(e)),
    }
    receive(decoder, empty, &mut frames)?;
    Ok(frames)
}

fn receive<T>(decoder: &mut decoder::Opened, empty: fn() -> T, frames: &mut Vec<T>) -> Result<()>
where
    T: DerefMut<Target = frame::Frame>,
{
    loop {
        let mut native = empty();
        match decoder.receive_frame(&mut native) {
            Ok(()) => frames.push(native),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::EAGAIN => return Ok(()),
            Err(ffmpeg_next::Error::Eof) => return Ok(()),
            Err(e) => return Err(codec_error(e)),
        }
    }
}

/**
    Wrap a decoded picture. The best-effort timestamp becomes the frame pts.
*/
pub(super) fn video_frame(native: frame::Video, pos: Option<i64>) -> Result<Decoded> {
    let pts = native.timestamp();
    wrap_video(native, pts, pos).map(Decoded::Frame)
}

pub(super) fn wrap_video(
    native: frame::Video,
    pts: Option<i64>,
    pos: Option<i64>,
) -> Result<RawFrame> {
    let pixel_format = pixel_format_from_ffmpeg(native.format()).ok_or_else(|| {
        Error::unsupported_format(format!("unsupported pixel format: {:?}", native.format()))
    })?;
    let format = VideoFormat {
        width: native.width(),
        height: native.height(),
        pixel_format,
        sample_aspect_ratio: rational_from_ffmpeg(native.aspect_ratio()),
    };
    // SAFETY: reading a plain field of a live frame.
    let pkt_dts = timestamp(unsafe { (*native.as_ptr()).pkt_dts });
    let mut raw = RawFrame::video(format, pts, FrameData::new(native));
    raw.pkt_dts = pkt_dts;
    raw.pos = pos;
    Ok(raw)
}

pub(super) fn audio_frame(native: frame::Audio, pos: Option<i64>) -> Result<Decoded> {
    wrap_audio(native, pos).map(Decoded::Frame)
}

pub(super) fn wrap_audio(native: frame::Audio, pos: Option<i64>) -> Result<RawFrame> {
    let sample_format = sample_format_from_ffmpeg(native.format()).ok_or_else(|| {
        Error::unsupported_format(format!("unsupported sample format: {:?}", native.format()))
    })?;
    let channels = native.channels() as u16;
    let format = AudioFormat {
        sample_rate: native.rate(),
        channels,
        channel_layout: Some(ChannelLayout::from_count(channels)),
        sample_format,
    };
    let samples = native.samples();
    let pts = native.pts();
    let mut raw = RawFrame::audio(format, samples, pts, FrameData::new(native));
    raw.pos = pos;
    Ok(raw)
}

fn decode_subtitle(
    decoder: &mut decoder::Subtitle,
    packet: &Packet,
    time_base: Rational,
) -> Result<Option<Subtitle>> {
    let native = if packet.is_null() {
        ffmpeg_next::Packet::empty()
    } else {
        native_packet(packet)
    };
    let mut decoded = codec::subtitle::Subtitle::new();
    if !decoder.decode(&native, &mut decoded).map_err(codec_error)? {
        return Ok(None);
    }
    let text = decoded
        .rects()
        .filter_map(|rect| match rect {
            Rect::Text(text) => Some(text.get().to_string()),
            Rect::Ass(ass) => Some(ass.get().to_string()),
            _ => None,
        })
        .collect();
    Ok(Some(Subtitle {
        pts: decoded
            .pts()
            .or_else(|| packet.pts.map(|pts| time_base.rescale(pts, Rational::micros()))),
        start_display_ms: decoded.start(),
        end_display_ms: decoded.end(),
        text,
    }))
}
