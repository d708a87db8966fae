/*!
    Containers opened through libavformat.
*/

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ffmpeg_next::format::{context::Input as InputContext, stream::Disposition};
use ffmpeg_next::{codec, ffi, media::Type};
use parking_lot::Mutex;
use tracing::{debug, warn};

use ffmpeg_types::{ChannelLayout, Error, MediaType, Packet, Result, StreamInfo};

use super::convert::{
    pixel_format_from_ffmpeg, rational_from_ffmpeg, sample_format_from_ffmpeg, timestamp,
};
use crate::capability::{Container, ContainerOpener, ReadOutcome, SeekRequest};

/**
    Codec parameters of the most recently opened container, by stream index.

    The codec factory reads them back so decoders see the exact parameters
    the demuxer reported.
*/
#[derive(Clone, Default)]
pub(crate) struct ParameterStore(Arc<Mutex<HashMap<usize, codec::Parameters>>>);

impl ParameterStore {
    fn replace(&self, parameters: HashMap<usize, codec::Parameters>) {
        *self.0.lock() = parameters;
    }

    pub fn get(&self, index: usize) -> Option<codec::Parameters> {
        self.0.lock().get(&index).cloned()
    }
}

/**
    Opens files and URLs with libavformat.

    Decoders for a container must be opened before the next container is
    opened through the same capabilities.
*/
pub struct FfmpegOpener {
    parameters: ParameterStore,
}

impl FfmpegOpener {
    pub(crate) fn new(parameters: ParameterStore) -> Self {
        Self { parameters }
    }
}

impl ContainerOpener for FfmpegOpener {
    fn open(&self, uri: &str) -> Result<Box<dyn Container>> {
        let input = ffmpeg_next::format::input(&uri).map_err(|e| {
            if e.to_string().contains("No such file") {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    e.to_string(),
                ))
            } else {
                Error::codec(e.to_string())
            }
        })?;

        let programs = stream_programs(&input);
        let mut parameters = HashMap::new();
        let streams: Vec<StreamInfo> = input
            .streams()
            .map(|stream| {
                parameters.insert(stream.index(), stream.parameters().clone());
                stream_info(&stream, programs.get(&stream.index()).copied())
            })
            .collect();
        self.parameters.replace(parameters);

        // SAFETY: iformat is set for every opened input context.
        let seeks_by_timestamp = unsafe {
            let flags = (*(*input.as_ptr()).iformat).flags;
            let generic_only =
                (ffi::AVFMT_NOBINSEARCH | ffi::AVFMT_NOGENSEARCH | ffi::AVFMT_NO_BYTE_SEEK) as i32;
            flags & generic_only == 0
        };

        debug!(uri, streams = streams.len(), seeks_by_timestamp, "opened container");
        Ok(Box::new(FfmpegContainer {
            input,
            streams,
            seeks_by_timestamp,
        }))
    }
}

struct FfmpegContainer {
    input: InputContext,
    streams: Vec<StreamInfo>,
    seeks_by_timestamp: bool,
}

impl Container for FfmpegContainer {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn start_time(&self) -> Option<i64> {
        // SAFETY: reading a plain field of a live input context.
        timestamp(unsafe { (*self.input.as_ptr()).start_time })
    }

    fn read_packet(&mut self) -> Result<ReadOutcome> {
        let mut packet = ffmpeg_next::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => {
                let Some(data) = packet.data().filter(|data| !data.is_empty()) else {
                    return Ok(ReadOutcome::Retry);
                };
                let position = packet.position();
                Ok(ReadOutcome::Packet(Packet {
                    stream_index: packet.stream(),
                    data: data.to_vec(),
                    pts: packet.pts(),
                    dts: packet.dts(),
                    duration: packet.duration(),
                    pos: (position >= 0).then_some(position as i64),
                    keyframe: packet.is_key(),
                }))
            }
            Err(ffmpeg_next::Error::Eof) => Ok(ReadOutcome::EndOfStream),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::EAGAIN => {
                Ok(ReadOutcome::Retry)
            }
            Err(e) => Err(Error::Io(std::io::Error::other(e.to_string()))),
        }
    }

    fn seek(&mut self, request: &SeekRequest) -> Result<()> {
        let flags = if request.flags.byte {
            ffi::AVSEEK_FLAG_BYTE as i32
        } else {
            0
        };
        // SAFETY: the context outlives the call and no packet borrows it.
        let ret = unsafe {
            ffi::avformat_seek_file(
                self.input.as_mut_ptr(),
                -1,
                request.min,
                request.target,
                request.max,
                flags,
            )
        };
        if ret < 0 {
            return Err(Error::Io(std::io::Error::other(format!(
                "seek to {} failed: {}",
                request.target,
                ffmpeg_next::Error::from(ret)
            ))));
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        // SAFETY: see `seek`.
        let ret = unsafe { ffi::av_read_pause(self.input.as_mut_ptr()) };
        if ret < 0 {
            // Only network protocols implement pausing.
            debug!(error = %ffmpeg_next::Error::from(ret), "container does not pause");
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        // SAFETY: see `seek`.
        let ret = unsafe { ffi::av_read_play(self.input.as_mut_ptr()) };
        if ret < 0 {
            debug!(error = %ffmpeg_next::Error::from(ret), "container does not resume");
        }
        Ok(())
    }

    fn seeks_by_timestamp(&self) -> bool {
        self.seeks_by_timestamp
    }
}

/**
    Program id of every stream that belongs to a program.
*/
fn stream_programs(input: &InputContext) -> HashMap<usize, u32> {
    let mut programs = HashMap::new();
    // SAFETY: programs and their index arrays are owned by the context and
    // sized by the accompanying counters.
    unsafe {
        let ctx = input.as_ptr();
        for p in 0..(*ctx).nb_programs as usize {
            let program = *(*ctx).programs.add(p);
            let id = u32::try_from((*program).id).unwrap_or_default();
            for s in 0..(*program).nb_stream_indexes as usize {
                programs.entry(*(*program).stream_index.add(s) as usize).or_insert(id);
            }
        }
    }
    programs
}

fn stream_info(stream: &ffmpeg_next::format::stream::Stream, program: Option<u32>) -> StreamInfo {
    let parameters = stream.parameters();
    let media_type = match parameters.medium() {
        Type::Video => MediaType::Video,
        Type::Audio => MediaType::Audio,
        Type::Subtitle => MediaType::Subtitle,
        Type::Attachment => MediaType::Attachment,
        _ => MediaType::Data,
    };
    let time_base = rational_from_ffmpeg(stream.time_base());

    let mut info = StreamInfo::new(stream.index(), media_type, time_base);
    info.start_time = timestamp(stream.start_time());
    info.duration = (stream.duration() > 0 && time_base.is_valid())
        .then(|| Duration::from_secs_f64(time_base.seconds(stream.duration()).max(0.0)));
    info.frame_rate = [stream.avg_frame_rate(), stream.rate()]
        .into_iter()
        .find(|rate| rate.numerator() != 0 && rate.denominator() != 0)
        .map(rational_from_ffmpeg);
    info.program = program;

    let disposition = stream.disposition();
    info.disposition.default = disposition.contains(Disposition::DEFAULT);
    info.disposition.attached_pic = disposition.contains(Disposition::ATTACHED_PIC);

    info.codec.codec_name = parameters.id().name().to_string();

    // SAFETY: reading fields of codec parameters and the attached picture
    // packet, both owned by the stream.
    unsafe {
        let ptr = parameters.as_ptr();
        if (*ptr).extradata_size > 0 && !(*ptr).extradata.is_null() {
            let extradata =
                std::slice::from_raw_parts((*ptr).extradata, (*ptr).extradata_size as usize);
            info.codec.extradata = Some(extradata.to_vec());
        }
        info.codec.bitrate = u64::try_from((*ptr).bit_rate).ok().filter(|rate| *rate > 0);

        if info.disposition.attached_pic {
            let picture = &(*stream.as_ptr()).attached_pic;
            if picture.size > 0 && !picture.data.is_null() {
                let data = std::slice::from_raw_parts(picture.data, picture.size as usize);
                let mut packet = Packet::new(
                    stream.index(),
                    data.to_vec(),
                    timestamp(picture.pts),
                    timestamp(picture.dts),
                );
                packet.keyframe = true;
                info.attached_pic = Some(packet);
            }
        }
    }

    match media_type {
        MediaType::Video => describe_video(&mut info, parameters),
        MediaType::Audio => describe_audio(&mut info, parameters),
        _ => {}
    }
    info
}

fn describe_video(info: &mut StreamInfo, parameters: codec::Parameters) {
    let decoder = codec::context::Context::from_parameters(parameters)
        .and_then(|context| context.decoder().video());
    match decoder {
        Ok(decoder) => {
            info.codec.width = decoder.width();
            info.codec.height = decoder.height();
            info.codec.pixel_format = pixel_format_from_ffmpeg(decoder.format());
            info.codec.sample_aspect_ratio = rational_from_ffmpeg(decoder.aspect_ratio());
        }
        Err(e) => warn!(stream = info.index, error = %e, "could not read video parameters"),
    }
}

fn describe_audio(info: &mut StreamInfo, parameters: codec::Parameters) {
    let decoder = codec::context::Context::from_parameters(parameters)
        .and_then(|context| context.decoder().audio());
    match decoder {
        Ok(decoder) => {
            info.codec.sample_rate = decoder.rate();
            info.codec.channels = decoder.channels();
            info.codec.channel_layout = Some(ChannelLayout::from_count(decoder.channels()));
            info.codec.sample_format = sample_format_from_ffmpeg(decoder.format());
        }
        Err(e) => warn!(stream = info.index, error = %e, "could not read audio parameters"),
    }
}
