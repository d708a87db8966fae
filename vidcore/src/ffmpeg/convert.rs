/*!
    Conversion between ffmpeg-next types and ffmpeg-types.
*/

use ffmpeg_next::ffi;
use ffmpeg_next::format::{Pixel, Sample, sample::Type as SampleType};

use ffmpeg_types::{PixelFormat, Rational, SampleFormat};

pub fn rational_from_ffmpeg(r: ffmpeg_next::Rational) -> Rational {
    Rational::new(r.numerator(), r.denominator())
}

pub fn rational_to_ffmpeg(r: Rational) -> ffmpeg_next::Rational {
    ffmpeg_next::Rational::new(r.num, r.den)
}

/**
    Map FFmpeg's "no timestamp" sentinel to `None`.
*/
pub fn timestamp(value: i64) -> Option<i64> {
    (value != ffi::AV_NOPTS_VALUE).then_some(value)
}

pub fn pixel_format_from_ffmpeg(format: Pixel) -> Option<PixelFormat> {
    match format {
        // JPEG (full range) variants share the plane layout.
        Pixel::YUV420P | Pixel::YUVJ420P => Some(PixelFormat::Yuv420p),
        Pixel::NV12 => Some(PixelFormat::Nv12),
        Pixel::BGRA => Some(PixelFormat::Bgra),
        Pixel::RGBA => Some(PixelFormat::Rgba),
        Pixel::RGB24 => Some(PixelFormat::Rgb24),
        Pixel::BGR24 => Some(PixelFormat::Bgr24),
        Pixel::YUV422P | Pixel::YUVJ422P => Some(PixelFormat::Yuv422p),
        Pixel::YUV444P | Pixel::YUVJ444P => Some(PixelFormat::Yuv444p),
        Pixel::YUV420P10LE | Pixel::YUV420P10BE => Some(PixelFormat::Yuv420p10),
        Pixel::P010LE => Some(PixelFormat::P010le),
        _ => None,
    }
}

pub fn pixel_format_to_ffmpeg(format: PixelFormat) -> Option<Pixel> {
    match format {
        PixelFormat::Yuv420p => Some(Pixel::YUV420P),
        PixelFormat::Nv12 => Some(Pixel::NV12),
        PixelFormat::Bgra => Some(Pixel::BGRA),
        PixelFormat::Rgba => Some(Pixel::RGBA),
        PixelFormat::Rgb24 => Some(Pixel::RGB24),
        PixelFormat::Bgr24 => Some(Pixel::BGR24),
        PixelFormat::Yuv422p => Some(Pixel::YUV422P),
        PixelFormat::Yuv444p => Some(Pixel::YUV444P),
        PixelFormat::Yuv420p10 => Some(Pixel::YUV420P10LE),
        PixelFormat::P010le => Some(Pixel::P010LE),
        _ => None,
    }
}

pub fn sample_format_from_ffmpeg(format: Sample) -> Option<SampleFormat> {
    let planar = |layout: SampleType| layout == SampleType::Planar;
    match format {
        Sample::F32(layout) if planar(layout) => Some(SampleFormat::F32p),
        Sample::F32(_) => Some(SampleFormat::F32),
        Sample::F64(layout) if planar(layout) => Some(SampleFormat::F64p),
        Sample::F64(_) => Some(SampleFormat::F64),
        Sample::I16(layout) if planar(layout) => Some(SampleFormat::S16p),
        Sample::I16(_) => Some(SampleFormat::S16),
        Sample::I32(layout) if planar(layout) => Some(SampleFormat::S32p),
        Sample::I32(_) => Some(SampleFormat::S32),
        Sample::U8(layout) if planar(layout) => Some(SampleFormat::U8p),
        Sample::U8(_) => Some(SampleFormat::U8),
        _ => None,
    }
}

pub fn sample_format_to_ffmpeg(format: SampleFormat) -> Option<Sample> {
    let layout = if format.is_planar() {
        SampleType::Planar
    } else {
        SampleType::Packed
    };
    match format.packed() {
        SampleFormat::F32 => Some(Sample::F32(layout)),
        SampleFormat::F64 => Some(Sample::F64(layout)),
        SampleFormat::S16 => Some(Sample::I16(layout)),
        SampleFormat::S32 => Some(Sample::I32(layout)),
        SampleFormat::U8 => Some(Sample::U8(layout)),
        _ => None,
    }
}
