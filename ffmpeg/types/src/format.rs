/*!
    Pixel and sample format types.
*/

/**
    Video pixel formats.

    Only the formats the decoders commonly hand back are named; anything
    else maps to `None` at the backend boundary.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, 12bpp (most common video format)
    Yuv420p,
    /// Semi-planar YUV 4:2:0, 12bpp (common hardware decoder output)
    Nv12,
    /// Packed BGRA, 32bpp (common for display on macOS/Windows)
    Bgra,
    /// Packed RGBA, 32bpp (common for display)
    Rgba,
    /// Packed RGB, 24bpp
    Rgb24,
    /// Packed BGR, 24bpp
    Bgr24,
    /// Planar YUV 4:2:2, 16bpp
    Yuv422p,
    /// Planar YUV 4:4:4, 24bpp
    Yuv444p,
    /// Planar YUV 4:2:0, 10-bit (HDR content)
    Yuv420p10,
    /// Semi-planar YUV 4:2:0, 10-bit little-endian (HDR hardware decoder output)
    P010le,
}

/**
    Audio sample formats.

    Planar variants store each channel in its own plane.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SampleFormat {
    /// 32-bit floating point, range [-1.0, 1.0]
    F32,
    /// 64-bit floating point
    F64,
    /// Signed 16-bit integer
    S16,
    /// Signed 32-bit integer
    S32,
    /// Unsigned 8-bit integer
    U8,
    /// Planar 32-bit floating point
    F32p,
    /// Planar 64-bit floating point
    F64p,
    /// Planar signed 16-bit integer
    S16p,
    /// Planar signed 32-bit integer
    S32p,
    /// Planar unsigned 8-bit integer
    U8p,
}

impl SampleFormat {
    /**
        Returns the number of bytes per sample.
    */
    pub const fn bytes_per_sample(self) -> usize {
        match self.packed() {
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S32 | Self::F32 => 4,
            _ => 8,
        }
    }

    /**
        Returns true if this is a floating-point format.
    */
    pub const fn is_float(self) -> bool {
        matches!(self.packed(), Self::F32 | Self::F64)
    }

    /**
        Returns true if each channel is stored in its own plane.
    */
    pub const fn is_planar(self) -> bool {
        matches!(
            self,
            Self::F32p | Self::F64p | Self::S16p | Self::S32p | Self::U8p
        )
    }

    /**
        Returns the interleaved counterpart of this format.

        Packed formats are returned unchanged.
    */
    pub const fn packed(self) -> Self {
        match self {
            Self::F32p => Self::F32,
            Self::F64p => Self::F64,
            Self::S16p => Self::S16,
            Self::S32p => Self::S32,
            Self::U8p => Self::U8,
            other => other,
        }
    }
}

/**
    Audio channel layout.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ChannelLayout {
    /// Single channel
    Mono,
    /// Left and right channels
    Stereo,
    /// 5.1 surround (FL, FR, FC, LFE, BL, BR)
    Surround5_1,
    /// 7.1 surround (FL, FR, FC, LFE, BL, BR, SL, SR)
    Surround7_1,
}

impl ChannelLayout {
    /**
        Returns the number of channels.
    */
    pub const fn channels(self) -> u16 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::Surround5_1 => 6,
            Self::Surround7_1 => 8,
        }
    }

    /**
        Create a channel layout from a channel count.

        Falls back to the closest matching layout.
    */
    pub const fn from_count(count: u16) -> Self {
        match count {
            1 => Self::Mono,
            2 => Self::Stereo,
            6 => Self::Surround5_1,
            8 => Self::Surround7_1,
            // For other counts, use closest match
            3..=5 => Self::Surround5_1,
            _ => Self::Surround7_1,
        }
    }
}
