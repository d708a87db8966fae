use ffmpeg_types::{RawFrame, Rational, Subtitle};

/**
    What a queued frame carries.
*/
#[derive(Debug)]
pub enum Payload {
    Picture(RawFrame),
    Samples(RawFrame),
    Subtitle(Subtitle),
}

/**
    A decoded, filtered frame ready for presentation.
*/
#[derive(Debug)]
pub struct Frame {
    pub payload: Payload,
    /// Presentation time in seconds, if known.
    pub pts: Option<f64>,
    /// Duration in seconds (0 when unknown).
    pub duration: f64,
    /// Byte offset of the source packet.
    pub pos: Option<i64>,
    /// Serial of the packet this frame was decoded from.
    pub serial: u64,
    pub width: u32,
    pub height: u32,
    pub sample_aspect_ratio: Rational,
}

impl Frame {
    pub fn picture(
        raw: RawFrame,
        pts: Option<f64>,
        duration: f64,
        serial: u64,
        sample_aspect_ratio: Rational,
    ) -> Self {
        let (width, height) = raw
            .video_format()
            .map(|format| (format.width, format.height))
            .unwrap_or_default();
        Self {
            pos: raw.pos,
            payload: Payload::Picture(raw),
            pts,
            duration,
            serial,
            width,
            height,
            sample_aspect_ratio,
        }
    }

    pub fn samples(raw: RawFrame, pts: Option<f64>, duration: f64, serial: u64) -> Self {
        Self {
            pos: raw.pos,
            payload: Payload::Samples(raw),
            pts,
            duration,
            serial,
            width: 0,
            height: 0,
            sample_aspect_ratio: Rational::default(),
        }
    }

    pub fn subtitle(subtitle: Subtitle, serial: u64) -> Self {
        let pts = subtitle.pts.map(|pts| pts as f64 / 1_000_000.0);
        let duration =
            subtitle.end_display_ms.saturating_sub(subtitle.start_display_ms) as f64 / 1000.0;
        Self {
            payload: Payload::Subtitle(subtitle),
            pts,
            duration,
            pos: None,
            serial,
            width: 0,
            height: 0,
            sample_aspect_ratio: Rational::default(),
        }
    }

    pub fn raw(&self) -> Option<&RawFrame> {
        match &self.payload {
            Payload::Picture(raw) | Payload::Samples(raw) => Some(raw),
            Payload::Subtitle(_) => None,
        }
    }

    pub fn end_pts(&self) -> Option<f64> {
        self.pts.map(|pts| pts + self.duration)
    }
}
