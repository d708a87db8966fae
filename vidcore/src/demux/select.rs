/*!
    Stream specifiers and best-stream selection.
*/

use ffmpeg_types::{MediaType, StreamInfo};
use tracing::warn;

use crate::config::WantedStreams;

/**
    A user-supplied stream specifier.

    - `"3"`: the stream with index 3
    - `"a"`: any audio stream (`v`, `a`, `s`, `d`, `t`)
    - `"a:1"`: the second audio stream
    - `"p:2"`: any stream in program 2
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamSpecifier {
    Index(usize),
    Type(MediaType, Option<usize>),
    Program(u32),
}

impl StreamSpecifier {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(index) = text.parse() {
            return Some(Self::Index(index));
        }
        let (head, tail) = match text.split_once(':') {
            Some((head, tail)) => (head, Some(tail)),
            None => (text, None),
        };
        if head == "p" {
            return tail?.parse().ok().map(Self::Program);
        }
        let media_type = match head {
            "v" => MediaType::Video,
            "a" => MediaType::Audio,
            "s" => MediaType::Subtitle,
            "d" => MediaType::Data,
            "t" => MediaType::Attachment,
            _ => return None,
        };
        match tail {
            None => Some(Self::Type(media_type, None)),
            Some(nth) => nth.parse().ok().map(|nth| Self::Type(media_type, Some(nth))),
        }
    }

    pub fn matches(&self, streams: &[StreamInfo], stream: &StreamInfo) -> bool {
        match *self {
            Self::Index(index) => stream.index == index,
            Self::Type(media_type, None) => stream.media_type == media_type,
            Self::Type(media_type, Some(nth)) => {
                stream.media_type == media_type
                    && streams
                        .iter()
                        .filter(|candidate| candidate.media_type == media_type)
                        .position(|candidate| candidate.index == stream.index)
                        == Some(nth)
            }
            Self::Program(program) => stream.program == Some(program),
        }
    }
}

/**
    Stream indices picked for playback.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub video: Option<usize>,
    pub audio: Option<usize>,
    pub subtitle: Option<usize>,
}

impl Selection {
    pub fn has_playable(&self) -> bool {
        self.video.is_some() || self.audio.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Wanted {
    Any,
    Index(usize),
    Nothing,
}

/**
    Pick the stream of `media_type` to play.

    `wanted` restricts the choice to one index. Otherwise streams in the same
    program as `related` are preferred, then streams marked default, then
    moving video over cover images, then higher bitrate, then lower index.
*/
pub fn find_best_stream(
    streams: &[StreamInfo],
    media_type: MediaType,
    wanted: Option<usize>,
    related: Option<usize>,
) -> Option<usize> {
    best_of(
        streams,
        media_type,
        wanted.map_or(Wanted::Any, Wanted::Index),
        related,
    )
}

fn best_of(
    streams: &[StreamInfo],
    media_type: MediaType,
    wanted: Wanted,
    related: Option<usize>,
) -> Option<usize> {
    let candidates = |program: Option<u32>| {
        streams.iter().filter(move |stream| {
            stream.media_type == media_type
                && match wanted {
                    Wanted::Any => true,
                    Wanted::Index(index) => stream.index == index,
                    Wanted::Nothing => false,
                }
                && program.is_none_or(|program| stream.program == Some(program))
        })
    };
    let rank = |stream: &StreamInfo| {
        (
            stream.disposition.default,
            !stream.disposition.attached_pic,
            stream.codec.bitrate.unwrap_or(0),
        )
    };
    let pick = |program: Option<u32>| {
        candidates(program)
            .fold(None::<&StreamInfo>, |best, stream| match best {
                Some(best) if rank(best) >= rank(stream) => Some(best),
                _ => Some(stream),
            })
            .map(|stream| stream.index)
    };

    let program = related
        .and_then(|related| streams.iter().find(|stream| stream.index == related))
        .and_then(|stream| stream.program);
    pick(program).or_else(|| program.and_then(|_| pick(None)))
}

fn wanted_index(
    streams: &[StreamInfo],
    media_type: MediaType,
    specifier: Option<&str>,
) -> Wanted {
    let Some(text) = specifier else {
        return Wanted::Any;
    };
    let Some(specifier) = StreamSpecifier::parse(text) else {
        warn!(specifier = text, "invalid stream specifier");
        return Wanted::Nothing;
    };
    match streams
        .iter()
        .filter(|stream| stream.media_type == media_type)
        .find(|stream| specifier.matches(streams, stream))
    {
        Some(stream) => Wanted::Index(stream.index),
        None => {
            warn!(specifier = text, "stream specifier does not match any {media_type:?} stream");
            Wanted::Nothing
        }
    }
}

/**
    Choose video, audio and (optionally) subtitle streams.

    Audio is related to the chosen video stream, subtitles to the chosen
    audio stream or else the video stream.
*/
pub fn select_streams(
    streams: &[StreamInfo],
    wanted: &WantedStreams,
    enable_subtitles: bool,
) -> Selection {
    let video = best_of(
        streams,
        MediaType::Video,
        wanted_index(streams, MediaType::Video, wanted.video.as_deref()),
        None,
    );
    let audio = best_of(
        streams,
        MediaType::Audio,
        wanted_index(streams, MediaType::Audio, wanted.audio.as_deref()),
        video,
    );
    let subtitle = if enable_subtitles {
        best_of(
            streams,
            MediaType::Subtitle,
            wanted_index(streams, MediaType::Subtitle, wanted.subtitle.as_deref()),
            audio.or(video),
        )
    } else {
        None
    };
    Selection {
        video,
        audio,
        subtitle,
    }
}
