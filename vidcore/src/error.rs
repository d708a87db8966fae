/*!
    Error type for the playback engine.
*/

use thiserror::Error;

/**
    Errors surfaced by [`Engine`](crate::Engine) and its stages.
*/
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Media(#[from] ffmpeg_types::Error),

    #[error("no playable audio or video stream in {0}")]
    NoPlayableStream(String),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine stopped")]
    Stopped,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
