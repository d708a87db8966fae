/*!
    Engine configuration.

    Every field has a default, so a JSON file only needs to name the values it
    overrides:

    ```json
    { "precise_seek": true, "wanted_streams": { "audio": "a:1" } }
    ```
*/

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::playback::FRAME_QUEUE_MAX_SIZE;

/**
    Tunables for one playback session.
*/
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Total bytes the packet queues may hold before the read loop pauses.
    pub max_queue_bytes: usize,
    /// Packets each stream should have queued before the read loop pauses.
    pub min_queued_packets: usize,
    pub video_frame_queue_size: usize,
    pub audio_frame_queue_size: usize,
    pub subtitle_frame_queue_size: usize,
    /// How long the read loop waits when it has nothing to do.
    pub idle_wait_ms: u64,
    /// Position to start playback from.
    pub start_time_ms: i64,
    /// Packets past `start_time_ms + play_duration_ms` are dropped.
    pub play_duration_ms: Option<i64>,
    /// Decode forward from the keyframe and discard frames before the seek target.
    pub precise_seek: bool,
    pub enable_subtitles: bool,
    pub wanted_streams: WantedStreams,
    /// Filter description for the audio filter graph.
    pub audio_filter: Option<String>,
    /// Filter description for the video filter graph.
    pub video_filter: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_queue_bytes: 15 * 1024 * 1024,
            min_queued_packets: 25,
            video_frame_queue_size: 3,
            audio_frame_queue_size: 9,
            subtitle_frame_queue_size: 16,
            idle_wait_ms: 10,
            start_time_ms: 0,
            play_duration_ms: None,
            precise_seek: false,
            enable_subtitles: false,
            wanted_streams: WantedStreams::default(),
            audio_filter: None,
            video_filter: None,
        }
    }
}

/**
    Stream specifiers chosen by the user, one per media type.

    A specifier is a stream index (`"3"`), a media type (`"a"`), the n-th
    stream of a type (`"a:1"`) or a program (`"p:2"`).
*/
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WantedStreams {
    pub video: Option<String>,
    pub audio: Option<String>,
    pub subtitle: Option<String>,
}

impl EngineConfig {
    /**
        Load a config from a JSON file.
    */
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub(crate) fn video_queue_capacity(&self) -> usize {
        clamp_capacity(self.video_frame_queue_size)
    }

    pub(crate) fn audio_queue_capacity(&self) -> usize {
        clamp_capacity(self.audio_frame_queue_size)
    }

    pub(crate) fn subtitle_queue_capacity(&self) -> usize {
        clamp_capacity(self.subtitle_frame_queue_size)
    }
}

fn clamp_capacity(size: usize) -> usize {
    size.clamp(1, FRAME_QUEUE_MAX_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_playback_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.max_queue_bytes, 15 * 1024 * 1024);
        assert_eq!(config.min_queued_packets, 25);
        assert_eq!(config.video_frame_queue_size, 3);
        assert_eq!(config.audio_frame_queue_size, 9);
        assert_eq!(config.subtitle_frame_queue_size, 16);
        assert!(!config.precise_seek);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{ "precise_seek": true, "wanted_streams": { "audio": "a:1" } }"#;
        let config = EngineConfig::from_json(json).unwrap();
        assert!(config.precise_seek);
        assert_eq!(config.wanted_streams.audio.as_deref(), Some("a:1"));
        assert_eq!(config.wanted_streams.video, None);
        assert_eq!(config.min_queued_packets, 25);
    }

    #[test]
    fn frame_queue_sizes_are_clamped() {
        let config = EngineConfig {
            video_frame_queue_size: 0,
            audio_frame_queue_size: 64,
            ..Default::default()
        };
        assert_eq!(config.video_queue_capacity(), 1);
        assert_eq!(config.audio_queue_capacity(), FRAME_QUEUE_MAX_SIZE);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = EngineConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineConfig::load("/nonexistent/vidcore.json").unwrap_err();
        match err {
            Error::ConfigIo { path, .. } => assert!(path.ends_with("vidcore.json")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
