mod audio_pipeline;
mod frame;
mod frame_queue;
mod subtitle;
mod video_pipeline;

pub use frame::{Frame, Payload};
pub use frame_queue::{FRAME_QUEUE_MAX_SIZE, FrameQueue, FrameRef, WritableSlot};
pub use subtitle::SubtitleStream;

pub(crate) use audio_pipeline::decode_audio_frames;
pub(crate) use video_pipeline::decode_video_frames;
