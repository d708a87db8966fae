mod decoder;
pub(crate) mod packet_queue;

pub use decoder::{DecodeResult, Decoder, DecoderState, DecoderStatus};
pub use packet_queue::{Aborted, Dequeued, Entry, FlushMarker, PacketQueue, Queued};
