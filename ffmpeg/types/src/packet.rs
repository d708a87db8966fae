/*!
    Encoded packet type.
*/

/**
    An encoded packet produced by a container.

    Timestamps are expressed in the time base of the stream the packet
    belongs to. A packet with empty `data` is a null packet: it asks the
    decoder to drain any buffered frames.
*/
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Packet {
    /// Index of the stream this packet belongs to.
    pub stream_index: usize,
    /// Encoded payload.
    pub data: Vec<u8>,
    /// Presentation timestamp.
    pub pts: Option<i64>,
    /// Decode timestamp.
    pub dts: Option<i64>,
    /// Duration in stream time base units.
    pub duration: i64,
    /// Byte offset in the source, if known.
    pub pos: Option<i64>,
    /// True for keyframes.
    pub keyframe: bool,
}

impl Packet {
    pub fn new(stream_index: usize, data: Vec<u8>, pts: Option<i64>, dts: Option<i64>) -> Self {
        Self {
            stream_index,
            data,
            pts,
            dts,
            ..Default::default()
        }
    }

    /**
        Create a null packet for the given stream.
    */
    pub fn null(stream_index: usize) -> Self {
        Self {
            stream_index,
            ..Default::default()
        }
    }

    pub fn is_null(&self) -> bool {
        self.data.is_empty()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /**
        The timestamp used for range checks: pts, else dts.
    */
    pub fn timestamp(&self) -> Option<i64> {
        self.pts.or(self.dts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_packet() {
        let packet = Packet::null(3);
        assert!(packet.is_null());
        assert_eq!(packet.stream_index, 3);
        assert_eq!(packet.size(), 0);
    }

    #[test]
    fn timestamp_prefers_pts() {
        let mut packet = Packet::new(0, vec![1, 2], Some(10), Some(8));
        assert_eq!(packet.timestamp(), Some(10));
        packet.pts = None;
        assert_eq!(packet.timestamp(), Some(8));
    }
}
