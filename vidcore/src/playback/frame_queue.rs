use std::sync::Arc;

use parking_lot::{Condvar, MappedMutexGuard, Mutex, MutexGuard};

use crate::decode::PacketQueue;
use crate::decode::packet_queue::AbortWatcher;

use super::frame::Frame;

pub const FRAME_QUEUE_MAX_SIZE: usize = 16;

/// A borrowed frame slot. Drop it before calling [`FrameQueue::next`].
pub type FrameRef<'a> = MappedMutexGuard<'a, Frame>;

struct Cursor {
    rindex: usize,
    windex: usize,
    size: usize,
    rindex_shown: bool,
}

impl Cursor {
    fn remaining(&self) -> usize {
        self.size - usize::from(self.rindex_shown)
    }
}

struct FrameSignal {
    cursor: Mutex<Cursor>,
    cond: Condvar,
}

impl AbortWatcher for FrameSignal {
    fn wake(&self) {
        let _cursor = self.cursor.lock();
        self.cond.notify_all();
    }
}

/**
    Fixed-capacity ring of decoded frames between one decode thread and one
    consumer.

    Abort is owned by the packet queue the frames are decoded from: aborting
    it wakes every waiter here too.

    With `keep_last` the most recently consumed frame stays readable through
    [`peek_last`](Self::peek_last) until the next one is consumed, so a
    renderer always has something to redraw.
*/
pub struct FrameQueue {
    slots: Box<[Mutex<Option<Frame>>]>,
    signal: Arc<FrameSignal>,
    packets: Arc<PacketQueue>,
    max_size: usize,
    keep_last: bool,
}

/**
    A free slot returned by [`FrameQueue::peek_writable`].
*/
pub struct WritableSlot<'a> {
    queue: &'a FrameQueue,
    index: usize,
}

impl WritableSlot<'_> {
    /**
        Fill the slot and make it visible to the reader.
    */
    pub fn push(self, frame: Frame) {
        *self.queue.slots[self.index].lock() = Some(frame);
        let mut cursor = self.queue.signal.cursor.lock();
        cursor.windex = (cursor.windex + 1) % self.queue.max_size;
        cursor.size += 1;
        self.queue.signal.cond.notify_all();
    }
}

impl FrameQueue {
    pub fn new(packets: Arc<PacketQueue>, max_size: usize, keep_last: bool) -> Self {
        let floor = if keep_last { 2 } else { 1 };
        let max_size = max_size.clamp(floor, FRAME_QUEUE_MAX_SIZE);
        let signal = Arc::new(FrameSignal {
            cursor: Mutex::new(Cursor {
                rindex: 0,
                windex: 0,
                size: 0,
                rindex_shown: false,
            }),
            cond: Condvar::new(),
        });
        packets.watch(Arc::downgrade(&signal) as std::sync::Weak<dyn AbortWatcher>);
        Self {
            slots: (0..max_size).map(|_| Mutex::new(None)).collect(),
            signal,
            packets,
            max_size,
            keep_last,
        }
    }

    /**
        Wait for a free slot. Returns `None` once the queue is aborted.
    */
    pub fn peek_writable(&self) -> Option<WritableSlot<'_>> {
        let mut cursor = self.signal.cursor.lock();
        while cursor.size >= self.max_size && !self.packets.is_aborted() {
            self.signal.cond.wait(&mut cursor);
        }
        if self.packets.is_aborted() {
            return None;
        }
        Some(WritableSlot {
            queue: self,
            index: cursor.windex,
        })
    }

    /**
        Wait for an unconsumed frame. Returns `None` once the queue is aborted.
    */
    pub fn peek_readable(&self) -> Option<FrameRef<'_>> {
        let mut cursor = self.signal.cursor.lock();
        while cursor.remaining() == 0 && !self.packets.is_aborted() {
            self.signal.cond.wait(&mut cursor);
        }
        if self.packets.is_aborted() {
            return None;
        }
        let index = (cursor.rindex + usize::from(cursor.rindex_shown)) % self.max_size;
        drop(cursor);
        self.slot(index)
    }

    /**
        The next unconsumed frame, without waiting.
    */
    pub fn peek(&self) -> Option<FrameRef<'_>> {
        let cursor = self.signal.cursor.lock();
        if cursor.remaining() == 0 {
            return None;
        }
        let index = (cursor.rindex + usize::from(cursor.rindex_shown)) % self.max_size;
        drop(cursor);
        self.slot(index)
    }

    /**
        The frame after [`peek`](Self::peek), without waiting.
    */
    pub fn peek_next(&self) -> Option<FrameRef<'_>> {
        let cursor = self.signal.cursor.lock();
        if cursor.remaining() < 2 {
            return None;
        }
        let index = (cursor.rindex + usize::from(cursor.rindex_shown) + 1) % self.max_size;
        drop(cursor);
        self.slot(index)
    }

    /**
        The frame at the read index: the last shown frame in keep-last mode.
    */
    pub fn peek_last(&self) -> Option<FrameRef<'_>> {
        let cursor = self.signal.cursor.lock();
        if cursor.size == 0 {
            return None;
        }
        let index = cursor.rindex;
        drop(cursor);
        self.slot(index)
    }

    fn slot(&self, index: usize) -> Option<FrameRef<'_>> {
        MutexGuard::try_map(self.slots[index].lock(), Option::as_mut).ok()
    }

    /**
        Consume the frame at the read index.

        In keep-last mode the first call after a frame becomes current only
        marks it as shown and returns `None`; the frame is released by the
        following call.
    */
    pub fn next(&self) -> Option<Frame> {
        let rindex = {
            let mut cursor = self.signal.cursor.lock();
            if cursor.size == 0 {
                return None;
            }
            if self.keep_last && !cursor.rindex_shown {
                cursor.rindex_shown = true;
                return None;
            }
            cursor.rindex
        };
        let released = self.slots[rindex].lock().take();
        let mut cursor = self.signal.cursor.lock();
        cursor.rindex = (cursor.rindex + 1) % self.max_size;
        cursor.size -= 1;
        self.signal.cond.notify_all();
        released
    }

    /**
        Frames not yet shown.
    */
    pub fn remaining(&self) -> usize {
        self.signal.cursor.lock().remaining()
    }

    /**
        Occupied slots, including a kept last frame.
    */
    pub fn len(&self) -> usize {
        self.signal.cursor.lock().size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn keep_last(&self) -> bool {
        self.keep_last
    }

    /**
        Byte position of the last shown frame, if it belongs to the current
        epoch.
    */
    pub fn last_pos(&self) -> Option<i64> {
        let rindex = {
            let cursor = self.signal.cursor.lock();
            if !cursor.rindex_shown || cursor.size == 0 {
                return None;
            }
            cursor.rindex
        };
        let slot = self.slots[rindex].lock();
        let frame = slot.as_ref()?;
        if frame.serial == self.packets.serial() {
            frame.pos
        } else {
            None
        }
    }

    /**
        Wake every waiter so it can re-check abort.
    */
    pub fn signal(&self) {
        self.signal.wake();
    }

    pub fn packets(&self) -> &Arc<PacketQueue> {
        &self.packets
    }
}

impl std::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cursor = self.signal.cursor.lock();
        f.debug_struct("FrameQueue")
            .field("size", &cursor.size)
            .field("rindex_shown", &cursor.rindex_shown)
            .field("max_size", &self.max_size)
            .field("keep_last", &self.keep_last)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use ffmpeg_types::Subtitle;

    fn frame(index: i64, serial: u64) -> Frame {
        let mut frame = Frame::subtitle(
            Subtitle {
                pts: Some(index * 1_000_000),
                ..Default::default()
            },
            serial,
        );
        frame.pos = Some(index * 100);
        frame
    }

    fn queue(max_size: usize, keep_last: bool) -> FrameQueue {
        let packets = Arc::new(PacketQueue::new());
        packets.start();
        FrameQueue::new(packets, max_size, keep_last)
    }

    fn push(queue: &FrameQueue, index: i64) {
        queue.peek_writable().unwrap().push(frame(index, 1));
    }

    fn pts(frame: &Frame) -> Option<f64> {
        frame.pts
    }

    #[test]
    fn frames_come_out_in_order() {
        let queue = queue(3, false);
        push(&queue, 0);
        push(&queue, 1);
        assert_eq!(queue.remaining(), 2);

        assert_eq!(queue.peek().as_deref().and_then(pts), Some(0.0));
        assert_eq!(queue.peek_next().as_deref().and_then(pts), Some(1.0));
        assert_eq!(queue.next().and_then(|f| f.pts), Some(0.0));
        assert_eq!(queue.next().and_then(|f| f.pts), Some(1.0));
        assert!(queue.next().is_none());
        assert!(queue.peek().is_none());
    }

    #[test]
    fn unpushed_slot_is_not_visible() {
        let queue = queue(3, false);
        let slot = queue.peek_writable().unwrap();
        drop(slot);
        assert_eq!(queue.len(), 0);
        assert!(queue.peek().is_none());
    }

    #[test]
    fn writer_blocks_at_capacity() {
        let queue = Arc::new(queue(3, false));
        for index in 0..3 {
            push(&queue, index);
        }
        assert!(queue.is_full());

        let (tx, rx) = mpsc::channel();
        let writer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                push(&queue, 3);
                let _ = tx.send(());
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(queue.len(), 3);

        queue.next();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        writer.join().unwrap();
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn keep_last_retains_shown_frame() {
        let queue = queue(3, true);
        push(&queue, 0);
        push(&queue, 1);

        assert_eq!(queue.peek_readable().as_deref().and_then(pts), Some(0.0));
        assert!(queue.next().is_none());
        assert_eq!(queue.remaining(), 1);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.peek_last().as_deref().and_then(pts), Some(0.0));
        assert_eq!(queue.peek_readable().as_deref().and_then(pts), Some(1.0));

        assert_eq!(queue.next().and_then(|f| f.pts), Some(0.0));
        assert_eq!(queue.remaining(), 0);
        assert_eq!(queue.peek_last().as_deref().and_then(pts), Some(1.0));
    }

    #[test]
    fn keep_last_capacity_has_room_for_one_more_frame() {
        let queue = queue(1, true);
        assert_eq!(queue.capacity(), 2);
    }

    #[test]
    fn last_pos_requires_current_serial() {
        let queue = queue(3, true);
        push(&queue, 4);
        assert_eq!(queue.last_pos(), None);

        queue.next();
        assert_eq!(queue.last_pos(), Some(400));

        queue.packets().flush();
        queue.packets().put_flush_marker(Default::default()).unwrap();
        assert_eq!(queue.last_pos(), None);
    }

    #[test]
    fn packet_abort_wakes_writer_and_reader() {
        let full = Arc::new(queue(1, false));
        push(&full, 0);
        let empty = Arc::new(queue(2, false));

        let (tx, rx) = mpsc::channel();
        let writer = {
            let full = Arc::clone(&full);
            let tx = tx.clone();
            thread::spawn(move || {
                let _ = tx.send(full.peek_writable().is_none());
            })
        };
        let reader = {
            let empty = Arc::clone(&empty);
            thread::spawn(move || {
                let _ = tx.send(empty.peek_readable().is_none());
            })
        };

        thread::sleep(Duration::from_millis(20));
        full.packets().abort();
        empty.packets().abort();

        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        writer.join().unwrap();
        reader.join().unwrap();
    }
}
