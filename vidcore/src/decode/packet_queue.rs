use std::collections::VecDeque;
use std::sync::Weak;

use ffmpeg_types::Packet;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/**
    Start of a new decode epoch.

    Putting a marker bumps the queue serial; the decoder that dequeues it
    flushes its codec. A marker queued by a precise seek carries the target
    so the decoder can skip frames before it.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushMarker {
    pub seek_target_ms: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Queued {
    Packet(Packet),
    Flush(FlushMarker),
}

/**
    A queued item tagged with the serial that was current when it was put.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub item: Queued,
    pub serial: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Dequeued {
    Entry(Entry),
    WouldBlock,
    Aborted,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("packet queue aborted")]
pub struct Aborted;

/**
    Woken when the queue it watches is aborted.
*/
pub(crate) trait AbortWatcher: Send + Sync {
    fn wake(&self);
}

const ENTRY_OVERHEAD: usize = std::mem::size_of::<Entry>();

struct PacketQueueInner {
    entries: VecDeque<Entry>,
    size: usize,
    serial: u64,
    aborted: bool,
}

/**
    Unbounded FIFO of packets for one stream.

    Backpressure is the reader's job: it looks at [`len`](Self::len) and
    [`byte_size`](Self::byte_size) before reading more. A new queue starts
    aborted; [`start`](Self::start) opens it.
*/
pub struct PacketQueue {
    inner: Mutex<PacketQueueInner>,
    not_empty: Condvar,
    watchers: Mutex<Vec<Weak<dyn AbortWatcher>>>,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PacketQueueInner {
                entries: VecDeque::new(),
                size: 0,
                serial: 0,
                aborted: true,
            }),
            not_empty: Condvar::new(),
            watchers: Mutex::new(Vec::new()),
        }
    }

    pub fn put(&self, packet: Packet) -> Result<(), Aborted> {
        self.put_item(Queued::Packet(packet))
    }

    /**
        Queue an empty packet that tells the decoder to drain.
    */
    pub fn put_null(&self, stream_index: usize) -> Result<(), Aborted> {
        self.put(Packet::null(stream_index))
    }

    pub fn put_flush_marker(&self, marker: FlushMarker) -> Result<(), Aborted> {
        self.put_item(Queued::Flush(marker))
    }

    fn put_item(&self, item: Queued) -> Result<(), Aborted> {
        let mut inner = self.inner.lock();
        if inner.aborted {
            return Err(Aborted);
        }
        if matches!(item, Queued::Flush(_)) {
            inner.serial += 1;
        }
        let size = match &item {
            Queued::Packet(packet) => packet.size(),
            Queued::Flush(_) => 0,
        };
        let serial = inner.serial;
        inner.entries.push_back(Entry { item, serial });
        inner.size += size + ENTRY_OVERHEAD;
        self.not_empty.notify_one();
        Ok(())
    }

    /**
        Take the oldest entry. With `block` set, waits until an entry arrives
        or the queue is aborted.
    */
    pub fn get(&self, block: bool) -> Dequeued {
        let mut inner = self.inner.lock();
        loop {
            if inner.aborted {
                return Dequeued::Aborted;
            }
            if let Some(entry) = inner.entries.pop_front() {
                let size = match &entry.item {
                    Queued::Packet(packet) => packet.size(),
                    Queued::Flush(_) => 0,
                };
                inner.size -= size + ENTRY_OVERHEAD;
                return Dequeued::Entry(entry);
            }
            if !block {
                return Dequeued::WouldBlock;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /**
        Drop every queued entry. The serial is left alone.
    */
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.size = 0;
    }

    /**
        Open the queue and begin the first epoch.
    */
    pub fn start(&self) {
        self.start_with(FlushMarker::default());
    }

    /**
        Like [`start`](Self::start), with `marker` opening the first epoch.
    */
    pub fn start_with(&self, marker: FlushMarker) {
        let mut inner = self.inner.lock();
        inner.aborted = false;
        inner.serial += 1;
        let serial = inner.serial;
        inner.entries.push_back(Entry {
            item: Queued::Flush(marker),
            serial,
        });
        inner.size += ENTRY_OVERHEAD;
        self.not_empty.notify_one();
    }

    /**
        Wake every waiter on this queue and on the frame queues watching it.
        Subsequent puts are rejected.
    */
    pub fn abort(&self) {
        {
            let mut inner = self.inner.lock();
            inner.aborted = true;
            self.not_empty.notify_all();
        }
        let mut watchers = self.watchers.lock();
        watchers.retain(|watcher| match watcher.upgrade() {
            Some(watcher) => {
                watcher.wake();
                true
            }
            None => false,
        });
    }

    pub(crate) fn watch(&self, watcher: Weak<dyn AbortWatcher>) {
        self.watchers.lock().push(watcher);
    }

    pub fn serial(&self) -> u64 {
        self.inner.lock().serial
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /**
        Payload bytes plus a fixed per-entry overhead.
    */
    pub fn byte_size(&self) -> usize {
        self.inner.lock().size
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.lock().aborted
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PacketQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PacketQueue")
            .field("len", &inner.entries.len())
            .field("size", &inner.size)
            .field("serial", &inner.serial)
            .field("aborted", &inner.aborted)
            .finish()
    }
}
