/*!
    State shared between the engine handle and its threads.
*/

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::capability::{EventSink, SeekFlags};
use crate::config::EngineConfig;
use crate::engine::PlaybackState;

/**
    A seek waiting to be applied by the read loop.

    `position` and `relative` are milliseconds, or bytes for byte seeks.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SeekCommand {
    pub position: i64,
    pub relative: i64,
    pub flags: SeekFlags,
}

#[derive(Debug)]
pub(crate) struct Control {
    pub abort: bool,
    pub paused: bool,
    pub seek: Option<SeekCommand>,
    pub state: PlaybackState,
}

impl Control {
    /**
        Record a seek unless one is already pending.
    */
    pub fn request_seek(&mut self, command: SeekCommand) -> bool {
        if self.seek.is_some() {
            return false;
        }
        self.seek = Some(command);
        true
    }
}

/**
    Wakes the read loop early from its idle wait.

    The pending flag keeps a notify that lands before the wait from being lost.
*/
#[derive(Debug, Default)]
pub(crate) struct ContinueRead {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl ContinueRead {
    pub fn notify(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.cond.notify_one();
    }

    pub fn wait(&self, timeout: Duration) {
        let mut pending = self.pending.lock();
        if !*pending {
            self.cond.wait_for(&mut pending, timeout);
        }
        *pending = false;
    }
}

pub(crate) struct Shared {
    pub control: Mutex<Control>,
    pub continue_read: Arc<ContinueRead>,
    pub events: Arc<dyn EventSink>,
    pub config: EngineConfig,
}

impl Shared {
    pub fn new(config: EngineConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            control: Mutex::new(Control {
                abort: false,
                paused: false,
                seek: None,
                state: PlaybackState::Playing,
            }),
            continue_read: Arc::new(ContinueRead::default()),
            events,
            config,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.control.lock().abort
    }

    pub fn set_state(&self, state: PlaybackState) {
        self.control.lock().state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn command(position: i64) -> SeekCommand {
        SeekCommand {
            position,
            relative: 0,
            flags: SeekFlags::default(),
        }
    }

    #[test]
    fn second_seek_is_ignored_while_pending() {
        let shared = Shared::new(EngineConfig::default(), Arc::new(crate::NoEvents));
        let mut control = shared.control.lock();
        assert!(control.request_seek(command(1000)));
        assert!(!control.request_seek(command(2000)));
        assert_eq!(control.seek, Some(command(1000)));

        control.seek = None;
        assert!(control.request_seek(command(3000)));
    }

    #[test]
    fn notify_before_wait_is_not_lost() {
        let wake = ContinueRead::default();
        wake.notify();
        let started = Instant::now();
        wake.wait(Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn wait_times_out_without_notify() {
        let wake = ContinueRead::default();
        let started = Instant::now();
        wake.wait(Duration::from_millis(20));
        assert!(started.elapsed() >= Duration::from_millis(15));
    }
}
