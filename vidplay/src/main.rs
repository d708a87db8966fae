use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use vidcore::synthetic::SyntheticMedia;
use vidcore::{
    Capabilities, Engine, EngineConfig, Error, EventSink, FrameQueue, Payload, Prepared,
    SeekFlags, StreamKind,
};

/**
    Headless media player: demuxes, decodes and paces frames on the wall
    clock, reporting what it played.
*/
#[derive(Parser, Debug)]
#[command(name = "vidplay")]
struct Args {
    /// File or URL to play.
    source: String,

    /// JSON engine configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seek to this position (milliseconds) once playback has started.
    #[arg(short, long)]
    seek: Option<i64>,

    /// Seek by byte offset instead of time.
    #[arg(long, requires = "seek")]
    bytes: bool,

    /// Play this many extra times after the first completion.
    #[arg(short = 'l', long = "loop", default_value = "0")]
    repeat: u32,

    /// Stop after this many seconds of wall-clock time.
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Play a generated clip of this many seconds instead of decoding SOURCE.
    #[arg(long)]
    synthetic: Option<usize>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

enum Event {
    Prepared(Prepared),
    SeekCompleted,
    Completed,
    Failed(Option<StreamKind>, String),
}

/**
    Forwards engine callbacks to the main thread.
*/
struct Forwarder {
    tx: parking_lot::Mutex<mpsc::Sender<Event>>,
    stop_on_complete: AtomicBool,
}

impl Forwarder {
    fn send(&self, event: Event) {
        let _ = self.tx.lock().send(event);
    }
}

impl EventSink for Forwarder {
    fn on_prepared(&self, prepared: &Prepared) {
        self.send(Event::Prepared(*prepared));
    }

    fn on_seek_completed(&self, _flags: SeekFlags) {
        self.send(Event::SeekCompleted);
    }

    fn on_playback_completed(&self) -> bool {
        self.send(Event::Completed);
        self.stop_on_complete.load(Ordering::SeqCst)
    }

    fn on_error(&self, kind: Option<StreamKind>, error: &Error) {
        self.send(Event::Failed(kind, error.to_string()));
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let capabilities = capabilities(&args)?;
    let (tx, rx) = mpsc::channel();
    let events = Arc::new(Forwarder {
        tx: parking_lot::Mutex::new(tx),
        stop_on_complete: AtomicBool::new(args.repeat == 0),
    });

    let mut engine = Engine::open(&args.source, capabilities, config, events.clone())
        .with_context(|| format!("failed to open {}", args.source))?;

    let mut presenters = Vec::new();
    for (kind, handle) in [
        (StreamKind::Video, engine.video()),
        (StreamKind::Audio, engine.audio()),
        (StreamKind::Subtitle, engine.subtitle()),
    ] {
        if let Some(handle) = handle {
            let frames = Arc::clone(handle.frames());
            presenters.push(
                thread::Builder::new()
                    .name(format!("vidplay-{}", kind.name()))
                    .spawn(move || present(kind, &frames))
                    .context("failed to spawn presenter")?,
            );
        }
    }

    if let Some(position) = args.seek {
        engine.seek(position, 0, args.bytes);
    }

    let deadline = args.timeout.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut loops_left = args.repeat;
    loop {
        if let Err(e) = engine.poll_subtitles() {
            warn!(error = %e, "subtitle decoding failed");
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            info!("timeout reached");
            break;
        }
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(Event::Prepared(prepared)) => info!(?prepared, "streams selected"),
            Ok(Event::SeekCompleted) => debug!("seek completed"),
            Ok(Event::Completed) if loops_left > 0 => {
                loops_left -= 1;
                if loops_left == 0 {
                    events.stop_on_complete.store(true, Ordering::SeqCst);
                }
                info!(loops_left, "looping");
                engine.seek(0, 0, false);
            }
            Ok(Event::Completed) => {
                info!("playback completed");
                break;
            }
            Ok(Event::Failed(kind, message)) => {
                engine.close();
                bail!("{} failed: {message}", kind.map_or("read loop", StreamKind::name));
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    engine.close();
    for presenter in presenters {
        let _ = presenter.join();
    }
    Ok(())
}

fn capabilities(args: &Args) -> Result<Capabilities> {
    if let Some(seconds) = args.synthetic {
        let media = SyntheticMedia::new()
            .with_video(seconds * 25, 25)
            .with_audio(seconds * 25, 48000, 1920)
            .with_subtitles(seconds, 1000);
        return Ok(media.capabilities());
    }
    backend()
}

#[cfg(feature = "ffmpeg")]
fn backend() -> Result<Capabilities> {
    vidcore::ffmpeg::capabilities().context("failed to initialize FFmpeg")
}

#[cfg(not(feature = "ffmpeg"))]
fn backend() -> Result<Capabilities> {
    bail!("built without the ffmpeg feature; use --synthetic")
}

/**
    Wall-clock origin of the current serial.
*/
struct Clock {
    serial: u64,
    start: Instant,
    origin: f64,
}

impl Clock {
    /**
        When a frame with `pts` is due. The clock restarts whenever a new
        serial shows up, so seeks do not stall the presenter.
    */
    fn due(clock: &mut Option<Self>, serial: u64, pts: f64) -> Instant {
        let clock = match clock {
            Some(clock) if clock.serial == serial => clock,
            _ => clock.insert(Self {
                serial,
                start: Instant::now(),
                origin: pts,
            }),
        };
        clock.start + Duration::from_secs_f64((pts - clock.origin).max(0.0))
    }
}

/**
    Show frames of one stream at their presentation time, until the stream is
    closed. Returns the number of frames shown.
*/
fn present(kind: StreamKind, frames: &FrameQueue) -> u64 {
    let mut clock = None;
    let mut shown = 0u64;
    let mut dropped = 0u64;

    loop {
        let Some(frame) = frames.peek_readable() else {
            break;
        };
        let serial = frame.serial;
        let pts = frame.pts;
        let current = serial == frames.packets().serial();
        let summary = match &frame.payload {
            Payload::Picture(raw) | Payload::Samples(raw) => format!("{:?}", raw.format),
            Payload::Subtitle(subtitle) => subtitle.text.join(" / "),
        };
        drop(frame);

        if !current {
            dropped += 1;
            frames.next();
            continue;
        }
        if let Some(pts) = pts {
            let due = Clock::due(&mut clock, serial, pts);
            if let Some(wait) = due.checked_duration_since(Instant::now()) {
                thread::sleep(wait);
            }
        }
        shown += 1;
        debug!(kind = kind.name(), serial, pts, summary = %summary, "present");
        frames.next();
    }
    info!(kind = kind.name(), shown, dropped, "presenter stopped");
    shown
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidcore::NoEvents;

    #[test]
    fn subtitle_presenter_keeps_polling_alive() {
        let media = SyntheticMedia::new().with_video(50, 25).with_subtitles(40, 1);
        let config = EngineConfig {
            enable_subtitles: true,
            ..Default::default()
        };
        let mut engine =
            Engine::open("synthetic://subtitles", media.capabilities(), config, Arc::new(NoEvents))
                .unwrap();
        let frames = Arc::clone(engine.subtitle().unwrap().frames());
        let presenter = thread::spawn(move || present(StreamKind::Subtitle, &frames));

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut polled = 0;
        while polled < 40 && Instant::now() < deadline {
            polled += engine.poll_subtitles().unwrap();
            thread::sleep(Duration::from_millis(5));
        }
        engine.close();
        presenter.join().unwrap();
        assert_eq!(polled, 40);
    }
}
