/*!
    Decides when a stream's filter graph has to be rebuilt, and moves frames
    through it.
*/

use std::ops::ControlFlow;
use std::sync::Arc;

use ffmpeg_types::{AudioFormat, Error as MediaError, FrameFormat, Rational, RawFrame, StreamInfo};
use tracing::debug;

use crate::capability::{FilterFactory, FilterGraph, FilterSource, Pull};
use crate::error::Result;

/**
    Timing of frames coming out of a graph, and the decode serial of the
    frames that went in.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterOutput {
    pub time_base: Rational,
    pub frame_rate: Option<Rational>,
    pub serial: u64,
}

/**
    Why a drain loop stopped.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Drained {
    WouldBlock,
    EndOfStream,
    /// The sink asked to stop.
    Stopped,
}

#[derive(Clone, Copy, Debug)]
struct GraphSource {
    format: FrameFormat,
    serial: u64,
}

/**
    Per-stream filter graph that is rebuilt whenever the decoded format
    changes.

    Audio graphs are rebuilt when the sample format, channel count or sample
    rate changes; mono streams only compare the packed form of the sample
    format. Video graphs are rebuilt when the size, the pixel format or the
    decode serial changes.

    A new serial always starts a fresh graph: output still buffered in the
    old one predates the seek and is dropped, never handed to the sink.
*/
pub struct FilterStage {
    factory: Arc<dyn FilterFactory>,
    description: Option<String>,
    stream_time_base: Rational,
    frame_rate: Option<Rational>,
    graph: Option<Box<dyn FilterGraph>>,
    source: Option<GraphSource>,
    rebuilds: u64,
}

impl FilterStage {
    pub fn new(
        factory: Arc<dyn FilterFactory>,
        description: Option<String>,
        stream: &StreamInfo,
    ) -> Self {
        Self {
            factory,
            description,
            stream_time_base: stream.time_base,
            frame_rate: stream.frame_rate,
            graph: None,
            source: None,
            rebuilds: 0,
        }
    }

    /**
        Number of graphs built so far.
    */
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn needs_rebuild(&self, format: &FrameFormat, serial: u64) -> bool {
        let Some(source) = &self.source else {
            return true;
        };
        match (&source.format, format) {
            (FrameFormat::Audio(current), FrameFormat::Audio(next)) => {
                audio_format_changed(current, next)
            }
            (FrameFormat::Video(current), FrameFormat::Video(next)) => {
                current.width != next.width
                    || current.height != next.height
                    || current.pixel_format != next.pixel_format
                    || source.serial != serial
            }
            _ => true,
        }
    }

    /**
        Push one decoded frame and hand every frame the graph produces to
        `sink`, until the graph would block or ends.

        When the format changes within a serial, the old graph is drained into
        `sink` first. Frames reach `sink` tagged with the serial of the graph
        that produced them.
    */
    pub fn submit<F>(&mut self, frame: RawFrame, serial: u64, mut sink: F) -> Result<Drained>
    where
        F: FnMut(RawFrame, FilterOutput) -> ControlFlow<()>,
    {
        let stale = self.source.is_some_and(|source| source.serial != serial);
        if stale {
            debug!(serial, "new decode serial, discarding filter graph");
            self.rebuild(frame.format, serial)?;
        } else if self.needs_rebuild(&frame.format, serial) {
            if let (Some(graph), Some(source)) = (self.graph.as_deref_mut(), self.source) {
                if drain(graph, source.serial, &mut sink)? == Drained::Stopped {
                    return Ok(Drained::Stopped);
                }
            }
            self.rebuild(frame.format, serial)?;
        }
        let Some(graph) = self.graph.as_deref_mut() else {
            return Err(MediaError::filter("no filter graph").into());
        };
        graph.push(frame)?;
        drain(graph, serial, &mut sink)
    }

    fn rebuild(&mut self, format: FrameFormat, serial: u64) -> Result<()> {
        let source = match format {
            FrameFormat::Audio(audio) => FilterSource::Audio {
                format: audio,
                time_base: match i32::try_from(audio.sample_rate) {
                    Ok(rate) if rate > 0 => Rational::new(1, rate),
                    _ => self.stream_time_base,
                },
            },
            FrameFormat::Video(video) => FilterSource::Video {
                format: video,
                time_base: self.stream_time_base,
                frame_rate: self.frame_rate,
            },
        };
        self.graph = None;
        self.source = None;
        let graph = self.factory.build(&source, self.description.as_deref())?;
        self.graph = Some(graph);
        self.source = Some(GraphSource { format, serial });
        self.rebuilds += 1;
        debug!(?source, serial, rebuilds = self.rebuilds, "filter graph built");
        Ok(())
    }
}

fn audio_format_changed(current: &AudioFormat, next: &AudioFormat) -> bool {
    if current.sample_rate != next.sample_rate {
        return true;
    }
    if current.channels == 1 && next.channels == 1 {
        current.sample_format.packed() != next.sample_format.packed()
    } else {
        current.channels != next.channels || current.sample_format != next.sample_format
    }
}

fn drain<F>(graph: &mut dyn FilterGraph, serial: u64, sink: &mut F) -> Result<Drained>
where
    F: FnMut(RawFrame, FilterOutput) -> ControlFlow<()>,
{
    let output = FilterOutput {
        time_base: graph.time_base(),
        frame_rate: graph.frame_rate(),
        serial,
    };
    loop {
        match graph.pull()? {
            Pull::Frame(frame) => {
                if sink(frame, output).is_break() {
                    return Ok(Drained::Stopped);
                }
            }
            Pull::WouldBlock => return Ok(Drained::WouldBlock),
            Pull::EndOfStream => return Ok(Drained::EndOfStream),
        }
    }
}
