//! Playback clock: streams the loaded waveform to the output device on its own
//! thread and publishes where it is.
//!
//! The delivery thread is the only writer of the position while it runs. The
//! clock itself only writes it while no delivery thread exists (`load`, `seek`
//! when stopped), and passes seeks made during playback to the thread. A seek
//! the thread never got to is applied when the thread ends, so a stopped clock
//! always rests on the last requested position.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Sender, bounded};
use log::{debug, info, warn};

use crate::audio_output::{AudioOutput, AudioSink, StreamFormat};
use crate::error::DeviceError;
use crate::file_reader::WaveformBuffer;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Marks "no seek pending" in [`Shared::seek`].
const NO_SEEK: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    Finished,
    Device(DeviceError),
}

/// Published by the clock, drained by the update tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Sample index of the playhead. Sent after every chunk and every seek.
    Position(usize),
    Started,
    Stopped(StopReason),
}

#[derive(Debug)]
struct Shared {
    position: AtomicUsize,
    playing: AtomicBool,
    stop: AtomicBool,
    seek: AtomicUsize,
}

impl Shared {
    fn take_seek(&self) -> Option<usize> {
        match self.seek.swap(NO_SEEK, Ordering::SeqCst) {
            NO_SEEK => None,
            pos => Some(pos),
        }
    }
}

pub struct PlaybackClock {
    output: Arc<dyn AudioOutput>,
    chunk_size: usize,
    events: Sender<PlaybackEvent>,
    waveform: Option<Arc<WaveformBuffer>>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<Result<(), DeviceError>>>,
}

impl PlaybackClock {
    pub fn new(
        output: Arc<dyn AudioOutput>,
        chunk_size: usize,
        events: Sender<PlaybackEvent>,
    ) -> Self {
        Self {
            output,
            chunk_size: chunk_size.max(1),
            events,
            waveform: None,
            shared: Arc::new(Shared {
                position: AtomicUsize::new(0),
                playing: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                seek: AtomicUsize::new(NO_SEEK),
            }),
            worker: None,
        }
    }

    /// Replaces the waveform. Stops playback and rewinds to the start.
    pub fn load(&mut self, waveform: Arc<WaveformBuffer>) {
        if let Err(err) = self.stop() {
            warn!("previous stream ended with an error: {err}");
        }
        self.waveform = Some(waveform);
        self.shared.seek.store(NO_SEEK, Ordering::Release);
        self.shared.position.store(0, Ordering::Release);
        self.publish(PlaybackEvent::Position(0));
    }

    pub fn position(&self) -> usize {
        self.shared.position.load(Ordering::Acquire)
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> PlaybackState {
        if self.is_playing() {
            PlaybackState::Playing
        } else {
            PlaybackState::Stopped
        }
    }

    /// Starts the delivery thread and waits until it has the device open.
    ///
    /// Does nothing without a waveform or while already playing. If the device
    /// cannot be opened the error is returned and the clock stays stopped.
    pub fn play(&mut self) -> Result<(), DeviceError> {
        let Some(waveform) = self.waveform.clone() else {
            return Ok(());
        };
        if self.is_playing() {
            return Ok(());
        }
        // A thread that ran to the end is finished but still needs joining.
        if let Err(err) = self.reap() {
            warn!("previous stream ended with an error: {err}");
        }

        let last = waveform.len().saturating_sub(1);
        if let Some(pos) = self.shared.take_seek() {
            self.set_position(pos);
        }
        if self.position() >= last {
            self.shared.position.store(0, Ordering::Release);
        }
        self.shared.stop.store(false, Ordering::Release);

        let (ready_tx, ready_rx) = bounded::<Result<(), DeviceError>>(1);
        let worker = Worker {
            output: Arc::clone(&self.output),
            waveform,
            chunk_size: self.chunk_size,
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
        };
        let handle = thread::Builder::new()
            .name("wavescope-playback".into())
            .spawn(move || worker.run(ready_tx))
            .map_err(|err| DeviceError::Open(err.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("playback started at sample {}", self.position());
                self.worker = Some(handle);
                Ok(())
            }
            Ok(Err(err)) => {
                // the worker already returned, the join cannot block
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(DeviceError::WorkerPanicked)
            }
        }
    }

    /// Asks the delivery thread to stop and blocks until it has released the
    /// device. Returns the write error that ended the stream, if there was one.
    pub fn stop(&mut self) -> Result<(), DeviceError> {
        if self.worker.is_none() {
            return Ok(());
        }
        self.shared.stop.store(true, Ordering::Release);
        let outcome = self.reap();
        if let Some(pos) = self.shared.take_seek() {
            self.set_position(pos);
        }
        outcome
    }

    /// Moves the playhead to `pos`, clamped into the waveform.
    pub fn seek(&mut self, pos: usize) {
        let last = self.waveform.as_ref().map_or(0, |w| w.len().saturating_sub(1));
        let pos = pos.min(last);
        if self.is_playing() {
            self.shared.seek.store(pos, Ordering::SeqCst);
            // still running: the thread applies it, before the next chunk or as it exits
            if self.is_playing() {
                debug!("seek to {pos} handed to the delivery thread");
                return;
            }
        }
        if let Err(err) = self.reap() {
            warn!("previous stream ended with an error: {err}");
        }
        self.shared.seek.store(NO_SEEK, Ordering::SeqCst);
        self.set_position(pos);
    }

    /// Only called while no delivery thread exists.
    fn set_position(&self, pos: usize) {
        self.shared.position.store(pos, Ordering::Release);
        self.publish(PlaybackEvent::Position(pos));
    }

    fn reap(&mut self) -> Result<(), DeviceError> {
        match self.worker.take() {
            Some(handle) => handle.join().map_err(|_| DeviceError::WorkerPanicked)?,
            None => Ok(()),
        }
    }

    fn publish(&self, event: PlaybackEvent) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }
}

impl Drop for PlaybackClock {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("stream ended with an error: {err}");
        }
    }
}

/// Everything the delivery thread owns.
struct Worker {
    output: Arc<dyn AudioOutput>,
    waveform: Arc<WaveformBuffer>,
    chunk_size: usize,
    shared: Arc<Shared>,
    events: Sender<PlaybackEvent>,
}

impl Worker {
    fn run(self, ready: Sender<Result<(), DeviceError>>) -> Result<(), DeviceError> {
        let format = StreamFormat::mono(self.waveform.sample_rate());
        let mut sink = match self.output.open(format) {
            Ok(sink) => sink,
            Err(err) => {
                let _ = ready.send(Err(err.clone()));
                return Err(err);
            }
        };
        self.shared.playing.store(true, Ordering::SeqCst);
        let _ = ready.send(Ok(()));
        let _ = self.events.send(PlaybackEvent::Started);

        let outcome = self.deliver(sink.as_mut());
        let outcome = match outcome {
            Ok(StopReason::Finished) => sink.drain().map(|_| StopReason::Finished),
            other => other,
        };
        let closed = sink.close();
        self.shared.playing.store(false, Ordering::SeqCst);
        // a seek that arrived after the last chunk, or while draining
        if let Some(pos) = self.shared.take_seek() {
            self.shared.position.store(pos, Ordering::Release);
            let _ = self.events.send(PlaybackEvent::Position(pos));
        }

        let reason = match &outcome {
            Ok(reason) => reason.clone(),
            Err(err) => StopReason::Device(err.clone()),
        };
        info!("playback stopped: {reason:?}");
        let _ = self.events.send(PlaybackEvent::Stopped(reason));
        outcome.and(closed)
    }

    fn deliver(&self, sink: &mut dyn AudioSink) -> Result<StopReason, DeviceError> {
        let samples = self.waveform.samples();
        let len = samples.len();
        let mut cursor = self.shared.position.load(Ordering::Acquire);

        loop {
            if self.shared.stop.load(Ordering::Acquire) {
                return Ok(StopReason::Requested);
            }
            if let Some(pos) = self.shared.take_seek() {
                cursor = pos;
                self.shared.position.store(pos, Ordering::Release);
                let _ = self.events.send(PlaybackEvent::Position(pos));
            }
            if cursor >= len {
                return Ok(StopReason::Finished);
            }

            let end = (cursor + self.chunk_size).min(len);
            sink.write(&samples[cursor..end])?;
            cursor = end;

            let published = cursor.min(len - 1);
            self.shared.position.store(published, Ordering::Release);
            let _ = self.events.send(PlaybackEvent::Position(published));
        }
    }
}
