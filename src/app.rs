//! The update-tick side of the application.
//!
//! [`Session`] owns the playback clock, the viewport and the analyzer. The
//! renderer calls [`Session::tick`] at a fixed interval; input handlers call the
//! `on_*` methods. Nothing here runs on the delivery thread: positions arrive
//! over a channel and the session only ever reads them.
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, unbounded};
use log::{info, warn};

use crate::analyzer::{Analysis, NoteEvent, SpectralAnalyzer, SpectrogramHistory};
use crate::audio_output::AudioOutput;
use crate::audio_player::{PlaybackClock, PlaybackEvent, PlaybackState, StopReason};
use crate::config::{Config, ViewConfig};
use crate::error::{DecodeError, DeviceError};
use crate::file_reader::{self, WaveformBuffer};
use crate::tuning::PIANO_KEYS;
use crate::viewport::{Viewport, ViewportEvent, WaveColumn, ZoomAxis};

/// Notifications for the renderer, drained with [`Session::drain_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    PositionChanged(usize),
    ZoomChanged { horizontal: f64, vertical: f64 },
    ScrollChanged(f64),
    PlaybackError(DeviceError),
}

impl From<ViewportEvent> for UiEvent {
    fn from(event: ViewportEvent) -> Self {
        match event {
            ViewportEvent::ZoomChanged {
                horizontal,
                vertical,
            } => UiEvent::ZoomChanged {
                horizontal,
                vertical,
            },
            ViewportEvent::ScrollChanged(offset) => UiEvent::ScrollChanged(offset),
        }
    }
}

pub struct Session {
    clock: PlaybackClock,
    playback_rx: Receiver<PlaybackEvent>,
    viewport: Viewport,
    analyzer: SpectralAnalyzer,
    view: ViewConfig,
    waveform: Option<Arc<WaveformBuffer>>,
    file_path: Option<PathBuf>,
    /// Latest position published by the clock.
    position: usize,
    events: VecDeque<UiEvent>,
}

impl Session {
    pub fn new(output: Arc<dyn AudioOutput>, config: &Config) -> Self {
        let (playback_tx, playback_rx) = unbounded();
        info!("analysis mode {:?}", config.analysis.mode);
        Self {
            clock: PlaybackClock::new(output, config.playback.chunk_size, playback_tx),
            playback_rx,
            viewport: Viewport::default(),
            analyzer: SpectralAnalyzer::new(config.analysis.clone()),
            view: config.view.clone(),
            waveform: None,
            file_path: None,
            position: 0,
            events: VecDeque::new(),
        }
    }

    /// Decodes `path` and makes it the current waveform. On failure the
    /// previous waveform stays loaded.
    pub fn load(&mut self, path: &Path) -> Result<(), DecodeError> {
        let waveform = file_reader::read_file(path)?;
        self.load_waveform(waveform);
        self.file_path = Some(path.to_path_buf());
        Ok(())
    }

    pub fn load_waveform(&mut self, waveform: WaveformBuffer) {
        let waveform = Arc::new(waveform);
        self.clock.load(Arc::clone(&waveform));
        let events = self.viewport.set_waveform_len(waveform.len());
        self.push_viewport_events(events);
        self.analyzer.reset();
        self.waveform = Some(waveform);
        self.file_path = None;
        self.position = 0;
    }

    pub fn play(&mut self) -> Result<(), DeviceError> {
        self.clock.play()
    }

    pub fn stop(&mut self) -> Result<(), DeviceError> {
        self.clock.stop()
    }

    pub fn toggle(&mut self) -> Result<(), DeviceError> {
        match self.clock.state() {
            PlaybackState::Playing => self.stop(),
            PlaybackState::Stopped => self.play(),
        }
    }

    pub fn seek(&mut self, sample: usize) {
        self.clock.seek(sample);
    }

    /// One update tick: picks up published positions, analyses the window
    /// under the playhead, and keeps the playhead on screen while playing.
    pub fn tick(&mut self, width: usize) {
        let mut moved = false;
        for event in self.playback_rx.try_iter() {
            match event {
                PlaybackEvent::Position(pos) => {
                    self.position = pos;
                    self.events.push_back(UiEvent::PositionChanged(pos));
                    moved = true;
                }
                PlaybackEvent::Started => {}
                PlaybackEvent::Stopped(StopReason::Device(err)) => {
                    warn!("playback interrupted: {err}");
                    self.events.push_back(UiEvent::PlaybackError(err));
                }
                PlaybackEvent::Stopped(_) => {}
            }
        }

        let Some(waveform) = self.waveform.clone() else {
            return;
        };
        let playing = self.clock.is_playing();
        if moved || playing {
            self.analyzer.analyze(&waveform, self.position);
        }
        if playing && self.view.follow_playhead {
            if let Some(event) = self.viewport.ensure_visible(self.position, width) {
                self.events.push_back(event.into());
            }
        }
    }

    /// Seeks to the sample under column `x`.
    pub fn on_click(&mut self, x: usize, width: usize) {
        if self.waveform.is_none() {
            return;
        }
        let sample = self.viewport.sample_for_pixel(x, width);
        self.seek(sample);
    }

    /// Scrolls by `steps` scroll steps; one step is a configured fraction of
    /// the viewport width.
    pub fn on_scroll(&mut self, steps: f64, width: usize) {
        let pixels = steps * self.view.scroll_step * width as f64;
        let delta = pixels
            * self.viewport.samples_per_pixel(width) as f64
            * self.viewport.horizontal_zoom();
        if let Some(event) = self.viewport.scroll_by(delta, width) {
            self.events.push_back(event.into());
        }
    }

    /// Zooms in (`delta > 0`) or out by `delta` zoom steps.
    pub fn on_zoom_gesture(&mut self, delta: f64, axis: ZoomAxis, width: usize) {
        let factor = self.view.zoom_step.powf(delta);
        let events = self.viewport.zoom_by(factor, axis, width);
        self.push_viewport_events(events);
    }

    pub fn render_columns(&self, width: usize) -> Vec<WaveColumn> {
        match &self.waveform {
            Some(waveform) => self.viewport.render_columns(waveform.samples(), width),
            None => Vec::new(),
        }
    }

    /// Column of the playhead, if it is on screen.
    pub fn playhead_pixel(&self, width: usize) -> Option<usize> {
        self.waveform.as_ref()?;
        let px = self.viewport.pixel_for_sample(self.position, width);
        (0..width as i64).contains(&px).then_some(px as usize)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = UiEvent> + '_ {
        self.events.drain(..)
    }

    pub fn current_dominant_notes(&self) -> &[NoteEvent] {
        self.analyzer.current_dominant_notes()
    }

    pub fn current_spectrogram_history(&self) -> &SpectrogramHistory {
        self.analyzer.current_spectrogram_history()
    }

    pub fn key_intensities(&self) -> &[f32; PIANO_KEYS] {
        self.analyzer.key_intensities()
    }

    pub fn analysis(&self) -> &Analysis {
        self.analyzer.current()
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn waveform(&self) -> Option<&Arc<WaveformBuffer>> {
        self.waveform.as_ref()
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    pub fn elapsed(&self) -> Duration {
        match &self.waveform {
            Some(w) => Duration::from_secs_f64(self.position as f64 / w.sample_rate() as f64),
            None => Duration::ZERO,
        }
    }

    pub fn duration(&self) -> Duration {
        self.waveform.as_ref().map_or(Duration::ZERO, |w| w.duration())
    }

    fn push_viewport_events(&mut self, events: Vec<ViewportEvent>) {
        self.events.extend(events.into_iter().map(UiEvent::from));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_output::mock::MockOutput;
    use crate::file_reader::tests::write_wav;
    use std::time::Instant;

    fn session(output: MockOutput) -> Session {
        Session::new(Arc::new(output), &Config::default())
    }

    fn sine(freq: f32, rate: u32, len: usize) -> WaveformBuffer {
        let samples = (0..len)
            .map(|i| 0.8 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect();
        WaveformBuffer::new(samples, rate)
    }

    fn tick_until(
        session: &mut Session,
        width: usize,
        done: impl Fn(&Session) -> bool,
    ) -> Vec<UiEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        loop {
            session.tick(width);
            events.extend(session.drain_events());
            if done(session) {
                return events;
            }
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn click_seeks_to_the_mapped_sample() {
        let mut session = session(MockOutput::default());
        session.load_waveform(sine(440.0, 44100, 44100));
        session.on_click(250, 500);
        session.tick(500);
        assert_eq!(session.position(), 250 * 88);
        let events: Vec<_> = session.drain_events().collect();
        assert_eq!(events.last(), Some(&UiEvent::PositionChanged(22000)));
    }

    #[test]
    fn tick_names_the_note_under_the_playhead() {
        let mut session = session(MockOutput::default());
        session.load_waveform(sine(440.0, 44100, 44100));
        session.tick(500);
        let names: Vec<String> = session
            .current_dominant_notes()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names.first().map(String::as_str), Some("A4"));
        assert_eq!(session.current_spectrogram_history().len(), 1);
    }

    #[test]
    fn idle_ticks_do_not_grow_the_history() {
        let mut session = session(MockOutput::default());
        session.load_waveform(sine(440.0, 44100, 4410));
        for _ in 0..5 {
            session.tick(100);
        }
        assert_eq!(session.current_spectrogram_history().len(), 1);
    }

    #[test]
    fn zoom_and_scroll_gestures_report_changes() {
        let mut session = session(MockOutput::default());
        session.load_waveform(sine(440.0, 44100, 44100));

        session.on_zoom_gesture(-3.0, ZoomAxis::Horizontal, 500);
        assert_eq!(session.viewport().horizontal_zoom(), 1.0);
        assert_eq!(session.drain_events().count(), 0);

        session.on_zoom_gesture(2.0, ZoomAxis::Horizontal, 500);
        session.on_scroll(1.0, 500);
        let events: Vec<_> = session.drain_events().collect();
        assert!(matches!(events[0], UiEvent::ZoomChanged { vertical, .. } if vertical == 1.0));
        assert!(matches!(events[1], UiEvent::ScrollChanged(offset) if offset > 0.0));

        session.on_scroll(-100.0, 500);
        assert_eq!(session.viewport().scroll_offset(), 0.0);
    }

    #[test]
    fn playback_moves_the_playhead_forward() {
        let mut session = session(MockOutput::slow(1));
        session.load_waveform(sine(440.0, 44100, 8192));
        session.play().unwrap();
        let events = tick_until(&mut session, 200, |s| !s.is_playing() && s.position() == 8191);
        let positions: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                UiEvent::PositionChanged(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
        assert!(!session.current_spectrogram_history().is_empty());
        session.stop().unwrap();
    }

    #[test]
    fn device_failures_reach_the_ui() {
        let output = MockOutput {
            fail_open: true,
            ..Default::default()
        };
        let mut session = session(output);
        session.load_waveform(sine(440.0, 44100, 4096));
        assert!(session.toggle().is_err());
        assert!(!session.is_playing());

        let output = MockOutput {
            fail_write_at: Some(1),
            ..Default::default()
        };
        let mut session = self::session(output);
        session.load_waveform(sine(440.0, 44100, 4096));
        session.play().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            session.tick(200);
            if session
                .drain_events()
                .any(|e| matches!(e, UiEvent::PlaybackError(DeviceError::Write(_))))
            {
                break;
            }
            assert!(Instant::now() < deadline, "write error never reported");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(matches!(session.stop(), Err(DeviceError::Write(_))));
        assert!(!session.is_playing());
    }

    #[test]
    fn loads_files_and_keeps_the_old_one_on_failure() {
        let path = write_wav("session-load", 1, 8000, &[1000; 800]);
        let mut session = session(MockOutput::default());
        session.load(&path).unwrap();
        assert_eq!(session.file_path(), Some(path.as_path()));
        assert!((session.duration().as_secs_f64() - 0.1).abs() < 1e-9);

        let missing = std::env::temp_dir().join("wavescope-session-missing.wav");
        assert!(session.load(&missing).is_err());
        assert_eq!(session.file_path(), Some(path.as_path()));
        assert_eq!(session.waveform().map(|w| w.len()), Some(800));
    }

    #[test]
    fn playhead_pixel_is_hidden_off_screen() {
        let mut session = session(MockOutput::default());
        assert_eq!(session.playhead_pixel(100), None);
        session.load_waveform(sine(440.0, 44100, 44100));
        session.tick(100);
        assert_eq!(session.playhead_pixel(100), Some(0));

        session.on_zoom_gesture(10.0, ZoomAxis::Horizontal, 100);
        session.seek(44099);
        session.tick(100);
        assert_eq!(session.playhead_pixel(100), None);
    }
}
