//! wavescope: plays an audio file while drawing its waveform, a running
//! spectrogram and the notes it hears.
pub mod analyzer;
pub mod app;
pub mod audio_output;
pub mod audio_player;
pub mod builtin_themes;
pub mod config;
pub mod error;
pub mod fft;
pub mod file_reader;
pub mod tui;
pub mod tuning;
pub mod viewport;
