//! Error types shared by the decoder and the playback path.
use thiserror::Error;

/// Failure to turn a file into a [`crate::file_reader::WaveformBuffer`].
///
/// Fatal to the load that raised it. The previously loaded waveform, if any,
/// stays in place.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported or malformed audio: {0}")]
    Format(#[from] symphonia::core::errors::Error),
    #[error("no decodable audio track found")]
    NoTrack,
    #[error("audio track does not declare a sample rate")]
    UnknownSampleRate,
    #[error("file contains no audio samples")]
    Empty,
}

/// Failure of the output device. Reported to whoever asked for playback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("no output device available")]
    NoDevice,
    #[error("output device {0:?} not found")]
    UnknownDevice(String),
    #[error("failed to open output stream: {0}")]
    Open(String),
    #[error("failed to write to output stream: {0}")]
    Write(String),
    #[error("playback worker panicked")]
    WorkerPanicked,
}
