use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::DecodeError;

pub type SampleRate = u32;

/// Decoded mono samples of a whole file.
///
/// Cheap to clone and never mutated; loading another file replaces the buffer.
#[derive(Debug, Clone)]
pub struct WaveformBuffer {
    samples: Arc<[f32]>,
    sample_rate: SampleRate,
}

impl WaveformBuffer {
    /// Wraps already-decoded samples, clamping them into `[-1, 1]`.
    pub fn new(samples: Vec<f32>, sample_rate: SampleRate) -> Self {
        let samples: Vec<f32> = samples.into_iter().map(|s| s.clamp(-1., 1.)).collect();
        Self {
            samples: samples.into(),
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    /// Mono file, so frames and samples are the same thing.
    pub fn frame_count(&self) -> usize {
        self.samples.len()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Samples in `range`, cut off at the end of the buffer.
    pub fn slice(&self, range: Range<usize>) -> &[f32] {
        let end = range.end.min(self.samples.len());
        let start = range.start.min(end);
        &self.samples[start..end]
    }
}

/// Decodes the file at `path` into a mono [`WaveformBuffer`].
///
/// Multichannel audio is downmixed by averaging the channels of each frame.
pub fn read_file(path: &Path) -> Result<WaveformBuffer, DecodeError> {
    let src = std::fs::File::open(path).map_err(|source| DecodeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    // Create a probe hint using the file's extension.
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
    let mut format = probed.format;

    // Find the first audio track with a known (decodeable) codec.
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map_or(0, |c| c.count());

    let dec_opts: DecoderOptions = Default::default();
    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &dec_opts)?;

    let mut mono = Vec::<f32>::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(Error::ResetRequired) => break,
            Err(err) => return Err(err.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let audio_buf = match decoder.decode(&packet) {
            Ok(audio_buf) => audio_buf,
            Err(Error::DecodeError(err)) => {
                debug!("skipping undecodable packet: {err}");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let spec = *audio_buf.spec();
        sample_rate.get_or_insert(spec.rate);
        if channels == 0 {
            channels = spec.channels.count();
        }

        let mut buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
        buf.copy_interleaved_ref(audio_buf);
        downmix_into(&mut mono, buf.samples(), channels.max(1));
    }

    let sample_rate = sample_rate.ok_or(DecodeError::UnknownSampleRate)?;
    if mono.is_empty() {
        return Err(DecodeError::Empty);
    }

    let waveform = WaveformBuffer::new(mono, sample_rate);
    info!(
        "decoded {}: {} samples, {} Hz, {:.1}s",
        path.display(),
        waveform.len(),
        sample_rate,
        waveform.duration().as_secs_f32()
    );
    Ok(waveform)
}

fn downmix_into(out: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    /// Writes a 16-bit PCM WAV file into the temp dir and returns its path.
    pub(crate) fn write_wav(name: &str, channels: u16, rate: u32, frames: &[i16]) -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("wavescope-{}-{name}.wav", std::process::id()));
        let data_len = (frames.len() * 2) as u32;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * channels as u32 * 2).to_le_bytes());
        bytes.extend_from_slice(&(channels * 2).to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for s in frames {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&bytes).unwrap();
        path
    }

    #[test]
    fn reads_mono_wav() {
        let path = write_wav("mono", 1, 8000, &[0, 16384, -16384, 8192]);
        let wf = read_file(&path).unwrap();
        assert_eq!(wf.sample_rate(), 8000);
        assert_eq!(wf.frame_count(), 4);
        assert_eq!(wf.samples(), &[0.0, 0.5, -0.5, 0.25]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn downmixes_stereo_by_mean() {
        let path = write_wav("stereo", 2, 44100, &[16384, 0, -16384, -16384, 8192, 8192]);
        let wf = read_file(&path).unwrap();
        assert_eq!(wf.len(), 3);
        assert_eq!(wf.samples(), &[0.25, -0.5, 0.25]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_file(Path::new("/definitely/not/here.wav")).unwrap_err();
        assert!(matches!(err, DecodeError::Io { .. }));
    }

    #[test]
    fn garbage_is_format_error() {
        let path = std::env::temp_dir().join(format!("wavescope-{}-junk.wav", std::process::id()));
        std::fs::write(&path, b"this is not a riff file at all").unwrap();
        let err = read_file(&path).unwrap_err();
        assert!(matches!(err, DecodeError::Format(_)));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn buffer_clamps_and_slices() {
        let wf = WaveformBuffer::new(vec![2.0, -3.0, 0.5], 10);
        assert_eq!(wf.samples(), &[1.0, -1.0, 0.5]);
        assert_eq!(wf.slice(1..10), &[-1.0, 0.5]);
        assert!(wf.slice(5..9).is_empty());
        assert!((wf.duration().as_secs_f64() - 0.3).abs() < 1e-9);
    }
}
