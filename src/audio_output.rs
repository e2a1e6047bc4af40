//! This module is responsible for getting samples out of the speakers.
//!
//! The playback clock only sees the [`AudioOutput`] and [`AudioSink`] traits; the
//! rodio-backed implementation lives here next to the cpal device listing.
use std::thread;
use std::time::Duration;

use cpal::{
    Device, default_host,
    traits::{DeviceTrait, HostTrait},
};
use log::{info, warn};
use rodio::buffer::SamplesBuffer;

use crate::error::DeviceError;

/// How many chunks may sit in the device queue before `write` starts blocking.
const MAX_QUEUED_CHUNKS: usize = 2;

/// Layout of the samples handed to [`AudioSink::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamFormat {
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }
}

/// Something that can open an output stream.
///
/// `open` is called on the delivery thread, so the returned sink never has to
/// cross threads.
pub trait AudioOutput: Send + Sync + 'static {
    fn open(&self, format: StreamFormat) -> Result<Box<dyn AudioSink>, DeviceError>;
}

/// An open output stream.
pub trait AudioSink {
    /// Queues `chunk` for playback. Blocks while the device is far enough ahead.
    fn write(&mut self, chunk: &[f32]) -> Result<(), DeviceError>;

    /// Waits until everything written so far has been played.
    fn drain(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Releases the device. Anything still queued is dropped.
    fn close(self: Box<Self>) -> Result<(), DeviceError>;
}

/// Plays through rodio on the default or a named cpal output device.
#[derive(Debug, Default, Clone)]
pub struct RodioOutput {
    device_name: Option<String>,
}

impl RodioOutput {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn open_stream(&self) -> Result<rodio::OutputStream, DeviceError> {
        let open_err = |err: rodio::StreamError| DeviceError::Open(err.to_string());
        match &self.device_name {
            Some(name) => {
                let device = find_output_dev(name)?;
                rodio::OutputStreamBuilder::from_device(device)
                    .and_then(|builder| builder.open_stream())
                    .map_err(open_err)
            }
            None => {
                if default_host().default_output_device().is_none() {
                    return Err(DeviceError::NoDevice);
                }
                rodio::OutputStreamBuilder::open_default_stream().map_err(open_err)
            }
        }
    }
}

impl AudioOutput for RodioOutput {
    fn open(&self, format: StreamFormat) -> Result<Box<dyn AudioSink>, DeviceError> {
        let stream = self.open_stream()?;
        let sink = rodio::Sink::connect_new(stream.mixer());
        info!(
            "opened output stream ({} Hz, {} ch) on {}",
            format.sample_rate,
            format.channels,
            self.device_name.as_deref().unwrap_or("default device")
        );
        Ok(Box::new(RodioSink {
            _stream: stream,
            sink,
            format,
        }))
    }
}

struct RodioSink {
    // the stream must outlive the sink, playback stops when it is dropped
    _stream: rodio::OutputStream,
    sink: rodio::Sink,
    format: StreamFormat,
}

impl AudioSink for RodioSink {
    fn write(&mut self, chunk: &[f32]) -> Result<(), DeviceError> {
        self.sink.append(SamplesBuffer::new(
            self.format.channels,
            self.format.sample_rate,
            chunk.to_vec(),
        ));
        while self.sink.len() > MAX_QUEUED_CHUNKS {
            thread::sleep(Duration::from_millis(2));
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), DeviceError> {
        self.sink.sleep_until_end();
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), DeviceError> {
        self.sink.stop();
        info!("closed output stream");
        Ok(())
    }
}

fn find_output_dev(name: &str) -> Result<Device, DeviceError> {
    let host = default_host();
    let mut devs = host
        .output_devices()
        .map_err(|err| DeviceError::Open(err.to_string()))?;
    devs.find(|dev| dev.name().is_ok_and(|n| n == name))
        .ok_or_else(|| DeviceError::UnknownDevice(name.to_string()))
}

/// Names of every output device on the default host, sorted.
pub fn list_output_devs() -> Vec<String> {
    let host = default_host();
    let mut devs: Vec<String> = match host.output_devices() {
        Ok(devs) => devs
            .map(|dev| dev.name().unwrap_or_else(|_| String::from("<unknown>")))
            .collect(),
        Err(err) => {
            warn!("could not enumerate output devices: {err}");
            Vec::new()
        }
    };
    devs.sort();
    devs
}
