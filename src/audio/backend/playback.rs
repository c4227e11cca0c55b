//! System audio output through cpal
//!
//! The cpal callback runs on its own thread and pulls from a bounded
//! [`SampleQueue`]. `write` converts the wire samples to `f32` and blocks
//! until they fit in the queue, so the receive loop runs at the device's
//! pace. Stream errors reported by cpal surface as write failures.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use super::{AudioBackend, BackendOptions, PlaybackHandle};
use crate::audio::buffer::{SampleQueue, SharedSampleQueue};
use crate::audio::convert::extend_f32;
use crate::audio::device::{get_output_device, supports_output};
use crate::error::BackendError;
use crate::protocol::StreamConfig;

/// Shortest time a write may wait for queue space before the output is
/// considered stalled
const MIN_STALL_TIMEOUT: Duration = Duration::from_millis(500);

/// cpal output device
pub struct CpalBackend {
    device: cpal::Device,
    device_name: String,
}

impl CpalBackend {
    pub fn new(options: &BackendOptions) -> Result<Self, BackendError> {
        let device = get_output_device(options.device.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        tracing::info!("Using output device {}", device_name);
        Ok(Self {
            device,
            device_name,
        })
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(
        &mut self,
        config: &StreamConfig,
        buffer_frames: usize,
    ) -> Result<Box<dyn PlaybackHandle>, BackendError> {
        if config.encoding.bytes_per_sample().is_none() {
            return Err(BackendError::UnsupportedFormat(config.encoding.to_string()));
        }

        if !supports_output(&self.device, config.channels, config.sample_rate) {
            return Err(BackendError::UnsupportedFormat(format!(
                "{} not offered by {}",
                config, self.device_name
            )));
        }

        let sample_format = self
            .device
            .default_output_config()
            .map_err(|e| BackendError::CpalError(e.to_string()))?
            .sample_format();

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let queue: SharedSampleQueue = Arc::new(SampleQueue::new(
            buffer_frames.saturating_mul(config.channels as usize),
        ));
        let (error_tx, error_rx) = bounded::<String>(16);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&self.device, &stream_config, queue.clone(), error_tx)
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&self.device, &stream_config, queue.clone(), error_tx)
            }
            cpal::SampleFormat::I32 => {
                build_stream::<i32>(&self.device, &stream_config, queue.clone(), error_tx)
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&self.device, &stream_config, queue.clone(), error_tx)
            }
            other => {
                return Err(BackendError::UnsupportedFormat(format!(
                    "device sample format {:?}",
                    other
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| BackendError::OpenFailed(e.to_string()))?;

        // Twice the buffer period, so a healthy device always drains in time
        let period = Duration::from_secs_f64(buffer_frames as f64 / config.sample_rate as f64);
        let stall_timeout = (period * 2).max(MIN_STALL_TIMEOUT);

        tracing::info!(
            "Opened {} on {} ({:?}, queue of {} samples)",
            config,
            self.device_name,
            sample_format,
            queue.capacity()
        );

        Ok(Box::new(CpalHandle {
            stream,
            queue,
            errors: error_rx,
            config: *config,
            scratch: Vec::new(),
            stall_timeout,
        }))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: SharedSampleQueue,
    error_tx: Sender<String>,
) -> Result<cpal::Stream, BackendError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut mix: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if mix.len() < data.len() {
                    mix.resize(data.len(), 0.0);
                }
                let mix = &mut mix[..data.len()];
                queue.pop_into(mix);
                for (out, &sample) in data.iter_mut().zip(mix.iter()) {
                    *out = <T as Sample>::from_sample(sample);
                }
            },
            move |err| {
                let _ = error_tx.try_send(err.to_string());
            },
            None,
        )
        .map_err(|e| BackendError::OpenFailed(e.to_string()))
}

struct CpalHandle {
    stream: cpal::Stream,
    queue: SharedSampleQueue,
    errors: Receiver<String>,
    config: StreamConfig,
    scratch: Vec<f32>,
    stall_timeout: Duration,
}

impl PlaybackHandle for CpalHandle {
    fn write(&mut self, interleaved: &[u8]) -> Result<usize, BackendError> {
        if let Ok(err) = self.errors.try_recv() {
            return Err(BackendError::WriteFailed(err));
        }

        self.scratch.clear();
        extend_f32(self.config.encoding, interleaved, &mut self.scratch);

        let pushed = self.queue.push_blocking(&self.scratch, self.stall_timeout);
        if pushed < self.scratch.len() {
            return Err(BackendError::WriteFailed(format!(
                "output stalled, {} of {} samples queued",
                pushed,
                self.scratch.len()
            )));
        }

        Ok(self.scratch.len() / self.config.channels.max(1) as usize)
    }

    fn close(self: Box<Self>) {
        if let Err(e) = self.stream.pause() {
            tracing::debug!("Failed to pause stream: {}", e);
        }
        if !self.queue.is_empty() {
            tracing::debug!("Dropping {} queued samples", self.queue.len());
        }
        tracing::debug!("Closing output, {} underruns", self.queue.underrun_count());
    }
}
