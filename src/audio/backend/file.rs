//! Raw sample sinks: file, standard output and null
//!
//! Samples are written exactly as received (after channel mapping), so the
//! output can be piped into tools such as `aplay` or `sox` with matching
//! format flags.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use super::{AudioBackend, BackendOptions, PlaybackHandle};
use crate::error::BackendError;
use crate::protocol::StreamConfig;

enum Target {
    File(PathBuf),
    Stdout,
}

/// Writes raw interleaved samples to a file or to stdout
pub struct FileBackend {
    target: Target,
    /// A file is truncated on first open and appended to afterwards
    opened: bool,
}

impl FileBackend {
    /// File backend; the device option names the path (`-` for stdout)
    pub fn file(options: &BackendOptions) -> Result<Self, BackendError> {
        match options.device.as_deref() {
            None | Some("") => Err(BackendError::DeviceNotFound(
                "file backend needs a file path as device".to_string(),
            )),
            Some("-") => Ok(Self::stdout()),
            Some(path) => Ok(Self {
                target: Target::File(PathBuf::from(path)),
                opened: false,
            }),
        }
    }

    pub fn stdout() -> Self {
        Self {
            target: Target::Stdout,
            opened: false,
        }
    }
}

impl AudioBackend for FileBackend {
    fn name(&self) -> &str {
        match self.target {
            Target::File(_) => "file",
            Target::Stdout => "pipe",
        }
    }

    fn open(
        &mut self,
        config: &StreamConfig,
        _buffer_frames: usize,
    ) -> Result<Box<dyn PlaybackHandle>, BackendError> {
        let writer: Box<dyn Write> = match &self.target {
            Target::File(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .append(self.opened)
                    .truncate(!self.opened)
                    .open(path)
                    .map_err(|e| BackendError::OpenFailed(format!("{}: {}", path.display(), e)))?;
                Box::new(BufWriter::new(file))
            }
            Target::Stdout => Box::new(BufWriter::new(io::stdout())),
        };
        self.opened = true;

        tracing::info!("Writing raw {} to {}", config, self.name());
        Ok(Box::new(RawHandle {
            writer,
            stride: config.frame_stride().max(1),
        }))
    }
}

struct RawHandle {
    writer: Box<dyn Write>,
    stride: usize,
}

impl PlaybackHandle for RawHandle {
    fn write(&mut self, interleaved: &[u8]) -> Result<usize, BackendError> {
        self.writer
            .write_all(interleaved)
            .map_err(|e| BackendError::WriteFailed(e.to_string()))?;
        Ok(interleaved.len() / self.stride)
    }

    fn close(mut self: Box<Self>) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!("Failed to flush output: {}", e);
        }
    }
}

/// Discards everything; useful for monitoring a stream without a device
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn open(
        &mut self,
        config: &StreamConfig,
        _buffer_frames: usize,
    ) -> Result<Box<dyn PlaybackHandle>, BackendError> {
        Ok(Box::new(NullHandle {
            stride: config.frame_stride().max(1),
        }))
    }
}

struct NullHandle {
    stride: usize,
}

impl PlaybackHandle for NullHandle {
    fn write(&mut self, interleaved: &[u8]) -> Result<usize, BackendError> {
        Ok(interleaved.len() / self.stride)
    }

    fn close(self: Box<Self>) {}
}
