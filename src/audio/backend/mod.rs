//! Playback backend contract and registry
//!
//! The receptor only talks to [`AudioBackend`] and [`PlaybackHandle`].
//! Concrete backends are registered by name in a [`BackendRegistry`] and
//! selected at startup.

pub mod file;
pub mod playback;

pub use file::{FileBackend, NullBackend};
pub use playback::CpalBackend;

use crate::error::BackendError;
use crate::protocol::{StreamConfig, MAX_PACKET_SIZE};

/// Frames requested at quality 0, before the safety factor
pub const BASE_BUFFER_FRAMES: usize = 512;

/// Smallest buffer ever requested from a backend, in frames
pub const MIN_BUFFER_FRAMES: usize = MAX_PACKET_SIZE;

/// Highest accepted quality value
pub const MAX_QUALITY: u8 = 16;

/// Buffer size requested for a network quality setting
///
/// `512 * 2^quality * 3`, never below [`MIN_BUFFER_FRAMES`]. Higher quality
/// trades latency for tolerance to network jitter.
pub fn requested_buffer_frames(quality: u8) -> usize {
    let quality = quality.min(MAX_QUALITY);
    (BASE_BUFFER_FRAMES << quality)
        .saturating_mul(3)
        .max(MIN_BUFFER_FRAMES)
}

/// An open output
pub trait PlaybackHandle {
    /// Play interleaved samples in the format the handle was opened with
    ///
    /// May block for roughly one buffer period. Returns frames accepted.
    fn write(&mut self, interleaved: &[u8]) -> Result<usize, BackendError>;

    /// Release the output
    fn close(self: Box<Self>);
}

/// A playback device able to open outputs for a given format
pub trait AudioBackend {
    fn name(&self) -> &str;

    fn open(
        &mut self,
        config: &StreamConfig,
        buffer_frames: usize,
    ) -> Result<Box<dyn PlaybackHandle>, BackendError>;
}

/// Options shared by all backend constructors
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    /// Device name, file path or stream name depending on the backend
    pub device: Option<String>,
}

type Constructor =
    Box<dyn Fn(&BackendOptions) -> Result<Box<dyn AudioBackend>, BackendError> + Send + Sync>;

struct BackendEntry {
    name: &'static str,
    description: &'static str,
    constructor: Constructor,
}

/// Maps backend names to constructors
pub struct BackendRegistry {
    entries: Vec<BackendEntry>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registry with every backend shipped in this crate
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("cpal", "system audio output (device = output device name)", |opts| {
            Ok(Box::new(CpalBackend::new(opts)?))
        });
        registry.register("file", "raw samples to a file (device = file path)", |opts| {
            Ok(Box::new(FileBackend::file(opts)?))
        });
        registry.register("pipe", "raw samples to standard output", |_| {
            Ok(Box::new(FileBackend::stdout()))
        });
        registry.register("null", "discard samples", |_| Ok(Box::new(NullBackend::new())));
        registry
    }

    /// Add a backend, replacing any previous one with the same name
    pub fn register<F>(&mut self, name: &'static str, description: &'static str, constructor: F)
    where
        F: Fn(&BackendOptions) -> Result<Box<dyn AudioBackend>, BackendError>
            + Send
            + Sync
            + 'static,
    {
        self.entries.retain(|e| e.name != name);
        self.entries.push(BackendEntry {
            name,
            description,
            constructor: Box::new(constructor),
        });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Registered names, in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }

    /// One line per backend, for usage messages
    pub fn help(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("  {:<6} {}", e.name, e.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn create(
        &self,
        name: &str,
        options: &BackendOptions,
    ) -> Result<Box<dyn AudioBackend>, BackendError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| BackendError::UnknownBackend(name.to_string()))?;
        tracing::debug!("Creating backend {}", entry.name);
        (entry.constructor)(options)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_frames_values() {
        assert_eq!(requested_buffer_frames(0), 1536);
        assert_eq!(requested_buffer_frames(1), 3072);
        assert_eq!(requested_buffer_frames(2), 6144);
    }

    #[test]
    fn test_buffer_frames_monotonic() {
        for quality in 0..5u8 {
            let frames = requested_buffer_frames(quality);
            assert!(frames >= MIN_BUFFER_FRAMES);
            assert!(requested_buffer_frames(quality + 1) > frames);
        }
    }

    #[test]
    fn test_buffer_frames_clamped() {
        assert_eq!(requested_buffer_frames(u8::MAX), requested_buffer_frames(MAX_QUALITY));
    }

    #[test]
    fn test_registry_defaults() {
        let registry = BackendRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["cpal", "file", "pipe", "null"]);
        assert!(registry.contains("null"));
        assert!(!registry.contains("alsa"));
        assert!(registry.help().contains("pipe"));
    }

    #[test]
    fn test_registry_create() {
        let registry = BackendRegistry::with_defaults();
        let backend = registry.create("null", &BackendOptions::default()).unwrap();
        assert_eq!(backend.name(), "null");

        let err = registry
            .create("alsa", &BackendOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, BackendError::UnknownBackend(name) if name == "alsa"));
    }

    #[test]
    fn test_registry_replaces_by_name() {
        let mut registry = BackendRegistry::new();
        registry.register("out", "first", |_| Ok(Box::new(NullBackend::new())));
        registry.register("out", "second", |_| Ok(Box::new(NullBackend::new())));
        assert_eq!(registry.names(), vec!["out"]);
        assert!(registry.help().contains("second"));
    }
}
