//! Receive loop: datagram in, validated audio out
//!
//! ```text
//!   socket ──► DatagramBuffer ──► validate ──► ChannelMap ──► PlaybackHandle
//!     ▲                              │
//!     └──── beacon every N turns     └── rejected: counted, dropped
//! ```
//!
//! The loop is single threaded. The socket read timeout bounds how long a
//! shutdown request can go unnoticed, and a blocking backend write paces the
//! loop to the output device.

use bytes::Bytes;
use std::collections::BTreeMap;

use crate::audio::{AudioBackend, ChannelMap, PlaybackHandle};
use crate::error::{BackendError, Result};
use crate::network::{DatagramBuffer, DatagramSocket};
use crate::protocol::{validate, StreamConfig, StreamName};
use crate::shutdown::ShutdownToken;

/// Receptor parameters resolved from the command line and config file
#[derive(Debug, Clone)]
pub struct ReceptorSettings {
    pub stream_name: StreamName,
    /// Source channels to play, 0-based; empty plays all
    pub channel_selection: Vec<usize>,
    pub buffer_frames: usize,
    /// Loop iterations between two service beacons
    pub beacon_interval: u32,
}

/// Counters reported when the loop exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceptorStats {
    pub datagrams: u64,
    pub accepted: u64,
    /// Rejections per reason label
    pub rejected: BTreeMap<&'static str, u64>,
    pub frames_written: u64,
    pub backend_opens: u64,
    pub backend_reopens: u64,
    pub write_failures: u64,
    pub receive_errors: u64,
    pub beacons_sent: u64,
    pub beacon_failures: u64,
    /// Datagrams the socket dropped because of their source address
    pub foreign_datagrams: u64,
}

impl ReceptorStats {
    pub fn rejected_total(&self) -> u64 {
        self.rejected.values().sum()
    }

    pub fn log_summary(&self) {
        tracing::info!(
            "Datagrams: {}, accepted: {}, rejected: {}, frames written: {}",
            self.datagrams,
            self.accepted,
            self.rejected_total(),
            self.frames_written
        );
        for (reason, count) in &self.rejected {
            tracing::info!("  rejected ({}): {}", reason, count);
        }
        if self.foreign_datagrams > 0 {
            tracing::info!("  from other sources: {}", self.foreign_datagrams);
        }
        tracing::info!(
            "Backend opens: {}, reopens: {}, write failures: {}",
            self.backend_opens,
            self.backend_reopens,
            self.write_failures
        );
        tracing::info!(
            "Receive errors: {}, beacons: {} ({} failed)",
            self.receive_errors,
            self.beacons_sent,
            self.beacon_failures
        );
    }
}

/// An open output and the format it was opened for
struct Session {
    handle: Box<dyn PlaybackHandle>,
    /// Format of the packets feeding this session
    input: StreamConfig,
    map: ChannelMap,
}

/// Owns the backend and at most one open session
struct Player {
    backend: Box<dyn AudioBackend>,
    selection: Vec<usize>,
    buffer_frames: usize,
    session: Option<Session>,
    scratch: Vec<u8>,
    /// Set after a reopen until the next successful write
    recovering: bool,
}

impl Player {
    fn new(backend: Box<dyn AudioBackend>, selection: Vec<usize>, buffer_frames: usize) -> Self {
        Self {
            backend,
            selection,
            buffer_frames,
            session: None,
            scratch: Vec::new(),
            recovering: false,
        }
    }

    fn open(&mut self, input: &StreamConfig) -> std::result::Result<Session, BackendError> {
        let map = ChannelMap::build(&self.selection, input.channels);
        let output = map.output_config(input);
        tracing::debug!(
            "Opening {} backend for {} (output {}, {} frames)",
            self.backend.name(),
            input,
            output,
            self.buffer_frames
        );
        let handle = self.backend.open(&output, self.buffer_frames)?;
        Ok(Session {
            handle,
            input: *input,
            map,
        })
    }

    /// Play one accepted payload, opening or switching the output as needed
    ///
    /// Errors returned here are fatal for the loop.
    fn deliver(
        &mut self,
        config: &StreamConfig,
        payload: &[u8],
        stats: &mut ReceptorStats,
    ) -> std::result::Result<(), BackendError> {
        let session = match self.session.take() {
            Some(session) if session.input == *config => session,
            previous => {
                if let Some(previous) = previous {
                    tracing::info!("Stream format changed from {} to {}", previous.input, config);
                    previous.handle.close();
                } else {
                    tracing::info!("Receiving {}", config);
                }
                let session = self.open(config)?;
                stats.backend_opens += 1;
                self.recovering = false;
                session
            }
        };
        let session = self.session.insert(session);

        let data: &[u8] = if session.map.is_identity() {
            payload
        } else {
            session.map.apply(&session.input, payload, &mut self.scratch);
            &self.scratch
        };

        match session.handle.write(data) {
            Ok(frames) => {
                stats.frames_written += frames as u64;
                self.recovering = false;
                Ok(())
            }
            Err(e) => {
                stats.write_failures += 1;
                if self.recovering {
                    tracing::error!("Write failed again after reopening the output: {}", e);
                    return Err(e);
                }
                tracing::warn!("Write failed: {}, reopening the output", e);
                let input = session.input;
                self.reopen(&input)?;
                stats.backend_reopens += 1;
                Ok(())
            }
        }
    }

    /// Close the current output and open it again with the same format
    fn reopen(&mut self, input: &StreamConfig) -> std::result::Result<(), BackendError> {
        if let Some(session) = self.session.take() {
            session.handle.close();
        }
        match self.open(input) {
            Ok(session) => {
                self.session = Some(session);
                self.recovering = true;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to reopen the output: {}", e);
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!("Closing {} backend", self.backend.name());
            session.handle.close();
        }
    }
}

/// The receptor pipeline over any datagram transport
pub struct Receptor<S: DatagramSocket> {
    socket: S,
    player: Player,
    stream_name: StreamName,
    beacon: Bytes,
    beacon_interval: u32,
    since_beacon: u32,
    buffer: DatagramBuffer,
    stats: ReceptorStats,
}

impl<S: DatagramSocket> Receptor<S> {
    pub fn new(
        socket: S,
        backend: Box<dyn AudioBackend>,
        settings: ReceptorSettings,
        beacon: Bytes,
    ) -> Self {
        Self {
            socket,
            player: Player::new(backend, settings.channel_selection, settings.buffer_frames),
            stream_name: settings.stream_name,
            beacon,
            beacon_interval: settings.beacon_interval.max(1),
            since_beacon: 0,
            buffer: DatagramBuffer::new(),
            stats: ReceptorStats::default(),
        }
    }

    pub fn stats(&self) -> &ReceptorStats {
        &self.stats
    }

    fn send_beacon(&mut self) {
        match self.socket.send_datagram(&self.beacon) {
            Ok(_) => self.stats.beacons_sent += 1,
            Err(e) => {
                self.stats.beacon_failures += 1;
                tracing::warn!("Failed to send service beacon: {}", e);
            }
        }
    }

    /// One loop iteration: maybe announce, receive, validate, play
    pub fn step(&mut self) -> Result<()> {
        if self.since_beacon >= self.beacon_interval {
            self.send_beacon();
            self.since_beacon = 0;
        }
        self.since_beacon += 1;

        match self.socket.recv_datagram(self.buffer.storage_mut()) {
            Ok(Some(len)) => self.buffer.set_len(len),
            Ok(None) => return Ok(()),
            Err(e) => {
                self.stats.receive_errors += 1;
                tracing::warn!("Receive failed: {}", e);
                return Ok(());
            }
        }
        self.stats.datagrams += 1;

        match validate(self.buffer.as_slice(), &self.stream_name) {
            Ok(accepted) => {
                self.stats.accepted += 1;
                self.player
                    .deliver(&accepted.config, accepted.payload, &mut self.stats)?;
            }
            Err(rejection) => {
                tracing::trace!("Dropped datagram: {}", rejection);
                *self.stats.rejected.entry(rejection.label()).or_default() += 1;
            }
        }
        Ok(())
    }

    /// Run until `shutdown` is triggered or the backend fails for good
    ///
    /// The output is closed on every exit path, and [`Receptor::stats`] stays
    /// readable afterwards either way.
    pub fn run(&mut self, shutdown: &ShutdownToken) -> Result<()> {
        tracing::info!("Waiting for stream {}", self.stream_name);

        let result = loop {
            if shutdown.is_triggered() {
                break Ok(());
            }
            if let Err(e) = self.step() {
                break Err(e);
            }
        };

        self.player.close();
        self.stats.foreign_datagrams = self.socket.foreign_datagrams();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::packet::tests::audio_packet;
    use crate::protocol::{SampleEncoding, HEADER_SIZE};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Arc;

    type Incoming = io::Result<Option<Vec<u8>>>;

    struct MockSocket {
        incoming: VecDeque<Incoming>,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        shutdown: ShutdownToken,
        foreign: u64,
    }

    impl DatagramSocket for MockSocket {
        fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
            match self.incoming.pop_front() {
                Some(Ok(Some(datagram))) => {
                    buf[..datagram.len()].copy_from_slice(&datagram);
                    Ok(Some(datagram.len()))
                }
                Some(Ok(None)) => Ok(None),
                Some(Err(e)) => Err(e),
                None => {
                    self.shutdown.trigger();
                    Ok(None)
                }
            }
        }

        fn send_datagram(&mut self, datagram: &[u8]) -> io::Result<usize> {
            self.sent.lock().push(datagram.to_vec());
            Ok(datagram.len())
        }

        fn foreign_datagrams(&self) -> u64 {
            self.foreign
        }
    }

    /// Outcomes consumed in order; an exhausted script succeeds
    #[derive(Default)]
    struct Script {
        open_ok: VecDeque<bool>,
        write_ok: VecDeque<bool>,
        opens: Vec<StreamConfig>,
        writes: Vec<Vec<u8>>,
        closes: usize,
    }

    type SharedScript = Arc<Mutex<Script>>;

    struct ScriptedBackend {
        script: SharedScript,
    }

    struct ScriptedHandle {
        script: SharedScript,
        stride: usize,
    }

    impl AudioBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn open(
            &mut self,
            config: &StreamConfig,
            _buffer_frames: usize,
        ) -> std::result::Result<Box<dyn PlaybackHandle>, BackendError> {
            let mut script = self.script.lock();
            if !script.open_ok.pop_front().unwrap_or(true) {
                return Err(BackendError::OpenFailed("scripted".to_string()));
            }
            script.opens.push(*config);
            Ok(Box::new(ScriptedHandle {
                script: self.script.clone(),
                stride: config.frame_stride(),
            }))
        }
    }

    impl PlaybackHandle for ScriptedHandle {
        fn write(&mut self, interleaved: &[u8]) -> std::result::Result<usize, BackendError> {
            let mut script = self.script.lock();
            if !script.write_ok.pop_front().unwrap_or(true) {
                return Err(BackendError::WriteFailed("scripted".to_string()));
            }
            script.writes.push(interleaved.to_vec());
            Ok(interleaved.len() / self.stride)
        }

        fn close(self: Box<Self>) {
            self.script.lock().closes += 1;
        }
    }

    struct Harness {
        receptor: Receptor<MockSocket>,
        shutdown: ShutdownToken,
        script: SharedScript,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    fn harness(incoming: Vec<Incoming>, selection: Vec<usize>, beacon_interval: u32) -> Harness {
        let shutdown = ShutdownToken::new();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let script = SharedScript::default();

        let socket = MockSocket {
            incoming: incoming.into(),
            sent: sent.clone(),
            shutdown: shutdown.clone(),
            foreign: 0,
        };
        let backend = Box::new(ScriptedBackend {
            script: script.clone(),
        });
        let settings = ReceptorSettings {
            stream_name: StreamName::new("Stream1"),
            channel_selection: selection,
            buffer_frames: 3072,
            beacon_interval,
        };

        Harness {
            receptor: Receptor::new(socket, backend, settings, Bytes::from_static(b"beacon")),
            shutdown,
            script,
            sent,
        }
    }

    fn stereo_48k() -> StreamConfig {
        StreamConfig::new(48000, 2, SampleEncoding::I16)
    }

    fn packet(name: &str) -> Incoming {
        Ok(Some(audio_packet(name, &stereo_48k(), 64)))
    }

    #[test]
    fn test_forwards_payload_unchanged() {
        let expected = audio_packet("Stream1", &stereo_48k(), 64);
        let mut h = harness(vec![packet("Stream1")], vec![], 512);

        h.receptor.run(&h.shutdown).unwrap();
        let stats = h.receptor.stats();

        let script = h.script.lock();
        assert_eq!(script.opens, vec![stereo_48k()]);
        assert_eq!(script.writes, vec![expected[HEADER_SIZE..].to_vec()]);
        assert_eq!(script.closes, 1);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.frames_written, 64);
        assert_eq!(stats.backend_opens, 1);
    }

    #[test]
    fn test_other_stream_never_reaches_backend() {
        let mut h = harness(vec![packet("Stream2")], vec![], 512);

        h.receptor.run(&h.shutdown).unwrap();
        let stats = h.receptor.stats();

        let script = h.script.lock();
        assert!(script.opens.is_empty());
        assert!(script.writes.is_empty());
        assert_eq!(stats.accepted, 0);
        assert_eq!(stats.rejected.get("stream_name"), Some(&1));
    }

    #[test]
    fn test_channel_selection_applied() {
        let mut h = harness(vec![packet("Stream1")], vec![1], 512);
        let input = audio_packet("Stream1", &stereo_48k(), 64);

        h.receptor.run(&h.shutdown).unwrap();

        let expected: Vec<u8> = input[HEADER_SIZE..]
            .chunks_exact(4)
            .flat_map(|frame| frame[2..4].to_vec())
            .collect();
        let script = h.script.lock();
        assert_eq!(script.opens, vec![stereo_48k().with_channels(1)]);
        assert_eq!(script.writes, vec![expected]);
    }

    #[test]
    fn test_write_failure_recovers_once() {
        let mut h = harness(
            vec![packet("Stream1"), packet("Stream1"), packet("Stream1")],
            vec![],
            512,
        );
        h.script.lock().write_ok = VecDeque::from(vec![true, false, true]);

        h.receptor.run(&h.shutdown).unwrap();
        let stats = h.receptor.stats();

        let script = h.script.lock();
        assert_eq!(script.opens.len(), 2);
        // The failed frame is dropped, not retried
        assert_eq!(script.writes.len(), 2);
        assert_eq!(script.closes, 2);
        assert_eq!(stats.backend_reopens, 1);
        assert_eq!(stats.write_failures, 1);
    }

    #[test]
    fn test_separate_failures_each_recover() {
        let incoming = (0..4).map(|_| packet("Stream1")).collect();
        let mut h = harness(incoming, vec![], 512);
        h.script.lock().write_ok = VecDeque::from(vec![false, true, false, true]);

        h.receptor.run(&h.shutdown).unwrap();
        let stats = h.receptor.stats();

        assert_eq!(stats.backend_reopens, 2);
        assert_eq!(h.script.lock().writes.len(), 2);
    }

    #[test]
    fn test_consecutive_write_failures_are_fatal() {
        let incoming = (0..4).map(|_| packet("Stream1")).collect();
        let mut h = harness(incoming, vec![], 512);
        h.script.lock().write_ok = VecDeque::from(vec![true, false, false]);

        let err = h.receptor.run(&h.shutdown).unwrap_err();

        assert!(matches!(err, Error::Backend(BackendError::WriteFailed(_))));
        let script = h.script.lock();
        assert_eq!(script.opens.len(), 2);
        assert_eq!(script.writes.len(), 1);
        assert_eq!(script.closes, 2);

        // Counters survive the fatal exit for the summary
        let stats = h.receptor.stats();
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.frames_written, 64);
        assert_eq!(stats.write_failures, 2);
        assert_eq!(stats.backend_reopens, 1);
    }

    #[test]
    fn test_failed_reopen_is_fatal() {
        let mut h = harness(vec![packet("Stream1"), packet("Stream1")], vec![], 512);
        {
            let mut script = h.script.lock();
            script.open_ok = VecDeque::from(vec![true, false]);
            script.write_ok = VecDeque::from(vec![false]);
        }

        let err = h.receptor.run(&h.shutdown).unwrap_err();

        assert!(matches!(err, Error::Backend(BackendError::OpenFailed(_))));
        assert_eq!(h.script.lock().closes, 1);
    }

    #[test]
    fn test_initial_open_failure_is_fatal() {
        let mut h = harness(vec![packet("Stream1")], vec![], 512);
        h.script.lock().open_ok = VecDeque::from(vec![false]);

        let err = h.receptor.run(&h.shutdown).unwrap_err();

        assert!(matches!(err, Error::Backend(BackendError::OpenFailed(_))));
        assert_eq!(h.script.lock().closes, 0);
        assert_eq!(h.receptor.stats().accepted, 1);
        assert_eq!(h.receptor.stats().backend_opens, 0);
    }

    #[test]
    fn test_foreign_datagrams_reported() {
        let mut h = harness(vec![], vec![], 512);
        h.receptor.socket.foreign = 3;

        h.receptor.run(&h.shutdown).unwrap();

        assert_eq!(h.receptor.stats().foreign_datagrams, 3);
    }

    #[test]
    fn test_format_change_reopens() {
        let mono_44k = StreamConfig::new(44100, 1, SampleEncoding::I16);
        let mut h = harness(
            vec![
                packet("Stream1"),
                Ok(Some(audio_packet("Stream1", &mono_44k, 32))),
                Ok(Some(audio_packet("Stream1", &mono_44k, 32))),
            ],
            vec![],
            512,
        );

        h.receptor.run(&h.shutdown).unwrap();
        let stats = h.receptor.stats();

        let script = h.script.lock();
        assert_eq!(script.opens, vec![stereo_48k(), mono_44k]);
        assert_eq!(script.writes.len(), 3);
        assert_eq!(script.closes, 2);
        assert_eq!(stats.backend_opens, 2);
        assert_eq!(stats.backend_reopens, 0);
    }

    #[test]
    fn test_beacon_every_interval() {
        // Five timeouts, then a sixth turn that finds the queue empty
        let incoming = (0..5).map(|_| Ok(None)).collect();
        let mut h = harness(incoming, vec![], 2);

        h.receptor.run(&h.shutdown).unwrap();
        let stats = h.receptor.stats();

        let sent = h.sent.lock();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|d| d == b"beacon"));
        assert_eq!(stats.beacons_sent, 2);
    }

    #[test]
    fn test_receive_error_skipped() {
        let mut h = harness(
            vec![
                Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")),
                packet("Stream1"),
            ],
            vec![],
            512,
        );

        h.receptor.run(&h.shutdown).unwrap();
        let stats = h.receptor.stats();

        assert_eq!(stats.receive_errors, 1);
        assert_eq!(stats.accepted, 1);
        assert_eq!(h.script.lock().writes.len(), 1);
    }

    #[test]
    fn test_stops_when_already_triggered() {
        let mut h = harness(vec![packet("Stream1")], vec![], 512);
        h.shutdown.trigger();

        h.receptor.run(&h.shutdown).unwrap();
        let stats = h.receptor.stats();

        assert_eq!(stats.datagrams, 0);
        assert!(h.script.lock().opens.is_empty());
    }

    #[test]
    fn test_truncated_datagram_counted() {
        let mut h = harness(vec![Ok(Some(vec![b'V', b'B']))], vec![], 512);

        h.receptor.run(&h.shutdown).unwrap();
        let stats = h.receptor.stats();

        assert_eq!(stats.rejected.get("truncated"), Some(&1));
        assert_eq!(stats.rejected_total(), 1);
    }
}
