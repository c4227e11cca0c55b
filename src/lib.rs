//! # VBAN Link
//!
//! Receive a VBAN audio stream over UDP and play it through a pluggable
//! output backend, and announce endpoints with VBAN service beacons.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────── vban-receptor ────────────────────────────────┐
//! │                                                                               │
//! │  ┌──────────────┐   ┌────────────────┐   ┌──────────────┐   ┌──────────────┐  │
//! │  │ UDP socket   │──►│ DatagramBuffer │──►│  validate    │──►│ ChannelMap   │  │
//! │  │ (network)    │   │ 1465 bytes     │   │ (protocol)   │   │ (audio)      │  │
//! │  └──────▲───────┘   └────────────────┘   └──────┬───────┘   └──────┬───────┘  │
//! │         │                                       │ rejected         │          │
//! │         │ service beacon                        ▼                  ▼          │
//! │         │ every N turns                   counted, dropped  ┌──────────────┐  │
//! │  ┌──────┴───────┐                                           │ AudioBackend │  │
//! │  │ beacon       │                                           │ cpal / file  │  │
//! │  │ (PING0)      │                                           │ pipe / null  │  │
//! │  └──────────────┘                                           └──────────────┘  │
//! └───────────────────────────────────────────────────────────────────────────────┘
//!
//! ┌──────────────── vban-emitter ────────────────┐
//! │  identity + message ──► BeaconBuilder ──► UDP │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! The receive loop ([`receptor::Receptor`]) is single threaded; tokio only
//! waits for shutdown signals.

pub mod audio;
pub mod beacon;
pub mod config;
pub mod error;
pub mod logging;
pub mod network;
pub mod protocol;
pub mod receptor;
pub mod shutdown;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default network quality (see `audio::requested_buffer_frames`)
    pub const DEFAULT_QUALITY: u8 = 1;

    /// Default backend name
    pub const DEFAULT_BACKEND: &str = "cpal";

    /// Loop iterations between two receptor beacons
    pub const DEFAULT_BEACON_INTERVAL: u32 = 512;

    /// Socket read timeout, bounds shutdown latency
    pub const DEFAULT_READ_TIMEOUT_MS: u64 = 250;

    /// Kernel receive buffer requested for the receptor socket
    pub const DEFAULT_RECV_BUFFER_SIZE: usize = 1 << 20;

    /// Default verbosity for `--loglevel`
    pub const DEFAULT_LOG_LEVEL: u8 = 1;
}
