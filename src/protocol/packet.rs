//! Inbound audio packet validation
//!
//! Every field of a received datagram is treated as untrusted. Sizes are
//! checked against the number of bytes actually received before any slice is
//! taken, and the payload is returned as a borrow of the receive buffer.

use std::fmt;
use thiserror::Error;

use super::header::{Header, SampleEncoding, StreamName, SubProtocol, CODEC_PCM};
use super::rates::rate_value;
use super::{HEADER_SIZE, MAX_PACKET_SIZE};

/// Usable audio format of a packet (or of an open backend)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    pub encoding: SampleEncoding,
}

impl StreamConfig {
    pub fn new(sample_rate: u32, channels: u16, encoding: SampleEncoding) -> Self {
        Self {
            sample_rate,
            channels,
            encoding,
        }
    }

    /// Bytes per sample, zero for encodings without a fixed width
    pub fn bytes_per_sample(&self) -> usize {
        self.encoding.bytes_per_sample().unwrap_or(0)
    }

    /// Bytes per interleaved frame
    pub fn frame_stride(&self) -> usize {
        self.channels as usize * self.bytes_per_sample()
    }

    /// Same format with a different channel count
    pub fn with_channels(&self, channels: u16) -> Self {
        Self { channels, ..*self }
    }
}

impl fmt::Display for StreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {}",
            self.sample_rate, self.channels, self.encoding
        )
    }
}

/// Why a datagram was not accepted for playback
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    #[error("datagram shorter than header ({0} bytes)")]
    Truncated(usize),

    #[error("datagram exceeds protocol maximum ({0} bytes)")]
    Oversized(usize),

    #[error("invalid magic")]
    BadMagic,

    #[error("not an audio packet ({0:?})")]
    SubProtocolMismatch(SubProtocol),

    #[error("stream name {0} does not match")]
    StreamNameMismatch(StreamName),

    #[error("reserved format bit set")]
    ReservedBitSet,

    #[error("unsupported codec 0x{0:02x}")]
    UnsupportedCodec(u8),

    #[error("unsupported sample rate code {0}")]
    UnsupportedRate(u8),

    #[error("unsupported sample encoding {0}")]
    UnsupportedEncoding(SampleEncoding),

    #[error("payload of {len} bytes, header declares {expected}")]
    PayloadSizeInvalid { len: usize, expected: usize },
}

impl Rejection {
    /// Short stable label, used for statistics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Truncated(_) => "truncated",
            Self::Oversized(_) => "oversized",
            Self::BadMagic => "bad_magic",
            Self::SubProtocolMismatch(_) => "sub_protocol",
            Self::StreamNameMismatch(_) => "stream_name",
            Self::ReservedBitSet => "reserved_bit",
            Self::UnsupportedCodec(_) => "codec",
            Self::UnsupportedRate(_) => "rate",
            Self::UnsupportedEncoding(_) => "encoding",
            Self::PayloadSizeInvalid { .. } => "payload_size",
        }
    }
}

/// An audio packet that belongs to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted<'a> {
    pub config: StreamConfig,
    pub header: Header,
    /// Interleaved samples, borrowed from the datagram
    pub payload: &'a [u8],
}

impl Accepted<'_> {
    /// Number of frames in the payload
    pub fn frames(&self) -> usize {
        self.payload.len() / self.config.frame_stride()
    }
}

/// Decide whether `datagram` is an audio packet of the `expected` stream
pub fn validate<'a>(datagram: &'a [u8], expected: &StreamName) -> Result<Accepted<'a>, Rejection> {
    let len = datagram.len();
    if len < HEADER_SIZE {
        return Err(Rejection::Truncated(len));
    }
    if len > MAX_PACKET_SIZE {
        return Err(Rejection::Oversized(len));
    }

    let header = Header::decode(datagram).map_err(|_| Rejection::BadMagic)?;

    if header.sub_protocol != SubProtocol::Audio {
        return Err(Rejection::SubProtocolMismatch(header.sub_protocol));
    }
    if header.stream_name != *expected {
        return Err(Rejection::StreamNameMismatch(header.stream_name));
    }
    if header.reserved_bit {
        return Err(Rejection::ReservedBitSet);
    }
    if header.codec != CODEC_PCM {
        return Err(Rejection::UnsupportedCodec(header.codec));
    }

    let sample_rate =
        rate_value(header.rate_code).map_err(|_| Rejection::UnsupportedRate(header.rate_code))?;
    let bytes_per_sample = header
        .encoding
        .bytes_per_sample()
        .ok_or(Rejection::UnsupportedEncoding(header.encoding))?;

    let config = StreamConfig::new(sample_rate, header.channels, header.encoding);
    // Declared frames times the frame stride must account for every byte
    let expected = header.samples_per_frame as usize * header.channels as usize * bytes_per_sample;
    let payload = &datagram[HEADER_SIZE..];
    if payload.len() != expected {
        return Err(Rejection::PayloadSizeInvalid {
            len: payload.len(),
            expected,
        });
    }

    Ok(Accepted {
        config,
        header,
        payload,
    })
}
