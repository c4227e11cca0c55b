//! VBAN wire protocol
//!
//! Explicit encoders and decoders for the 28-byte packet header, the
//! sample-rate table, the PING0 service payload, and validation of inbound
//! audio datagrams against an expected stream.

pub mod header;
pub mod packet;
pub mod rates;
pub mod service;

pub use header::{Header, SampleEncoding, StreamName, SubProtocol};
pub use packet::{validate, Accepted, Rejection, StreamConfig};
pub use rates::{rate_code, rate_value};
pub use service::ServiceDescriptor;

/// Magic bytes at the start of every datagram
pub const MAGIC: [u8; 4] = *b"VBAN";

/// Fixed header size in bytes
pub const HEADER_SIZE: usize = 28;

/// Width of the stream name field
pub const STREAM_NAME_SIZE: usize = 16;

/// Largest datagram the protocol allows (header included)
pub const MAX_PACKET_SIZE: usize = 1464;

/// Largest payload following the header
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - HEADER_SIZE;

/// Stream name carried by service packets
pub const SERVICE_STREAM_NAME: &str = "VBAN Service";
