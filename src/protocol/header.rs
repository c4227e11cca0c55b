//! Packet header codec
//!
//! Layout (28 bytes, little-endian):
//!
//! ```text
//! 0        4      5      6      7      8                 24       28
//! +--------+------+------+------+------+-----------------+--------+
//! | "VBAN" | SR   | nbs  | nbc  | bit  | stream name     | frame  |
//! +--------+------+------+------+------+-----------------+--------+
//!            |                    |
//!            |                    +-- data type (0..2) | reserved (3) | codec (4..7)
//!            +-- rate code (0..4) | sub-protocol (5..7)
//! ```

use bytes::{Buf, BufMut};
use std::fmt;

use super::packet::StreamConfig;
use super::rates::{rate_code, RATE_CODE_MASK};
use super::{HEADER_SIZE, MAGIC, SERVICE_STREAM_NAME, STREAM_NAME_SIZE};
use crate::error::ProtocolError;

const SUB_PROTOCOL_MASK: u8 = 0xe0;
const DATA_TYPE_MASK: u8 = 0x07;
const RESERVED_MASK: u8 = 0x08;
const CODEC_MASK: u8 = 0xf0;

/// Codec nibble for uncompressed PCM
pub const CODEC_PCM: u8 = 0x00;

/// Payload interpretation selected by the top bits of the rate byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubProtocol {
    Audio,
    Serial,
    Text,
    Service,
    /// One of the four tags the protocol leaves undefined
    Undefined(u8),
}

impl SubProtocol {
    pub fn from_bits(bits: u8) -> Self {
        match bits & SUB_PROTOCOL_MASK {
            0x00 => Self::Audio,
            0x20 => Self::Serial,
            0x40 => Self::Text,
            0x60 => Self::Service,
            other => Self::Undefined(other),
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Self::Audio => 0x00,
            Self::Serial => 0x20,
            Self::Text => 0x40,
            Self::Service => 0x60,
            Self::Undefined(bits) => bits & SUB_PROTOCOL_MASK,
        }
    }
}

/// Sample data type carried by audio packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleEncoding {
    /// 8-bit unsigned
    U8,
    I16,
    I24,
    I32,
    F32,
    F64,
    /// Packed 12-bit, no fixed byte width
    Bits12,
    /// Packed 10-bit, no fixed byte width
    Bits10,
}

impl SampleEncoding {
    pub fn from_bits(bits: u8) -> Self {
        match bits & DATA_TYPE_MASK {
            0 => Self::U8,
            1 => Self::I16,
            2 => Self::I24,
            3 => Self::I32,
            4 => Self::F32,
            5 => Self::F64,
            6 => Self::Bits12,
            _ => Self::Bits10,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Self::U8 => 0,
            Self::I16 => 1,
            Self::I24 => 2,
            Self::I32 => 3,
            Self::F32 => 4,
            Self::F64 => 5,
            Self::Bits12 => 6,
            Self::Bits10 => 7,
        }
    }

    /// Bytes per sample, `None` for the packed encodings
    pub fn bytes_per_sample(self) -> Option<usize> {
        match self {
            Self::U8 => Some(1),
            Self::I16 => Some(2),
            Self::I24 => Some(3),
            Self::I32 | Self::F32 => Some(4),
            Self::F64 => Some(8),
            Self::Bits12 | Self::Bits10 => None,
        }
    }

    /// Bit depth as announced on the wire
    pub fn bit_depth(self) -> u32 {
        match self {
            Self::U8 => 8,
            Self::I16 => 16,
            Self::I24 => 24,
            Self::I32 | Self::F32 => 32,
            Self::F64 => 64,
            Self::Bits12 => 12,
            Self::Bits10 => 10,
        }
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::U8 => "u8",
            Self::I16 => "s16le",
            Self::I24 => "s24le",
            Self::I32 => "s32le",
            Self::F32 => "f32le",
            Self::F64 => "f64le",
            Self::Bits12 => "12bit",
            Self::Bits10 => "10bit",
        };
        f.write_str(name)
    }
}

/// Fixed-width, zero-padded stream name
///
/// The field is not necessarily NUL-terminated: a 16-byte name fills it
/// completely. Equality compares all 16 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamName([u8; STREAM_NAME_SIZE]);

impl StreamName {
    /// Build a name, truncating at a character boundary if it does not fit
    pub fn new(name: &str) -> Self {
        let mut end = name.len().min(STREAM_NAME_SIZE);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        let mut bytes = [0u8; STREAM_NAME_SIZE];
        bytes[..end].copy_from_slice(&name.as_bytes()[..end]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; STREAM_NAME_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; STREAM_NAME_SIZE] {
        &self.0
    }

    /// Name up to the first NUL, lossily decoded
    pub fn to_string_lossy(&self) -> String {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(STREAM_NAME_SIZE);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl fmt::Debug for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamName({:?})", self.to_string_lossy())
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

/// Decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub sub_protocol: SubProtocol,
    /// Raw 5-bit rate code, may lie outside the rate table
    pub rate_code: u8,
    /// Samples per frame (1..=256); service packets reuse this byte
    pub samples_per_frame: u16,
    /// Channel count (1..=256); service packets reuse this byte
    pub channels: u16,
    pub encoding: SampleEncoding,
    pub reserved_bit: bool,
    /// Codec nibble (`0x00` is PCM)
    pub codec: u8,
    pub stream_name: StreamName,
    pub frame_counter: u32,
}

impl Header {
    /// Header for an audio packet carrying `samples_per_frame` frames
    pub fn audio(
        stream_name: StreamName,
        config: &StreamConfig,
        samples_per_frame: u16,
        frame_counter: u32,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            sub_protocol: SubProtocol::Audio,
            rate_code: rate_code(config.sample_rate)?,
            samples_per_frame,
            channels: config.channels,
            encoding: config.encoding,
            reserved_bit: false,
            codec: CODEC_PCM,
            stream_name,
            frame_counter,
        })
    }

    /// Header for a service (identification) packet
    pub fn service(frame_counter: u32) -> Self {
        Self {
            sub_protocol: SubProtocol::Service,
            rate_code: 0,
            samples_per_frame: 1,
            channels: 1,
            encoding: SampleEncoding::U8,
            reserved_bit: false,
            codec: CODEC_PCM,
            stream_name: StreamName::new(SERVICE_STREAM_NAME),
            frame_counter,
        }
    }

    /// Serialize into the fixed 28-byte layout
    ///
    /// Counts are expected in 1..=256; the rate code is masked to 5 bits.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        self.put(&mut &mut out[..]);
        out
    }

    /// Append the header to a buffer
    pub fn put<B: BufMut>(&self, buf: &mut B) {
        let format_bit = self.encoding.bits()
            | if self.reserved_bit { RESERVED_MASK } else { 0 }
            | (self.codec & CODEC_MASK);

        buf.put_slice(&MAGIC);
        buf.put_u8(self.sub_protocol.bits() | (self.rate_code & RATE_CODE_MASK));
        buf.put_u8(self.samples_per_frame.wrapping_sub(1) as u8);
        buf.put_u8(self.channels.wrapping_sub(1) as u8);
        buf.put_u8(format_bit);
        buf.put_slice(self.stream_name.as_bytes());
        buf.put_u32_le(self.frame_counter);
    }

    /// Parse the header at the start of `bytes`
    ///
    /// Unknown sub-protocols and rate codes are returned as-is; only a short
    /// buffer or a wrong magic fails.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::HeaderTooShort(bytes.len()));
        }

        let mut cur = &bytes[..HEADER_SIZE];
        let mut magic = [0u8; 4];
        cur.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }

        let format_sr = cur.get_u8();
        let nbs = cur.get_u8();
        let nbc = cur.get_u8();
        let format_bit = cur.get_u8();
        let mut name = [0u8; STREAM_NAME_SIZE];
        cur.copy_to_slice(&mut name);
        let frame_counter = cur.get_u32_le();

        Ok(Self {
            sub_protocol: SubProtocol::from_bits(format_sr),
            rate_code: format_sr & RATE_CODE_MASK,
            samples_per_frame: nbs as u16 + 1,
            channels: nbc as u16 + 1,
            encoding: SampleEncoding::from_bits(format_bit),
            reserved_bit: format_bit & RESERVED_MASK != 0,
            codec: format_bit & CODEC_MASK,
            stream_name: StreamName::from_bytes(name),
            frame_counter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stereo_48k() -> StreamConfig {
        StreamConfig::new(48000, 2, SampleEncoding::I16)
    }

    #[test]
    fn test_encode_layout() {
        let header = Header::audio(StreamName::new("Stream1"), &stereo_48k(), 64, 7).unwrap();
        let bytes = header.encode();

        assert_eq!(&bytes[0..4], b"VBAN");
        assert_eq!(bytes[4], 3);
        assert_eq!(bytes[5], 63);
        assert_eq!(bytes[6], 1);
        assert_eq!(bytes[7], 1);
        assert_eq!(&bytes[8..15], b"Stream1");
        assert!(bytes[15..24].iter().all(|&b| b == 0));
        assert_eq!(&bytes[24..28], &7u32.to_le_bytes());
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        let bytes = [0u8; HEADER_SIZE - 1];
        assert_eq!(
            Header::decode(&bytes),
            Err(ProtocolError::HeaderTooShort(HEADER_SIZE - 1))
        );
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut bytes = Header::service(0).encode();
        bytes[0] = b'X';
        assert_eq!(Header::decode(&bytes), Err(ProtocolError::BadMagic(*b"XBAN")));
    }

    #[test]
    fn test_decode_keeps_unknown_values() {
        let mut bytes = Header::service(0).encode();
        bytes[4] = 0xa0 | 0x1f;
        let header = Header::decode(&bytes).unwrap();
        assert_eq!(header.sub_protocol, SubProtocol::Undefined(0xa0));
        assert_eq!(header.rate_code, 0x1f);
    }

    #[test]
    fn test_service_header() {
        let header = Header::decode(&Header::service(3).encode()).unwrap();
        assert_eq!(header.sub_protocol, SubProtocol::Service);
        assert_eq!(header.stream_name.to_string_lossy(), "VBAN Service");
        assert_eq!(header.frame_counter, 3);
    }

    #[test]
    fn test_stream_name_truncation() {
        let name = StreamName::new("a-very-long-stream-name");
        assert_eq!(name.as_bytes(), b"a-very-long-stre");
        assert_eq!(name.to_string_lossy(), "a-very-long-stre");

        // 'é' is two bytes and would straddle the 16-byte boundary
        let name = StreamName::new("aaaaaaaaaaaaaaaé");
        assert_eq!(name.to_string_lossy(), "aaaaaaaaaaaaaaa");
    }

    fn arb_encoding() -> impl Strategy<Value = SampleEncoding> {
        (0u8..8).prop_map(SampleEncoding::from_bits)
    }

    fn arb_sub_protocol() -> impl Strategy<Value = SubProtocol> {
        (0u8..8).prop_map(|n| SubProtocol::from_bits(n << 5))
    }

    proptest! {
        #[test]
        fn prop_header_roundtrip(
            sub_protocol in arb_sub_protocol(),
            rate_code in 0u8..32,
            samples_per_frame in 1u16..=256,
            channels in 1u16..=256,
            encoding in arb_encoding(),
            reserved_bit in any::<bool>(),
            codec in (0u8..16).prop_map(|c| c << 4),
            name in any::<[u8; STREAM_NAME_SIZE]>(),
            frame_counter in any::<u32>(),
        ) {
            let header = Header {
                sub_protocol,
                rate_code,
                samples_per_frame,
                channels,
                encoding,
                reserved_bit,
                codec,
                stream_name: StreamName::from_bytes(name),
                frame_counter,
            };
            prop_assert_eq!(Header::decode(&header.encode()), Ok(header));
        }
    }
}
