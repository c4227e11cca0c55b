//! Service (identification) payload codec
//!
//! A service packet carries one fixed 676-byte descriptor after the header.
//! Text fields are truncated and zero-padded to their width; their encoding
//! is never checked, only their length.

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// Encoded size of a [`ServiceDescriptor`]
pub const SERVICE_DATA_SIZE: usize = 676;

/// Device type bits
pub mod device_type {
    pub const RECEPTOR: u32 = 0x0000_0001;
    pub const TRANSMITTER: u32 = 0x0000_0002;
    pub const RECEPTOR_SPOT: u32 = 0x0000_0004;
    pub const TRANSMITTER_SPOT: u32 = 0x0000_0008;
    pub const VIRTUAL_DEVICE: u32 = 0x0000_0010;
    pub const SERVER: u32 = 0x0100_0000;
}

/// Feature bits
pub mod feature {
    pub const AUDIO: u32 = 0x0000_0001;
    pub const AOIP: u32 = 0x0000_0002;
    pub const VOIP: u32 = 0x0000_0004;
    pub const SERIAL: u32 = 0x0000_0100;
    pub const MIDI: u32 = 0x0000_0300;
    pub const TEXT: u32 = 0x0001_0000;
}

const LANG_SIZE: usize = 8;
const POSITION_SIZE: usize = 8;
const RESERVED_SIZE: usize = 8;
const RESERVED_EX_SIZE: usize = 64;
const DISTANT_IP_SIZE: usize = 32;
const NAME_SIZE: usize = 64;
const UTF8_SIZE: usize = 128;

/// Identification record announced in service packets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub device_type: u32,
    pub features: u32,
    pub features_ex: u32,
    /// Rates are carried in Hz
    pub preferred_rate: u32,
    pub min_rate: u32,
    pub max_rate: u32,
    /// `0x00RRGGBB`, zero when unset
    pub color_rgb: u32,
    pub version: [u8; 4],
    pub gps_position: String,
    pub user_position: String,
    pub language: String,
    pub distant_ip: String,
    pub distant_port: u16,
    pub device_name: String,
    pub manufacturer: String,
    pub application_name: String,
    pub host_name: String,
    pub user_name: String,
    pub user_comment: String,
}

fn put_text<B: BufMut>(buf: &mut B, text: &str, width: usize) {
    let bytes = text.as_bytes();
    let len = bytes.len().min(width);
    buf.put_slice(&bytes[..len]);
    buf.put_bytes(0, width - len);
}

fn get_text(cur: &mut &[u8], width: usize) -> String {
    let field = &cur[..width];
    let end = field.iter().position(|&b| b == 0).unwrap_or(width);
    let text = String::from_utf8_lossy(&field[..end]).into_owned();
    cur.advance(width);
    text
}

impl ServiceDescriptor {
    /// Append the fixed-layout record to `buf`
    pub fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.device_type);
        buf.put_u32_le(self.features);
        buf.put_u32_le(self.features_ex);
        buf.put_u32_le(self.preferred_rate);
        buf.put_u32_le(self.min_rate);
        buf.put_u32_le(self.max_rate);
        buf.put_u32_le(self.color_rgb);
        buf.put_slice(&self.version);
        put_text(buf, &self.gps_position, POSITION_SIZE);
        put_text(buf, &self.user_position, POSITION_SIZE);
        put_text(buf, &self.language, LANG_SIZE);
        buf.put_bytes(0, RESERVED_SIZE + RESERVED_EX_SIZE);
        put_text(buf, &self.distant_ip, DISTANT_IP_SIZE);
        buf.put_u16_le(self.distant_port);
        buf.put_u16_le(0);
        put_text(buf, &self.device_name, NAME_SIZE);
        put_text(buf, &self.manufacturer, NAME_SIZE);
        put_text(buf, &self.application_name, NAME_SIZE);
        put_text(buf, &self.host_name, NAME_SIZE);
        put_text(buf, &self.user_name, UTF8_SIZE);
        put_text(buf, &self.user_comment, UTF8_SIZE);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SERVICE_DATA_SIZE);
        self.put(&mut out);
        out
    }

    /// Parse a record from the payload of a service packet
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < SERVICE_DATA_SIZE {
            return Err(ProtocolError::ServiceTooShort(payload.len()));
        }

        let mut cur = &payload[..SERVICE_DATA_SIZE];
        let device_type = cur.get_u32_le();
        let features = cur.get_u32_le();
        let features_ex = cur.get_u32_le();
        let preferred_rate = cur.get_u32_le();
        let min_rate = cur.get_u32_le();
        let max_rate = cur.get_u32_le();
        let color_rgb = cur.get_u32_le();
        let mut version = [0u8; 4];
        cur.copy_to_slice(&mut version);
        let gps_position = get_text(&mut cur, POSITION_SIZE);
        let user_position = get_text(&mut cur, POSITION_SIZE);
        let language = get_text(&mut cur, LANG_SIZE);
        cur.advance(RESERVED_SIZE + RESERVED_EX_SIZE);
        let distant_ip = get_text(&mut cur, DISTANT_IP_SIZE);
        let distant_port = cur.get_u16_le();
        cur.advance(2);

        Ok(Self {
            device_type,
            features,
            features_ex,
            preferred_rate,
            min_rate,
            max_rate,
            color_rgb,
            version,
            gps_position,
            user_position,
            language,
            distant_ip,
            distant_port,
            device_name: get_text(&mut cur, NAME_SIZE),
            manufacturer: get_text(&mut cur, NAME_SIZE),
            application_name: get_text(&mut cur, NAME_SIZE),
            host_name: get_text(&mut cur, NAME_SIZE),
            user_name: get_text(&mut cur, UTF8_SIZE),
            user_comment: get_text(&mut cur, UTF8_SIZE),
        })
    }
}
