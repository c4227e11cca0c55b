//! Service beacons
//!
//! A beacon is a single service datagram: a header with the SERVICE
//! sub-protocol and stream name `"VBAN Service"`, the identification record,
//! then an optional free-text message. The receptor announces itself
//! periodically; the emitter sends one beacon and exits.

use bytes::{BufMut, Bytes, BytesMut};
use std::net::SocketAddr;

use crate::config::IdentityConfig;
use crate::error::ProtocolError;
use crate::protocol::header::{Header, SubProtocol};
use crate::protocol::service::{device_type, feature, ServiceDescriptor, SERVICE_DATA_SIZE};
use crate::protocol::{HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// Longest message that still fits in one datagram
pub const MAX_MESSAGE_LEN: usize = MAX_PAYLOAD_SIZE - SERVICE_DATA_SIZE;

/// Which program is announcing itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Receptor,
    Emitter,
}

impl Role {
    fn application(self) -> &'static str {
        match self {
            Role::Receptor => "vban-receptor",
            Role::Emitter => "vban-emitter",
        }
    }
}

fn crate_version() -> [u8; 4] {
    let part = |s: &str| s.parse::<u8>().unwrap_or(0);
    [
        part(env!("CARGO_PKG_VERSION_MAJOR")),
        part(env!("CARGO_PKG_VERSION_MINOR")),
        part(env!("CARGO_PKG_VERSION_PATCH")),
        0,
    ]
}

fn host_name(identity: &IdentityConfig) -> String {
    if !identity.host_name.is_empty() {
        return identity.host_name.clone();
    }
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .unwrap_or_default()
}

/// Identification record for `role`
///
/// `peer` fills the distant address unless the identity overrides it.
pub fn descriptor(identity: &IdentityConfig, role: Role, peer: SocketAddr) -> ServiceDescriptor {
    let (features, preferred_rate) = match role {
        Role::Receptor => (feature::AUDIO, 32000),
        Role::Emitter => (feature::AUDIO | feature::AOIP, 48000),
    };

    ServiceDescriptor {
        device_type: device_type::RECEPTOR,
        features,
        features_ex: features,
        preferred_rate,
        min_rate: 32000,
        max_rate: 48000,
        color_rgb: identity.color_rgb,
        version: crate_version(),
        language: identity.language.clone(),
        distant_ip: if identity.distant_ip.is_empty() {
            peer.ip().to_string()
        } else {
            identity.distant_ip.clone()
        },
        distant_port: if identity.distant_port == 0 {
            peer.port()
        } else {
            identity.distant_port
        },
        device_name: identity.device_name.clone(),
        manufacturer: identity.manufacturer.clone(),
        application_name: format!("{} {}", role.application(), env!("CARGO_PKG_VERSION")),
        host_name: host_name(identity),
        user_name: identity.user_name.clone(),
        user_comment: identity.user_comment.clone(),
        ..Default::default()
    }
}

/// Assembles a service datagram
#[derive(Debug, Clone)]
pub struct BeaconBuilder {
    descriptor: ServiceDescriptor,
    message: String,
}

impl BeaconBuilder {
    pub fn new(descriptor: ServiceDescriptor) -> Self {
        Self {
            descriptor,
            message: String::new(),
        }
    }

    /// Free text appended after the record
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Encode the datagram, failing if the message does not fit
    pub fn build(&self) -> Result<Bytes, ProtocolError> {
        let message = self.message.as_bytes();
        if message.len() > MAX_MESSAGE_LEN {
            return Err(ProtocolError::MessageTooLong {
                len: message.len(),
                max: MAX_MESSAGE_LEN,
            });
        }

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + SERVICE_DATA_SIZE + message.len());
        Header::service(0).put(&mut buf);
        self.descriptor.put(&mut buf);
        buf.put_slice(message);
        Ok(buf.freeze())
    }
}

/// A decoded service datagram
#[derive(Debug, Clone, PartialEq)]
pub struct Beacon {
    pub header: Header,
    pub descriptor: ServiceDescriptor,
    pub message: String,
}

/// Decode a service datagram
pub fn parse(datagram: &[u8]) -> Result<Beacon, ProtocolError> {
    let header = Header::decode(datagram)?;
    if header.sub_protocol != SubProtocol::Service {
        return Err(ProtocolError::NotService);
    }

    let payload = &datagram[HEADER_SIZE..];
    let descriptor = ServiceDescriptor::decode(payload)?;
    let trailer = &payload[SERVICE_DATA_SIZE..];
    let end = trailer.iter().position(|&b| b == 0).unwrap_or(trailer.len());

    Ok(Beacon {
        header,
        descriptor,
        message: String::from_utf8_lossy(&trailer[..end]).into_owned(),
    })
}
