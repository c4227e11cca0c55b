//! UDP socket setup and the receptor's datagram socket

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use super::DatagramSocket;
use crate::constants::{DEFAULT_READ_TIMEOUT_MS, DEFAULT_RECV_BUFFER_SIZE};
use crate::error::NetworkError;

/// Socket tuning applied at creation
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Kernel receive buffer in bytes, 0 keeps the system default
    pub recv_buffer_size: usize,
    /// Upper bound on a blocking receive, so the stop flag is observed
    pub read_timeout: Option<Duration>,
    /// Allow sending to broadcast addresses (IPv4 only)
    pub broadcast: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            read_timeout: Some(Duration::from_millis(DEFAULT_READ_TIMEOUT_MS)),
            broadcast: true,
        }
    }
}

/// Create a UDP socket bound to `bind_addr`
pub fn create_socket(
    bind_addr: SocketAddr,
    options: &SocketOptions,
) -> Result<UdpSocket, NetworkError> {
    let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::SetupFailed(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::SetupFailed(e.to_string()))?;

    if options.recv_buffer_size > 0 {
        if let Err(e) = socket.set_recv_buffer_size(options.recv_buffer_size) {
            tracing::warn!("Failed to set receive buffer size: {}", e);
        }
    }

    if options.broadcast && bind_addr.is_ipv4() {
        socket
            .set_broadcast(true)
            .map_err(|e| NetworkError::SetupFailed(e.to_string()))?;
    }

    socket
        .bind(&bind_addr.into())
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", bind_addr, e)))?;

    let socket: UdpSocket = socket.into();

    let timeout = options.read_timeout.filter(|t| !t.is_zero());
    socket
        .set_read_timeout(timeout)
        .map_err(|e| NetworkError::SetupFailed(e.to_string()))?;

    Ok(socket)
}

fn unspecified_like(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

/// Whether datagrams can be attributed to `ip` as a single source
fn is_single_host(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => !(v4.is_unspecified() || v4.is_broadcast() || v4.is_multicast()),
        IpAddr::V6(v6) => !(v6.is_unspecified() || v6.is_multicast()),
    }
}

/// Receptor socket: listens on the peer's port and sends beacons back to it
pub struct ReceptorSocket {
    socket: UdpSocket,
    peer: SocketAddr,
    filter_source: bool,
    foreign_datagrams: u64,
}

impl ReceptorSocket {
    /// Listen on all interfaces at `peer.port()`
    ///
    /// Datagrams are only accepted from `peer.ip()` when it names a single
    /// host.
    pub fn bind(peer: SocketAddr, options: &SocketOptions) -> Result<Self, NetworkError> {
        let bind_addr = SocketAddr::new(unspecified_like(peer.ip()), peer.port());
        let socket = create_socket(bind_addr, options)?;
        let filter_source = is_single_host(peer.ip());

        tracing::info!(
            "Listening on {} for {}{}",
            bind_addr,
            peer,
            if filter_source { "" } else { " (any source)" }
        );

        Ok(Self {
            socket,
            peer,
            filter_source,
            foreign_datagrams: 0,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl DatagramSocket for ReceptorSocket {
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.socket.recv_from(buf) {
            Ok((len, from)) => {
                if self.filter_source && from.ip() != self.peer.ip() {
                    self.foreign_datagrams += 1;
                    tracing::trace!("Ignoring datagram from {}", from);
                    return Ok(None);
                }
                Ok(Some(len))
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn send_datagram(&mut self, datagram: &[u8]) -> io::Result<usize> {
        self.socket.send_to(datagram, self.peer)
    }

    fn foreign_datagrams(&self) -> u64 {
        self.foreign_datagrams
    }
}

/// Send a single datagram from an ephemeral socket
pub fn send_datagram(dest: SocketAddr, datagram: &[u8]) -> Result<usize, NetworkError> {
    let bind_addr = SocketAddr::new(unspecified_like(dest.ip()), 0);
    let options = SocketOptions {
        recv_buffer_size: 0,
        read_timeout: None,
        broadcast: true,
    };
    let socket = create_socket(bind_addr, &options)?;

    let sent = socket
        .send_to(datagram, dest)
        .map_err(|e| NetworkError::SendFailed(format!("{}: {}", dest, e)))?;
    if sent != datagram.len() {
        return Err(NetworkError::ShortWrite {
            sent,
            expected: datagram.len(),
        });
    }

    tracing::debug!("Sent {} bytes to {}", sent, dest);
    Ok(sent)
}
