//! Network subsystem for UDP transport

pub mod buffer;
pub mod udp;

pub use buffer::DatagramBuffer;
pub use udp::{create_socket, send_datagram, ReceptorSocket, SocketOptions};

use std::io;

/// Datagram transport used by the receptor loop
pub trait DatagramSocket {
    /// Receive one datagram into `buf`
    ///
    /// `Ok(None)` means nothing usable arrived this time (read timeout,
    /// interrupted call, or a datagram from an unexpected source).
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;

    /// Send one datagram to the configured peer
    fn send_datagram(&mut self, datagram: &[u8]) -> io::Result<usize>;

    /// Datagrams dropped so far because of their source address
    fn foreign_datagrams(&self) -> u64 {
        0
    }
}
