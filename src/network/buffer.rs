//! Fixed-capacity receive buffer

use crate::protocol::MAX_PACKET_SIZE;

/// One byte beyond the protocol maximum, so a datagram that is too large
/// shows up as oversized instead of being silently cut to a valid length
pub const RECEIVE_CAPACITY: usize = MAX_PACKET_SIZE + 1;

/// Stack buffer for a single datagram with explicit length tracking
pub struct DatagramBuffer {
    data: [u8; RECEIVE_CAPACITY],
    len: usize,
}

impl DatagramBuffer {
    pub fn new() -> Self {
        Self {
            data: [0u8; RECEIVE_CAPACITY],
            len: 0,
        }
    }

    /// Whole storage, for a receive call; clears the current contents
    pub fn storage_mut(&mut self) -> &mut [u8] {
        self.len = 0;
        &mut self.data
    }

    /// Record how many bytes the receive call wrote
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(RECEIVE_CAPACITY);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for DatagramBuffer {
    fn default() -> Self {
        Self::new()
    }
}
