use super::constants::MAX_VOXEL_PACKET_SIZE;

/// Fixed-capacity outbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketBuffer {
    pub fn new() -> Self {
        Self::with_capacity(MAX_VOXEL_PACKET_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub(crate) fn push(&mut self, byte: u8) {
        debug_assert!(self.remaining() >= 1, "packet overflow");
        self.data.push(byte);
    }

    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        debug_assert!(self.remaining() >= bytes.len(), "packet overflow");
        self.data.extend_from_slice(bytes);
    }

    /// OR `bits` into an already written byte.
    pub(crate) fn set_bits(&mut self, offset: usize, bits: u8) {
        self.data[offset] |= bits;
    }
}
