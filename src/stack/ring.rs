//! The fixed-capacity byte ring backing socket buffers.

/// A byte ring. Writes append at the tail, reads consume from the
/// head, and both wrap around the end of storage. Never allocates
/// after construction.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    storage: Box<[u8]>,
    read_at: usize,
    length: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity].into_boxed_slice(),
            read_at: 0,
            length: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Bytes that can still be written before the ring is full.
    pub fn free(&self) -> usize {
        self.capacity() - self.length
    }

    pub fn clear(&mut self) {
        self.read_at = 0;
        self.length = 0;
    }

    /// Appends as much of `data` as fits and returns how many bytes
    /// were taken.
    pub fn enqueue_slice(&mut self, data: &[u8]) -> usize {
        let take = data.len().min(self.free());
        if take == 0 {
            return 0;
        }
        let cap = self.capacity();
        let write_at = (self.read_at + self.length) % cap;
        let contiguous = take.min(cap - write_at);
        self.storage[write_at..write_at + contiguous].copy_from_slice(&data[..contiguous]);
        self.storage[..take - contiguous].copy_from_slice(&data[contiguous..take]);
        self.length += take;
        take
    }

    /// Removes up to `out.len()` bytes into `out` and returns how many
    /// were moved.
    pub fn dequeue_slice(&mut self, out: &mut [u8]) -> usize {
        let take = out.len().min(self.length);
        if take == 0 {
            return 0;
        }
        let cap = self.capacity();
        let contiguous = take.min(cap - self.read_at);
        out[..contiguous].copy_from_slice(&self.storage[self.read_at..self.read_at + contiguous]);
        out[contiguous..take].copy_from_slice(&self.storage[..take - contiguous]);
        self.read_at = (self.read_at + take) % cap;
        self.length -= take;
        take
    }
}
