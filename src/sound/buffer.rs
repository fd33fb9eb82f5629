use std::mem::size_of;

/// One chunk of decoded PCM with its own read cursor.
///
/// Data is interleaved i16 in native byte order.
#[derive(Debug, Clone)]
pub struct SoundBuffer {
    data: Vec<u8>,
    read_offset: usize,
}

impl SoundBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            read_offset: 0,
        }
    }

    pub fn from_samples(samples: &[i16]) -> Self {
        let data = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();
        Self::new(data)
    }

    /// Total size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes already consumed by the mixer.
    pub fn read_offset(&self) -> usize {
        self.read_offset
    }

    /// Unconsumed bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.read_offset..]
    }

    pub fn remaining_len(&self) -> usize {
        self.data.len() - self.read_offset
    }

    pub fn is_exhausted(&self) -> bool {
        self.read_offset >= self.data.len()
    }

    pub(crate) fn advance(&mut self, bytes: usize) {
        self.read_offset = (self.read_offset + bytes).min(self.data.len());
    }

    /// Drops whatever is left, including a trailing partial frame.
    pub(crate) fn exhaust(&mut self) {
        self.read_offset = self.data.len();
    }

    pub(crate) fn rewind(&mut self) {
        self.read_offset = 0;
    }

    /// Unconsumed data decoded to samples.
    pub fn remaining_samples(&self) -> Vec<i16> {
        self.remaining()
            .chunks_exact(size_of::<i16>())
            .map(|b| i16::from_ne_bytes([b[0], b[1]]))
            .collect()
    }
}

/// Ordered queue of buffers for one sound.
///
/// Played buffers are skipped rather than freed so a repeat can rewind the
/// whole queue. Streamed sounds that never repeat can reclaim memory with
/// [`discard_consumed`](Self::discard_consumed).
#[derive(Debug, Default)]
pub struct BufferQueue {
    buffers: Vec<SoundBuffer>,
    head: usize,
    /// Fractional read position past the head cursor, in
    /// `1 / phase_denominator` of a source frame.
    phase: u64,
    phase_denominator: u32,
}

impl BufferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, buffer: SoundBuffer) {
        self.buffers.push(buffer);
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// The first buffer that still has data, skipping exhausted ones.
    pub fn head_mut(&mut self) -> Option<&mut SoundBuffer> {
        while self.head < self.buffers.len() && self.buffers[self.head].is_exhausted() {
            self.head += 1;
        }
        self.buffers.get_mut(self.head)
    }

    pub fn head(&self) -> Option<&SoundBuffer> {
        self.buffers[self.head.min(self.buffers.len())..]
            .iter()
            .find(|b| !b.is_exhausted())
    }

    /// Every buffer has been consumed.
    pub fn is_drained(&self) -> bool {
        self.head().is_none()
    }

    pub fn remaining_bytes(&self) -> usize {
        self.buffers[self.head.min(self.buffers.len())..]
            .iter()
            .map(SoundBuffer::remaining_len)
            .sum()
    }

    pub fn rewind(&mut self) {
        for buffer in &mut self.buffers {
            buffer.rewind();
        }
        self.head = 0;
        self.phase = 0;
    }

    /// Fractional read position expressed over `denominator`.
    ///
    /// A position saved over a different denominator is rescaled, rounding
    /// down.
    pub(crate) fn phase(&self, denominator: u32) -> u64 {
        if self.phase_denominator == denominator || self.phase_denominator == 0 {
            return self.phase;
        }
        self.phase * denominator as u64 / self.phase_denominator as u64
    }

    pub(crate) fn set_phase(&mut self, phase: u64, denominator: u32) {
        self.phase = phase;
        self.phase_denominator = denominator;
    }

    /// Frees buffers that have been fully played. Returns how many were removed.
    pub fn discard_consumed(&mut self) -> usize {
        let before = self.buffers.len();
        self.buffers.retain(|b| !b.is_exhausted());
        self.head = 0;
        before - self.buffers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SoundBuffer> {
        self.buffers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_samples_round_trips_through_remaining() {
        let buffer = SoundBuffer::from_samples(&[1, -2, 300]);
        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer.remaining_samples(), vec![1, -2, 300]);
    }

    #[test]
    fn test_advance_is_clamped() {
        let mut buffer = SoundBuffer::from_samples(&[1, 2]);
        buffer.advance(2);
        assert_eq!(buffer.read_offset(), 2);
        assert_eq!(buffer.remaining_samples(), vec![2]);
        buffer.advance(100);
        assert!(buffer.is_exhausted());
        assert_eq!(buffer.remaining_len(), 0);
    }

    #[test]
    fn test_head_skips_exhausted_buffers() {
        let mut queue = BufferQueue::new();
        queue.push(SoundBuffer::from_samples(&[1]));
        queue.push(SoundBuffer::from_samples(&[2]));

        queue.head_mut().unwrap().exhaust();
        assert_eq!(queue.head().unwrap().remaining_samples(), vec![2]);

        queue.head_mut().unwrap().exhaust();
        assert!(queue.is_drained());
        assert!(queue.head_mut().is_none());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_rewind_restores_every_buffer() {
        let mut queue = BufferQueue::new();
        queue.push(SoundBuffer::from_samples(&[1, 2]));
        queue.push(SoundBuffer::from_samples(&[3]));
        while let Some(buffer) = queue.head_mut() {
            buffer.exhaust();
        }
        assert_eq!(queue.remaining_bytes(), 0);

        queue.rewind();
        assert_eq!(queue.remaining_bytes(), 6);
        assert_eq!(queue.head().unwrap().remaining_samples(), vec![1, 2]);
    }

    #[test]
    fn test_phase_is_rescaled_and_rewound() {
        let mut queue = BufferQueue::new();
        queue.push(SoundBuffer::from_samples(&[1, 2]));
        assert_eq!(queue.phase(4), 0);

        queue.set_phase(1, 2);
        assert_eq!(queue.phase(2), 1);
        assert_eq!(queue.phase(6), 3);

        queue.rewind();
        assert_eq!(queue.phase(2), 0);
    }

    #[test]
    fn test_discard_consumed() {
        let mut queue = BufferQueue::new();
        queue.push(SoundBuffer::from_samples(&[1]));
        queue.push(SoundBuffer::from_samples(&[2]));
        queue.head_mut().unwrap().exhaust();

        assert_eq!(queue.discard_consumed(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.head().unwrap().remaining_samples(), vec![2]);
    }
}
