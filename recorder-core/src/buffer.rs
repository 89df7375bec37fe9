//! # Rolling Buffer Module
//!
//! Fixed-capacity circular buffer that keeps the most recent N seconds of
//! capture. Appending a block behaves like shifting the window left by the
//! block length and writing the block at the tail, but costs O(block) instead
//! of O(window): only a write cursor moves.
//!
//! Readers never see the live storage. `snapshot` rebuilds the chronological
//! order into a fresh immutable `Arc<[f32]>` that can be handed to other
//! threads while appends continue.

use std::sync::Arc;

/// Immutable, chronologically ordered copy of the rolling window.
/// Index 0 is the oldest retained sample.
pub type AudioSnapshot = Arc<[f32]>;

#[derive(Debug, Clone)]
pub struct CircularAudioBuffer {
    data: Vec<f32>,
    /// Position of the oldest sample, which is also where the next write lands.
    write_pos: usize,
}

impl CircularAudioBuffer {
    /// Creates a silent buffer holding `capacity` samples.
    ///
    /// # Panics
    /// * If `capacity` is zero
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be non-zero");
        Self {
            data: vec![0.0; capacity],
            write_pos: 0,
        }
    }

    /// Creates a buffer sized for `duration_secs` at `sample_rate`.
    pub fn with_duration(sample_rate: u32, duration_secs: u32) -> Self {
        Self::new(sample_rate as usize * duration_secs as usize)
    }

    /// Number of samples in the window. Constant for the buffer's lifetime.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends a block, discarding the oldest `block.len()` samples.
    ///
    /// A block longer than the window leaves only its last `len()` samples.
    pub fn append(&mut self, block: &[f32]) {
        let capacity = self.data.len();

        if block.len() >= capacity {
            self.data.copy_from_slice(&block[block.len() - capacity..]);
            self.write_pos = 0;
            return;
        }

        let first = (capacity - self.write_pos).min(block.len());
        self.data[self.write_pos..self.write_pos + first].copy_from_slice(&block[..first]);
        let rest = block.len() - first;
        if rest > 0 {
            self.data[..rest].copy_from_slice(&block[first..]);
        }
        self.write_pos = (self.write_pos + block.len()) % capacity;
    }

    /// Returns the window in chronological order as an independent copy.
    pub fn snapshot(&self) -> AudioSnapshot {
        let mut ordered = Vec::with_capacity(self.data.len());
        ordered.extend_from_slice(&self.data[self.write_pos..]);
        ordered.extend_from_slice(&self.data[..self.write_pos]);
        ordered.into()
    }

    /// True if any sample is non-zero. NaN counts as signal.
    pub fn has_signal(&self) -> bool {
        has_signal(&self.data)
    }

    /// Resets the window to silence.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.write_pos = 0;
    }
}

/// True if any sample is non-zero. NaN counts as signal.
pub fn has_signal(samples: &[f32]) -> bool {
    samples.iter().any(|&s| s != 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_new_buffer_is_silent_and_full_length() {
        let buffer = CircularAudioBuffer::new(8);
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 8);
        assert!(snapshot.iter().all(|&s| s == 0.0));
        assert!(!buffer.has_signal());
    }

    #[test]
    fn test_length_is_constant_for_any_block_sizes() {
        let mut buffer = CircularAudioBuffer::new(10);
        for size in [0, 1, 3, 7, 10, 11, 25, 4, 9] {
            buffer.append(&ramp(1, size));
            assert_eq!(buffer.snapshot().len(), 10);
        }
    }

    #[test]
    fn test_append_keeps_newest_at_tail() {
        let mut buffer = CircularAudioBuffer::new(6);
        buffer.append(&[1.0, 2.0, 3.0, 4.0]);
        buffer.append(&[5.0, 6.0, 7.0]);
        assert_eq!(&*buffer.snapshot(), &[2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_partial_fill_leaves_leading_silence() {
        let mut buffer = CircularAudioBuffer::new(5);
        buffer.append(&[1.0, 2.0]);
        assert_eq!(&*buffer.snapshot(), &[0.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_last_block_matches_tail_after_wrap() {
        let mut buffer = CircularAudioBuffer::new(7);
        buffer.append(&ramp(0, 5));
        buffer.append(&ramp(100, 6));
        let b2 = ramp(200, 4);
        buffer.append(&b2);

        let snapshot = buffer.snapshot();
        assert_eq!(&snapshot[snapshot.len() - b2.len()..], b2.as_slice());
        assert_eq!(&snapshot[..3], &[103.0, 104.0, 105.0]);
    }

    #[test]
    fn test_oversized_block_keeps_its_tail() {
        let mut buffer = CircularAudioBuffer::new(4);
        buffer.append(&[9.0, 9.0]);
        buffer.append(&ramp(0, 10));
        assert_eq!(&*buffer.snapshot(), &[6.0, 7.0, 8.0, 9.0]);

        // The cursor is reset, so ordinary appends continue correctly.
        buffer.append(&[42.0]);
        assert_eq!(&*buffer.snapshot(), &[7.0, 8.0, 9.0, 42.0]);
    }

    #[test]
    fn test_snapshot_is_detached_from_later_appends() {
        let mut buffer = CircularAudioBuffer::new(3);
        buffer.append(&[1.0, 2.0, 3.0]);
        let before = buffer.snapshot();
        buffer.append(&[4.0]);
        assert_eq!(&*before, &[1.0, 2.0, 3.0]);
        assert_eq!(&*buffer.snapshot(), &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_silent_blocks_keep_buffer_silent() {
        let mut buffer = CircularAudioBuffer::with_duration(40_000, 1);
        assert_eq!(buffer.len(), 40_000);
        let silence = vec![0.0; 4000];
        for _ in 0..10 {
            buffer.append(&silence);
        }
        assert!(!buffer.has_signal());
    }

    #[test]
    fn test_clear() {
        let mut buffer = CircularAudioBuffer::new(3);
        buffer.append(&[1.0, 2.0]);
        buffer.clear();
        assert!(!buffer.has_signal());
        buffer.append(&[5.0]);
        assert_eq!(&*buffer.snapshot(), &[0.0, 0.0, 5.0]);
    }

    #[test]
    fn test_nan_counts_as_signal() {
        assert!(has_signal(&[0.0, f32::NAN]));
    }
}
