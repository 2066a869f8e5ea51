use ringbuf::{traits::*, HeapRb};

/// Re-blocks capture callbacks of arbitrary length into fixed-size frames
pub struct FrameAccumulator {
    buffer: HeapRb<f32>,
    frame_size: usize,
}

impl FrameAccumulator {
    /// Create an accumulator emitting frames of `frame_size` samples
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            buffer: HeapRb::new(frame_size * 2),
            frame_size,
        }
    }

    /// Add samples and return every frame they complete
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mut frames = Vec::new();

        for &sample in samples {
            if self.buffer.try_push(sample).is_err() {
                // Full: drop the oldest sample
                let _ = self.buffer.try_pop();
                let _ = self.buffer.try_push(sample);
            }

            if self.buffer.occupied_len() >= self.frame_size {
                let mut frame = Vec::with_capacity(self.frame_size);
                for _ in 0..self.frame_size {
                    match self.buffer.try_pop() {
                        Some(s) => frame.push(s),
                        None => break,
                    }
                }
                frames.push(frame);
            }
        }

        frames
    }

    /// Samples waiting for the next frame
    pub fn pending(&self) -> usize {
        self.buffer.occupied_len()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Drop the partial frame
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reblocks_into_fixed_frames() {
        let mut acc = FrameAccumulator::new(4);
        assert!(acc.push(&[0.0, 1.0, 2.0]).is_empty());
        assert_eq!(acc.pending(), 3);

        let frames = acc.push(&[3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(frames, vec![vec![0.0, 1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0, 7.0]]);
        assert_eq!(acc.pending(), 1);
    }

    #[test]
    fn test_large_callback() {
        let mut acc = FrameAccumulator::new(3);
        let data: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let frames = acc.push(&data);
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.len() == 3));
        assert_eq!(frames[2], vec![6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_clear_drops_partial_frame() {
        let mut acc = FrameAccumulator::new(4);
        acc.push(&[1.0, 2.0]);
        acc.clear();
        assert_eq!(acc.pending(), 0);
        assert_eq!(acc.push(&[5.0, 6.0, 7.0, 8.0]), vec![vec![5.0, 6.0, 7.0, 8.0]]);
    }
}
