use crossbeam::queue::ArrayQueue;

use super::SharedFrame;

/// Bounded hand-off between a capture loop and its detection loop.
///
/// Pushing never blocks. When the queue is full the incoming frame is
/// dropped and the queued frames stay untouched and in capture order.
pub struct FrameBuffer {
    queue: ArrayQueue<SharedFrame>,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Returns `false` if the frame was dropped because the buffer is full.
    pub fn push(&self, frame: SharedFrame) -> bool {
        self.queue.push(frame).is_ok()
    }

    pub fn pop(&self) -> Option<SharedFrame> {
        self.queue.pop()
    }

    /// Empty the buffer and hand back the newest frame plus how many older
    /// frames were discarded on the way.
    pub fn drain_newest(&self) -> Option<(SharedFrame, usize)> {
        let mut newest = self.queue.pop()?;
        let mut skipped = 0;
        while let Some(frame) = self.queue.pop() {
            newest = frame;
            skipped += 1;
        }
        Some((newest, skipped))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Frame;
    use chrono::Utc;
    use image::RgbImage;
    use std::sync::Arc;

    fn frame(seq: u64) -> SharedFrame {
        Arc::new(Frame {
            camera_id: "cam".to_string(),
            image: RgbImage::new(2, 2),
            captured_at: Utc::now(),
            sequence_num: seq,
        })
    }

    #[test]
    fn test_full_buffer_drops_newest() {
        let buffer = FrameBuffer::new(10);
        for seq in 0..10 {
            assert!(buffer.push(frame(seq)));
        }
        assert!(buffer.is_full());

        assert!(!buffer.push(frame(10)));
        assert_eq!(buffer.len(), 10);

        let order: Vec<u64> = std::iter::from_fn(|| buffer.pop())
            .map(|f| f.sequence_num)
            .collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_newest() {
        let buffer = FrameBuffer::new(4);
        assert!(buffer.drain_newest().is_none());

        for seq in 0..3 {
            buffer.push(frame(seq));
        }
        let (newest, skipped) = buffer.drain_newest().unwrap();
        assert_eq!(newest.sequence_num, 2);
        assert_eq!(skipped, 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let buffer = FrameBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
    }
}
