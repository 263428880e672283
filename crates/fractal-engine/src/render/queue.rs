/// Draws waiting for the next [`render`](super::InstancedMeshRenderer::render),
/// keyed by instance buffer id.
///
/// Holds at most one entry per buffer: a later request for the same buffer
/// replaces the earlier one in place. Frames whose surface could not be
/// acquired therefore never stack up duplicate draws; the next rendered frame
/// draws each buffer once with its latest contents.
#[derive(Debug)]
pub(super) struct DrawQueue<T> {
    entries: Vec<(u64, T)>,
}

impl<T> Default for DrawQueue<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> DrawQueue<T> {
    pub fn push(&mut self, buffer_id: u64, draw: T) {
        match self.entries.iter_mut().find(|(id, _)| *id == buffer_id) {
            Some((_, slot)) => *slot = draw,
            None => self.entries.push((buffer_id, draw)),
        }
    }

    /// Drops the entry for a released buffer, if any.
    pub fn forget(&mut self, buffer_id: u64) {
        self.entries.retain(|(id, _)| *id != buffer_id);
    }

    /// Empties the queue, returning draws in first-request order.
    pub fn take(&mut self) -> Vec<T> {
        std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(_, draw)| draw)
            .collect()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_requests_for_a_buffer_keep_the_latest() {
        let mut q = DrawQueue::default();
        // Three frames' worth of level draws with no render in between.
        for frame in 0..3 {
            for level in 0..4u64 {
                q.push(level, (level, frame));
            }
        }
        assert_eq!(q.take(), vec![(0, 2), (1, 2), (2, 2), (3, 2)]);
        assert!(q.is_empty());
    }

    #[test]
    fn forget_removes_only_that_buffer() {
        let mut q = DrawQueue::default();
        q.push(7, "a");
        q.push(8, "b");
        q.forget(7);
        q.forget(99);
        assert_eq!(q.take(), vec!["b"]);
    }

    #[test]
    fn take_leaves_queue_reusable() {
        let mut q = DrawQueue::default();
        q.push(1, 1);
        assert_eq!(q.take(), vec![1]);
        q.push(1, 2);
        assert_eq!(q.take(), vec![2]);
    }
}
