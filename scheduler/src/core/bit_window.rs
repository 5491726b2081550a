use bitvec::prelude::*;
use log::debug;

/// Rolling window of apply outcomes (conflict = 1) driving the worker
/// pool size.
pub struct ConflictBitWindow {
    bits: BitVec,
    cursor: usize,
    observed: usize,
    conflicts: usize,
    threshold_percent: usize,
    min_pool_size: usize,
    max_pool_size: usize,
}

impl ConflictBitWindow {
    pub fn new(window_size: usize, threshold_percent: u8, max_pool_size: usize) -> Self {
        Self {
            bits: bitvec![0; window_size.max(1)],
            cursor: 0,
            observed: 0,
            conflicts: 0,
            threshold_percent: threshold_percent.min(100) as usize,
            min_pool_size: 1,
            max_pool_size: max_pool_size.max(1),
        }
    }

    pub fn window_size(&self) -> usize {
        self.bits.len()
    }

    pub fn max_pool_size(&self) -> usize {
        self.max_pool_size
    }

    /// Cap the pool size, e.g. to the number of senders still active
    pub fn set_max_pool_size(&mut self, max_pool_size: usize) {
        self.max_pool_size = max_pool_size.max(self.min_pool_size);
    }

    /// Record one outcome.
    ///
    /// Returns the new pool size once the window is full, then once per
    /// window, and `None` in between.
    pub fn enqueue(&mut self, conflict: bool, current_pool_size: usize) -> Option<usize> {
        if self.bits[self.cursor] {
            self.conflicts -= 1;
        }
        self.bits.set(self.cursor, conflict);
        if conflict {
            self.conflicts += 1;
        }
        self.cursor = (self.cursor + 1) % self.bits.len();
        self.observed += 1;

        if self.observed % self.bits.len() != 0 {
            return None;
        }

        let size = self.target_pool_size(current_pool_size);
        debug!(
            "[BIT_WINDOW] {} conflicts in {}, pool size {} -> {}",
            self.conflicts,
            self.bits.len(),
            current_pool_size,
            size
        );
        Some(size)
    }

    fn target_pool_size(&self, current: usize) -> usize {
        let window = self.bits.len();
        let (min, max) = (self.min_pool_size, self.max_pool_size);

        let size = if self.conflicts * 100 > self.threshold_percent * window {
            current / 2
        } else {
            let span = max - min;
            let free = window - self.conflicts;
            let target = min + span * free / window;
            if target <= current {
                target
            } else {
                let step = span.div_ceil(8).max(1);
                target.min(current.saturating_add(step))
            }
        };

        size.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_silent_until_window_full() {
        let mut window = ConflictBitWindow::new(4, 50, 16);
        for _ in 0..3 {
            assert_eq!(window.enqueue(false, 8), None);
        }
        assert!(window.enqueue(false, 8).is_some());
        for _ in 0..3 {
            assert_eq!(window.enqueue(false, 8), None);
        }
    }

    #[test]
    fn test_high_conflict_halves() {
        let mut window = ConflictBitWindow::new(4, 50, 16);
        for _ in 0..3 {
            window.enqueue(true, 8);
        }
        assert_eq!(window.enqueue(true, 8), Some(4));
    }

    #[test]
    fn test_growth_is_stepped() {
        let mut window = ConflictBitWindow::new(4, 50, 17);
        for _ in 0..3 {
            window.enqueue(false, 2);
        }
        // target is 17, one step is ceil(16 / 8) = 2
        assert_eq!(window.enqueue(false, 2), Some(4));
    }

    #[test]
    fn test_low_conflict_shrinks_to_target() {
        let mut window = ConflictBitWindow::new(4, 50, 17);
        window.enqueue(true, 16);
        window.enqueue(true, 16);
        window.enqueue(false, 16);
        // 2 conflicts of 4: target = 1 + 16 * 2 / 4 = 9
        assert_eq!(window.enqueue(false, 16), Some(9));
    }

    #[test]
    fn test_max_follows_active_senders() {
        let mut window = ConflictBitWindow::new(2, 50, 16);
        window.set_max_pool_size(3);
        window.enqueue(false, 3);
        assert_eq!(window.enqueue(false, 3), Some(3));
    }

    proptest! {
        #[test]
        fn prop_size_within_bounds(
            outcomes in prop::collection::vec(any::<bool>(), 1..200),
            window_size in 1usize..20,
            max in 1usize..64,
            threshold in 0u8..=100,
        ) {
            let mut window = ConflictBitWindow::new(window_size, threshold, max);
            let mut size = max;
            for conflict in outcomes {
                if let Some(next) = window.enqueue(conflict, size) {
                    prop_assert!(next >= 1 && next <= max);
                    size = next;
                }
            }
        }
    }
}
