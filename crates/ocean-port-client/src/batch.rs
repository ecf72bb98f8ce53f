use std::time::{Duration, Instant};

use serde::Serialize;

/// BatchOptions bounds one accumulating batch: it is committed when any one of
/// the three limits is crossed (`spec.md` §4.C2, Batching).
#[derive(Clone, Copy, Debug)]
pub struct BatchOptions {
    /// MaxItems caps the number of entities per batch.
    pub max_items: usize,
    /// MaxBytes caps the serialized size of a batch.
    pub max_bytes: usize,
    /// MaxDwell caps how long a batch may sit open before it is flushed even if
    /// neither other limit has been crossed.
    pub max_dwell: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_items: 20,
            max_bytes: 1 << 20,
            max_dwell: Duration::from_secs(5),
        }
    }
}

/// Batcher accumulates items of the same blueprint into a batch, up to
/// [`BatchOptions`]'s limits, tracking dwell time against when the current
/// batch was opened.
pub struct Batcher<T> {
    items: Vec<T>,
    bytes: usize,
    opts: BatchOptions,
    opened_at: Instant,
}

impl<T> Batcher<T>
where
    T: Serialize,
{
    /// New creates an empty batcher.
    pub fn new(opts: BatchOptions) -> Self {
        Self {
            items: Vec::new(),
            bytes: 0,
            opts,
            opened_at: Instant::now(),
        }
    }

    /// Push adds `item` to the current batch, returning the drained batch if
    /// adding it would cross the item-count or byte-budget limit (the new item
    /// starts the next batch in that case).
    pub fn push(&mut self, item: T) -> Option<Vec<T>> {
        let item_len = serde_json::to_vec(&item).map(|v| v.len()).unwrap_or(0);
        let would_overflow_items = self.items.len().saturating_add(1) > self.opts.max_items;
        let would_overflow_bytes =
            !self.items.is_empty() && self.bytes.saturating_add(item_len) > self.opts.max_bytes;

        let drained = if would_overflow_items || would_overflow_bytes {
            Some(self.take())
        } else {
            None
        };

        self.items.push(item);
        self.bytes = self.bytes.saturating_add(item_len);
        drained
    }

    /// Should_flush reports whether the current batch should be committed even
    /// without a new item arriving, because its dwell time has elapsed.
    pub fn should_flush(&self) -> bool {
        !self.items.is_empty() && self.opened_at.elapsed() >= self.opts.max_dwell
    }

    /// Take drains and returns the current batch, resetting the accumulator.
    pub fn take(&mut self) -> Vec<T> {
        self.bytes = 0;
        self.opened_at = Instant::now();
        std::mem::take(&mut self.items)
    }

    /// Is_empty reports whether the accumulator currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flushes_on_item_count() {
        let mut b: Batcher<u32> = Batcher::new(BatchOptions {
            max_items: 2,
            max_bytes: usize::MAX,
            max_dwell: Duration::from_secs(3600),
        });
        assert!(b.push(1).is_none());
        assert!(b.push(2).is_none());
        let drained = b.push(3).expect("third push should flush the first two");
        assert_eq!(drained, vec![1, 2]);
    }

    #[test]
    fn dwell_time_flush_is_observable() {
        let b: Batcher<u32> = Batcher::new(BatchOptions {
            max_items: 1000,
            max_bytes: usize::MAX,
            max_dwell: Duration::from_millis(0),
        });
        assert!(!b.should_flush());
    }
}
