//! Snapshots pushed to subscribers and an idempotent consumer for them.
//!
//! The store delivers a full result set after every relevant commit. Delivery
//! may repeat or arrive out of order, so consumers keep the highest sequence
//! they have applied and ignore anything at or below it.

use crate::document_store::Document;
use serde::{Deserialize, Serialize};

/// Result set of a subscribed query as of a store sequence number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Store sequence of the last commit reflected here.
    pub sequence: u64,
    /// Matching documents, ordered by id.
    pub documents: Vec<Document>,
}

/// Latest-wins view over a snapshot stream.
///
/// # Example
///
/// ```
/// use talkboard_core::subscription::LiveView;
///
/// let mut view: LiveView<usize> = LiveView::new();
/// assert!(view.apply(3, 10));
/// assert!(!view.apply(3, 10)); // duplicate
/// assert!(!view.apply(2, 9)); // stale
/// assert_eq!(view.current(), Some(&10));
/// ```
#[derive(Clone, Debug)]
pub struct LiveView<T> {
    sequence: Option<u64>,
    value: Option<T>,
}

impl<T> Default for LiveView<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LiveView<T> {
    /// Empty view.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sequence: None,
            value: None,
        }
    }

    /// Replace the current value if `sequence` is newer than anything applied.
    ///
    /// Returns whether the value changed.
    pub fn apply(&mut self, sequence: u64, value: T) -> bool {
        if self.sequence.is_some_and(|seen| sequence <= seen) {
            return false;
        }
        self.sequence = Some(sequence);
        self.value = Some(value);
        true
    }

    /// Latest applied value.
    #[must_use]
    pub const fn current(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Sequence of the latest applied value.
    #[must_use]
    pub const fn sequence(&self) -> Option<u64> {
        self.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_view_holds_value_of_highest_sequence(
            deliveries in proptest::collection::vec(0u64..20, 1..40)
        ) {
            let mut view = LiveView::new();
            for seq in &deliveries {
                // value is a function of the sequence, as a real snapshot is
                view.apply(*seq, seq * 100);
            }
            let max = deliveries.iter().copied().max().unwrap_or_default();
            prop_assert_eq!(view.sequence(), Some(max));
            prop_assert_eq!(view.current(), Some(&(max * 100)));
        }
    }
}
