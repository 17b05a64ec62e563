//! Debug assertion macros for arena and queue invariants.
//!
//! Active only in debug builds (`#[cfg(debug_assertions)]`), so there is zero
//! overhead in release builds. Mirrors the invariant-tag convention used for
//! the ring buffer this crate's queue is adjacent to: each macro documents
//! exactly one slot/queue/counter invariant of the pipeline's shared-memory
//! protocol.

/// INV-SLOT-01: a slot index handed out by a ticket must be within `[0, slot_count)`.
macro_rules! debug_assert_slot_in_range {
    ($idx:expr, $count:expr) => {
        debug_assert!(
            $idx < $count,
            "INV-SLOT-01 violated: slot index {} outside arena of {} slots",
            $idx,
            $count
        )
    };
}

/// INV-Q-01: queue length never exceeds its configured capacity.
macro_rules! debug_assert_bounded_queue {
    ($len:expr, $capacity:expr) => {
        debug_assert!(
            $len <= $capacity,
            "INV-Q-01 violated: queue length {} exceeds capacity {}",
            $len,
            $capacity
        )
    };
}

/// INV-CTR-01: a published counter only ever increases.
macro_rules! debug_assert_monotonic_counter {
    ($old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "INV-CTR-01 violated: counter decreased from {} to {}",
            $old,
            $new
        )
    };
}

pub(crate) use debug_assert_bounded_queue;
pub(crate) use debug_assert_monotonic_counter;
pub(crate) use debug_assert_slot_in_range;
