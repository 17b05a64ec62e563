//! Named shared-memory frame arenas and bounded ticket queues.
//!
//! The two leaf primitives of the frameflow pipeline core: a fixed-slot
//! [`Arena`] of OS-backed shared memory that producer/worker/consumer
//! stages attach to by name, and a bounded [`TicketQueue`] of
//! `(slot_index, frame_index)` tickets used to hand work between them
//! without copying frame bytes.
//!
//! Unix-only (POSIX `shm_open`/`mmap`); see [`arena`] for details.

mod arena;
mod backoff;
mod invariants;
mod metrics;
mod queue;
mod ticket;

pub use arena::{Arena, ArenaError};
pub use backoff::Backoff;
pub use metrics::{Metrics, MetricsSnapshot};
pub use queue::{QueueError, TicketQueue, DEFAULT_QUEUE_CAPACITY};
pub use ticket::Ticket;
