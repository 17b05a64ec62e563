//! The effect worker stage: consumes input tickets, folds the effect chain
//! over a private staged copy, and emits output tickets at the same slot
//! index.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use frameflow_arena::{Arena, QueueError, Ticket, TicketQueue};
use frameflow_core::{apply_chain, Catalog, Frame, FrameShape};
use tracing::{error, warn};

const POLL_TIMEOUT: Duration = Duration::from_millis(100);

pub(crate) struct WorkerTask {
    pub input_arena_name: String,
    pub output_arena_name: String,
    pub shape: FrameShape,
    pub slot_count: usize,
    pub input_queue: Arc<TicketQueue>,
    pub output_queue: Arc<TicketQueue>,
    pub stop: Arc<AtomicBool>,
    pub catalog: Arc<Catalog>,
    pub effect_chain: Arc<Vec<String>>,
}

pub(crate) fn run(task: WorkerTask) {
    let input_arena = match Arena::attach(&task.input_arena_name, task.slot_count, task.shape.byte_len()) {
        Ok(arena) => arena,
        Err(err) => {
            error!(name = %task.input_arena_name, %err, "worker failed to attach input arena");
            return;
        }
    };
    let output_arena = match Arena::attach(&task.output_arena_name, task.slot_count, task.shape.byte_len()) {
        Ok(arena) => arena,
        Err(err) => {
            error!(name = %task.output_arena_name, %err, "worker failed to attach output arena");
            return;
        }
    };

    loop {
        if task.stop.load(Ordering::Acquire) {
            return;
        }
        let ticket = match task.input_queue.get(POLL_TIMEOUT) {
            Ok(ticket) => ticket,
            Err(QueueError::Timeout) => continue,
        };

        if ticket.is_sentinel() {
            // Re-enqueue onto the input queue so peer workers observe it too,
            // then exit immediately without draining further. This
            // propagation happens unconditionally, even if the stop signal
            // is already set, so peers don't starve waiting for it.
            enqueue_sentinel(&task.input_queue);
            enqueue_sentinel(&task.output_queue);
            return;
        }

        let slot = ticket.slot_index();
        let staged = Frame::copy_from_slice(task.shape, input_arena.view(slot));
        let processed = apply_chain(&staged, &task.effect_chain, &task.catalog);
        output_arena.view_mut(slot).copy_from_slice(processed.as_slice());

        let out_ticket = Ticket::new(slot, ticket.frame_index());
        if !retry_put(&task.output_queue, out_ticket, &task.stop) {
            return;
        }
    }
}

/// Retries a blocking `put` until it succeeds or the stop signal fires.
/// Returns `false` if the stop signal cut the retry short.
fn retry_put(queue: &TicketQueue, ticket: Ticket, stop: &AtomicBool) -> bool {
    loop {
        match queue.put(ticket, POLL_TIMEOUT) {
            Ok(()) => return true,
            Err(QueueError::Timeout) => {
                if stop.load(Ordering::Acquire) {
                    return false;
                }
            }
        }
    }
}

/// Enqueues a sentinel unconditionally, ignoring the stop signal: sentinel
/// propagation must complete so that peer workers and the Consumer observe
/// end-of-stream rather than stalling on a queue that never closes.
fn enqueue_sentinel(queue: &TicketQueue) {
    loop {
        match queue.put(Ticket::SENTINEL, POLL_TIMEOUT) {
            Ok(()) => return,
            Err(QueueError::Timeout) => {
                warn!("queue full while propagating sentinel, retrying");
            }
        }
    }
}
