//! The consumer stage: reorders output tickets by `frame_index` and writes
//! frames to the encoder in strict source order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use frameflow_arena::{Arena, QueueError, TicketQueue};
use frameflow_core::{Frame, FrameShape};
use tracing::warn;

use crate::codec::Encoder;

const POLL_TIMEOUT: Duration = Duration::from_millis(100);

pub(crate) struct ConsumerTask {
    pub encoder: Box<dyn Encoder>,
    pub output_arena_name: String,
    pub shape: FrameShape,
    pub slot_count: usize,
    pub output_queue: Arc<TicketQueue>,
    pub stop: Arc<AtomicBool>,
    pub worker_count: usize,
    pub frame_counter: Arc<AtomicU64>,
}

pub(crate) fn run(mut task: ConsumerTask) {
    let arena = match Arena::attach(&task.output_arena_name, task.slot_count, task.shape.byte_len()) {
        Ok(arena) => arena,
        Err(err) => {
            warn!(name = %task.output_arena_name, %err, "consumer failed to attach output arena");
            let _ = task.encoder.close();
            return;
        }
    };

    let mut pending: HashMap<u64, Vec<u8>> = HashMap::new();
    let mut next_needed: u64 = 0;
    let mut finished_workers: usize = 0;

    'main: loop {
        if task.stop.load(Ordering::Acquire) {
            break;
        }
        let ticket = match task.output_queue.get(POLL_TIMEOUT) {
            Ok(ticket) => ticket,
            Err(QueueError::Timeout) => continue,
        };

        if ticket.is_sentinel() {
            finished_workers += 1;
            if finished_workers >= task.worker_count {
                break;
            }
            continue;
        }

        // Copy out immediately: this releases the slot for reuse by the
        // producer without waiting on reassembly.
        let bytes = arena.view(ticket.slot_index()).to_vec();
        pending.insert(ticket.frame_index(), bytes);

        while let Some(bytes) = pending.remove(&next_needed) {
            let frame = Frame::new(task.shape, bytes);
            if let Err(reason) = task.encoder.write_frame(&frame) {
                warn!(%reason, frame_index = next_needed, "encoder write failed, consumer exiting");
                break 'main;
            }
            task.frame_counter.fetch_add(1, Ordering::AcqRel);
            next_needed += 1;
        }
    }

    // On stop (or a terminal encoder failure) the reorder buffer is
    // discarded, not flushed.
    let _ = task.encoder.close();
}
