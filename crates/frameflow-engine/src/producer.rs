//! The producer stage: decodes frames sequentially, normalizes each to the
//! job's canonical shape, and hands them to workers over the input
//! arena/queue pair.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use frameflow_arena::{Arena, QueueError, Ticket, TicketQueue};
use frameflow_core::{Frame, FrameShape};
use tracing::{error, warn};

use crate::codec::Decoder;

/// The interval a blocked queue `put` retries at while checking the stop
/// signal: every worker must return to the loop head at least every ~100 ms.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

pub(crate) struct ProducerTask {
    pub decoder: Box<dyn Decoder>,
    pub primed_first_frame: Frame,
    pub input_arena_name: String,
    pub shape: FrameShape,
    pub slot_count: usize,
    pub input_queue: Arc<TicketQueue>,
    pub stop: Arc<AtomicBool>,
    pub frame_limit: Option<u64>,
}

pub(crate) fn run(mut task: ProducerTask) {
    let arena = match Arena::attach(&task.input_arena_name, task.slot_count, task.shape.byte_len()) {
        Ok(arena) => arena,
        Err(err) => {
            error!(name = %task.input_arena_name, %err, "producer failed to attach input arena");
            enqueue_sentinel(&task.input_queue);
            return;
        }
    };

    let mut frame_idx: u64 = 0;
    let mut slot_idx: usize = 0;

    // The first frame was already decoded by the controller to fix the
    // canonical shape, so it's written here rather than re-read.
    if !write_and_enqueue(&arena, &task.input_queue, &task.stop, task.primed_first_frame, slot_idx, frame_idx) {
        finish(&mut task.decoder, &task.input_queue);
        return;
    }
    frame_idx += 1;
    slot_idx = (slot_idx + 1) % task.slot_count;

    loop {
        if task.stop.load(Ordering::Acquire) {
            break;
        }
        if let Some(limit) = task.frame_limit {
            if frame_idx >= limit {
                break;
            }
        }
        let frame = match task.decoder.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(reason) => {
                error!(%reason, "producer decoder read failed, ending stream");
                break;
            }
        };
        let normalized = if frame.shape() == task.shape { frame } else { frame.rescale_to(task.shape) };

        if !write_and_enqueue(&arena, &task.input_queue, &task.stop, normalized, slot_idx, frame_idx) {
            break;
        }
        frame_idx += 1;
        slot_idx = (slot_idx + 1) % task.slot_count;
    }

    finish(&mut task.decoder, &task.input_queue);
}

/// Writes `frame` into `slot_idx` and enqueues its ticket, retrying the
/// blocking `put` until it succeeds or the stop signal is observed.
/// Returns `false` if the stop signal cut the retry short.
fn write_and_enqueue(
    arena: &Arena,
    queue: &TicketQueue,
    stop: &AtomicBool,
    frame: Frame,
    slot_idx: usize,
    frame_idx: u64,
) -> bool {
    arena.view_mut(slot_idx).copy_from_slice(frame.as_slice());
    let ticket = Ticket::new(slot_idx, frame_idx);
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

/// All exit paths enqueue exactly one sentinel and close the decoder.
fn finish(decoder: &mut Box<dyn Decoder>, queue: &TicketQueue) {
    enqueue_sentinel(queue);
    // `Decoder` has no explicit close in this trait — dropping releases any
    // resources the implementation holds (e.g. `RawFileDecoder`'s file handle).
    let _ = decoder;
}

fn enqueue_sentinel(queue: &TicketQueue) {
    loop {
        match queue.put(Ticket::SENTINEL, POLL_TIMEOUT) {
            Ok(()) => return,
            Err(QueueError::Timeout) => {
                warn!("input queue full while enqueueing sentinel, retrying");
            }
        }
    }
}
