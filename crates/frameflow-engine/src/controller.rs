//! The engine controller: probes source dimensions, allocates arenas, spawns
//! and joins the pipeline threads, and exposes the
//! `start`/`stop`/`check_health`/`get_progress` surface.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use frameflow_arena::{Arena, TicketQueue, DEFAULT_QUEUE_CAPACITY};
use frameflow_core::{Catalog, FrameShape};
use tracing::{info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::codec::{DecoderOpener, EncoderOpener};
use crate::consumer::{self, ConsumerTask};
use crate::error::EngineError;
use crate::producer::{self, ProducerTask};
use crate::worker::{self, WorkerTask};

const CODEC_PREFERENCE: &[&str] = &["avc1", "mp4v", "DIVX"];
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);
const JOIN_GRACE_PER_THREAD: Duration = Duration::from_millis(100);

/// Plain-data configuration backing a [`Controller::start`] call. No file
/// format and no persistence: callers build one directly, whether from CLI
/// flags or in library code.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JobSpec {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub worker_count: usize,
    pub slot_count: usize,
    pub effect_chain: Vec<String>,
}

enum State {
    Idle,
    Running(RunningJob),
}

struct RunningJob {
    input_arena: Arena,
    output_arena: Arena,
    stop: Arc<AtomicBool>,
    frame_counter: Arc<AtomicU64>,
    worker_handles: Vec<JoinHandle<()>>,
    support_handles: Vec<JoinHandle<()>>,
    start_time: Instant,
    progress: ProgressSample,
}

struct ProgressSample {
    last_sample_time: Instant,
    last_sample_frames: u64,
    last_fps: f64,
}

/// Coordinates one video-processing job at a time. Owns both arenas, the
/// queues, the stop signal, and the shared frame counter; it is the only
/// component permitted to spawn/join pipeline threads or release arenas.
pub struct Controller {
    state: Mutex<State>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::Idle) }
    }

    /// Starts a job, first calling [`Controller::stop`] to guarantee clean
    /// state. Returns a precondition error rather than panicking if the
    /// source can't be opened, the first frame can't be read, the shape is
    /// degenerate, an arena can't be allocated, or
    /// `slot_count < worker_count + 2`.
    pub fn start(
        &self,
        job: &JobSpec,
        decoder_opener: &dyn DecoderOpener,
        encoder_opener: &dyn EncoderOpener,
        catalog: Arc<Catalog>,
    ) -> Result<(), EngineError> {
        self.stop();

        let need = job.worker_count + 2;
        if job.slot_count < need {
            return Err(EngineError::InsufficientSlots { have: job.slot_count, need });
        }

        let mut decoder = decoder_opener.open(&job.source).map_err(|reason| {
            EngineError::SourceOpenFailed { path: job.source.display().to_string(), reason }
        })?;
        let fps = decoder.fps();

        // Trust the first decoded frame's actual pixel dimensions over any
        // container metadata.
        let first_frame = match decoder.read_frame() {
            Ok(Some(frame)) => frame,
            _ => {
                return Err(EngineError::FirstFrameReadFailed { path: job.source.display().to_string() });
            }
        };
        let shape = first_frame.shape();
        if shape.height == 0 || shape.width == 0 {
            return Err(EngineError::DegenerateShape { shape });
        }

        let pid = std::process::id();
        let input_name = format!("shm_in_{pid}");
        let output_name = format!("shm_out_{pid}");

        let input_arena = Arena::allocate(&input_name, job.slot_count, shape.byte_len())
            .map_err(|source| EngineError::ArenaAllocationFailed { name: input_name.clone(), source })?;
        let output_arena = Arena::allocate(&output_name, job.slot_count, shape.byte_len())
            .map_err(|source| EngineError::ArenaAllocationFailed { name: output_name.clone(), source })?;

        let (encoder, codec) = encoder_opener
            .open(&job.destination, shape, fps, CODEC_PREFERENCE)
            .map_err(|reason| EngineError::DestinationOpenFailed {
                path: job.destination.display().to_string(),
                reason,
            })?;
        info!(codec, shape = %shape, worker_count = job.worker_count, "job starting");

        let input_queue = Arc::new(TicketQueue::new(DEFAULT_QUEUE_CAPACITY));
        let output_queue = Arc::new(TicketQueue::new(DEFAULT_QUEUE_CAPACITY));
        let stop = Arc::new(AtomicBool::new(false));
        let frame_counter = Arc::new(AtomicU64::new(0));
        let effect_chain = Arc::new(job.effect_chain.clone());

        let producer_handle = thread::spawn({
            let task = ProducerTask {
                decoder,
                primed_first_frame: first_frame,
                input_arena_name: input_name.clone(),
                shape,
                slot_count: job.slot_count,
                input_queue: Arc::clone(&input_queue),
                stop: Arc::clone(&stop),
                frame_limit: None,
            };
            move || producer::run(task)
        });

        let mut worker_handles = Vec::with_capacity(job.worker_count);
        for _ in 0..job.worker_count {
            let task = WorkerTask {
                input_arena_name: input_name.clone(),
                output_arena_name: output_name.clone(),
                shape,
                slot_count: job.slot_count,
                input_queue: Arc::clone(&input_queue),
                output_queue: Arc::clone(&output_queue),
                stop: Arc::clone(&stop),
                catalog: Arc::clone(&catalog),
                effect_chain: Arc::clone(&effect_chain),
            };
            worker_handles.push(thread::spawn(move || worker::run(task)));
        }

        let consumer_handle = thread::spawn({
            let task = ConsumerTask {
                encoder,
                output_arena_name: output_name.clone(),
                shape,
                slot_count: job.slot_count,
                output_queue: Arc::clone(&output_queue),
                stop: Arc::clone(&stop),
                worker_count: job.worker_count,
                frame_counter: Arc::clone(&frame_counter),
            };
            move || consumer::run(task)
        });

        let running = RunningJob {
            input_arena,
            output_arena,
            stop,
            frame_counter,
            worker_handles,
            support_handles: vec![producer_handle, consumer_handle],
            start_time: Instant::now(),
            progress: ProgressSample { last_sample_time: Instant::now(), last_sample_frames: 0, last_fps: 0.0 },
        };

        *self.state.lock().expect("controller mutex poisoned") = State::Running(running);
        Ok(())
    }

    /// Idempotent shutdown: sets the stop signal, allows a short grace
    /// period for threads to exit their loop heads, detaches any survivor
    /// (Rust has no safe thread-kill), then releases both arenas.
    pub fn stop(&self) {
        let running = {
            let mut guard = self.state.lock().expect("controller mutex poisoned");
            match std::mem::replace(&mut *guard, State::Idle) {
                State::Running(running) => Some(running),
                State::Idle => None,
            }
        };
        let Some(mut running) = running else {
            return;
        };

        running.stop.store(true, Ordering::Release);

        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        handles.append(&mut running.support_handles);
        handles.append(&mut running.worker_handles);

        let grace = JOIN_GRACE_PER_THREAD * handles.len().max(1) as u32;
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline && handles.iter().any(|h| !h.is_finished()) {
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        for handle in handles {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("pipeline thread outlived its grace period, detaching");
                drop(handle);
            }
        }

        running.input_arena.release();
        running.output_arena.release();
        info!("job stopped, arenas released");
    }

    /// True iff any pipeline thread — producer, effect worker, or consumer —
    /// is still alive while the job is marked running. A worker finishing
    /// and forwarding the sentinel does not by itself mean the job is done:
    /// the consumer (the documented bottleneck, since its encoder writes
    /// throttle the whole pipeline) is typically still draining and
    /// reassembling the remainder of the output queue. Callers that stop
    /// polling as soon as the workers alone go quiet, and then call `stop`,
    /// would cut off the consumer mid-drain and truncate the destination.
    pub fn check_health(&self) -> bool {
        match &*self.state.lock().expect("controller mutex poisoned") {
            State::Running(running) => {
                running.worker_handles.iter().any(|h| !h.is_finished())
                    || running.support_handles.iter().any(|h| !h.is_finished())
            }
            State::Idle => false,
        }
    }

    /// `(elapsed_seconds, fps_smoothed, frames_written)`. `fps` is
    /// recomputed at most every 500ms, otherwise the previous value is
    /// returned to smooth against sampling jitter.
    pub fn get_progress(&self) -> (f64, f64, u64) {
        match &mut *self.state.lock().expect("controller mutex poisoned") {
            State::Running(running) => {
                let elapsed = running.start_time.elapsed().as_secs_f64();
                let frames = running.frame_counter.load(Ordering::Acquire);
                let now = Instant::now();
                let since_sample = now.duration_since(running.progress.last_sample_time);
                if since_sample >= Duration::from_millis(500) {
                    let dframes = frames.saturating_sub(running.progress.last_sample_frames);
                    let dt = since_sample.as_secs_f64();
                    if dt > 0.0 {
                        running.progress.last_fps = dframes as f64 / dt;
                    }
                    running.progress.last_sample_time = now;
                    running.progress.last_sample_frames = frames;
                }
                (elapsed, running.progress.last_fps, frames)
            }
            State::Idle => (0.0, 0.0, 0),
        }
    }
}
