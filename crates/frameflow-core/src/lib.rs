//! Frame shapes, owned frame buffers, and the effect catalog/chain executor.
//!
//! This crate has no knowledge of shared memory, threads, or queues — it is
//! the pure, single-threaded half of the pipeline core. `frameflow-engine`
//! wires it to `frameflow-arena` to build the actual worker pipeline.

mod effects;
mod frame;

pub use effects::{apply_chain, Catalog, EffectError, EffectFn};
pub use frame::{Frame, FrameShape};
