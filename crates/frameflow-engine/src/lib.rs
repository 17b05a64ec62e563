//! The producer/worker-pool/consumer pipeline and the Engine Controller
//! that wires it to [`frameflow_arena`] and [`frameflow_core`].

mod codec;
mod consumer;
mod controller;
mod error;
mod producer;
mod worker;

pub use codec::{Decoder, DecoderOpener, Encoder, EncoderOpener, RawFileCodec, RawFileDecoder, RawFileEncoder};
pub use controller::{Controller, JobSpec};
pub use error::EngineError;
