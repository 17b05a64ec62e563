//! The frame shape and an owned, contiguous frame buffer.
//!
//! All frames in a job share one `(H,W,C)` shape; byte length is `H*W*C`.
//! `Frame` is the owned, heap-backed staging copy a worker makes before
//! folding the effect chain over it (it never aliases arena memory — see
//! `frameflow-arena::Arena::view`/`view_mut`).

use std::fmt;

/// The canonical `(height, width, channels)` triple fixed for a whole job
/// by reading the first decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl FrameShape {
    /// 8-bit unsigned, 3-channel frames only.
    pub const CHANNELS: usize = 3;

    pub const fn new(height: usize, width: usize) -> Self {
        Self { height, width, channels: Self::CHANNELS }
    }

    /// Byte length of one frame at this shape: `H·W·C`.
    pub const fn byte_len(&self) -> usize {
        self.height * self.width * self.channels
    }
}

impl fmt::Display for FrameShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

/// An owned, row-major contiguous frame buffer.
///
/// Distinct from the zero-copy slot views in `frameflow-arena`: a `Frame`
/// is the worker's private staging copy, used so that effect kernels never
/// mutate the input arena in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    shape: FrameShape,
    bytes: Vec<u8>,
}

impl Frame {
    /// Builds a frame from bytes already matching `shape.byte_len()`.
    ///
    /// # Panics
    /// Panics if `bytes.len() != shape.byte_len()` — this is an internal
    /// consistency requirement, not a user input to validate at a boundary.
    pub fn new(shape: FrameShape, bytes: Vec<u8>) -> Self {
        assert_eq!(
            bytes.len(),
            shape.byte_len(),
            "frame byte length {} does not match shape {}",
            bytes.len(),
            shape
        );
        Self { shape, bytes }
    }

    /// Builds a zeroed frame of the given shape.
    pub fn zeroed(shape: FrameShape) -> Self {
        Self { shape, bytes: vec![0u8; shape.byte_len()] }
    }

    /// Copies `src` (a raw slot view) into an owned `Frame` of `shape`.
    pub fn copy_from_slice(shape: FrameShape, src: &[u8]) -> Self {
        assert_eq!(src.len(), shape.byte_len(), "source slice does not match frame shape");
        Self { shape, bytes: src.to_vec() }
    }

    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Nearest-neighbor rescale to `target`. Used by the producer when a
    /// decoded frame's shape disagrees with the canonical shape; real codecs
    /// would use a proper resampler, but that lives behind the `Decoder`
    /// boundary, not in this core.
    pub fn rescale_to(&self, target: FrameShape) -> Frame {
        if self.shape == target {
            return self.clone();
        }
        let mut out = vec![0u8; target.byte_len()];
        for y in 0..target.height {
            let src_y = if target.height == 0 { 0 } else { y * self.shape.height / target.height };
            for x in 0..target.width {
                let src_x = if target.width == 0 { 0 } else { x * self.shape.width / target.width };
                let src_off = (src_y * self.shape.width + src_x) * self.shape.channels;
                let dst_off = (y * target.width + x) * target.channels;
                for c in 0..target.channels.min(self.shape.channels) {
                    out[dst_off + c] = self.bytes[src_off + c];
                }
            }
        }
        Frame::new(target, out)
    }
}
