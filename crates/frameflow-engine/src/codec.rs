//! The `Decoder`/`Encoder` trait boundary and a raw, codec-free reference
//! implementation of each.
//!
//! Real video decoding/encoding is out of scope for this core; these traits
//! are the seam a future `ffmpeg`-backed implementation would satisfy.
//! `RawFileDecoder`/`RawFileEncoder` read/write a trivial fixed-header
//! container (magic, height, width, fps, then back-to-back `H*W*3`-byte
//! frames read until EOF) so the pipeline can be driven end-to-end in tests
//! without a real codec dependency.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use frameflow_core::{Frame, FrameShape};

const MAGIC: &[u8; 4] = b"FFLW";

/// Supplies decoded frames one at a time, in source order.
pub trait Decoder: Send {
    /// Reads the next frame, or `Ok(None)` at end of stream.
    fn read_frame(&mut self) -> Result<Option<Frame>, String>;

    /// Source frame rate, as reported by the container/stream.
    fn fps(&self) -> f64;
}

/// Accepts frames in source order and writes them to a destination.
pub trait Encoder: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), String>;

    /// Flushes and closes the destination. Called exactly once, on the
    /// consumer's exit path.
    fn close(&mut self) -> Result<(), String>;
}

/// Opens a [`Decoder`] by source path. The indirection lets the controller
/// stay codec-agnostic: a future `ffmpeg`-backed opener can be substituted
/// without touching `frameflow-engine`'s pipeline logic.
pub trait DecoderOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>, String>;
}

/// Opens an [`Encoder`] by destination path, trying `codec_preference` in
/// order and reporting which one was honored.
pub trait EncoderOpener: Send + Sync {
    fn open(
        &self,
        path: &Path,
        shape: FrameShape,
        fps: f64,
        codec_preference: &[&str],
    ) -> Result<(Box<dyn Encoder>, String), String>;
}

/// The reference raw-container opener pair used by `frameflow-cli` and the
/// integration tests when no real codec is wired in.
pub struct RawFileCodec;

impl DecoderOpener for RawFileCodec {
    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>, String> {
        RawFileDecoder::open(path).map(|d| Box::new(d) as Box<dyn Decoder>)
    }
}

impl EncoderOpener for RawFileCodec {
    fn open(
        &self,
        path: &Path,
        shape: FrameShape,
        fps: f64,
        codec_preference: &[&str],
    ) -> Result<(Box<dyn Encoder>, String), String> {
        RawFileEncoder::open(path, shape, fps, codec_preference)
            .map(|(enc, codec)| (Box::new(enc) as Box<dyn Encoder>, codec))
    }
}

/// Reference `Decoder` over the raw container format described above.
pub struct RawFileDecoder {
    reader: BufReader<File>,
    shape: FrameShape,
    fps: f64,
}

impl RawFileDecoder {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, String> {
        let file = File::open(path.as_ref()).map_err(|e| e.to_string())?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(|e| e.to_string())?;
        if &magic != MAGIC {
            return Err("not a frameflow raw container (bad magic)".to_string());
        }
        let height = read_u32(&mut reader)? as usize;
        let width = read_u32(&mut reader)? as usize;
        let fps = read_f64(&mut reader)?;

        Ok(Self { reader, shape: FrameShape::new(height, width), fps })
    }

    /// The shape declared in the container header — may disagree with the
    /// actual first frame.
    pub fn declared_shape(&self) -> FrameShape {
        self.shape
    }
}

impl Decoder for RawFileDecoder {
    fn read_frame(&mut self) -> Result<Option<Frame>, String> {
        let mut bytes = vec![0u8; self.shape.byte_len()];
        match self.reader.read_exact(&mut bytes) {
            Ok(()) => Ok(Some(Frame::new(self.shape, bytes))),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    fn fps(&self) -> f64 {
        self.fps
    }
}

/// Reference `Encoder` over the same raw container format. Frames are
/// streamed out as they arrive; no frame count is declared up front.
pub struct RawFileEncoder {
    writer: BufWriter<File>,
    closed: bool,
}

impl RawFileEncoder {
    /// Opens the destination and writes the header. Callers pass a codec
    /// preference list and get back which one was honored, even though this
    /// reference encoder accepts any of them (there is no real codec here).
    pub fn open(
        path: impl AsRef<Path>,
        shape: FrameShape,
        fps: f64,
        codec_preference: &[&str],
    ) -> Result<(Self, String), String> {
        let codec = codec_preference.first().copied().unwrap_or("raw").to_string();
        let file = File::create(path.as_ref()).map_err(|e| e.to_string())?;
        let mut writer = BufWriter::new(file);

        writer.write_all(MAGIC).map_err(|e| e.to_string())?;
        write_u32(&mut writer, shape.height as u32)?;
        write_u32(&mut writer, shape.width as u32)?;
        write_f64(&mut writer, fps)?;

        Ok((Self { writer, closed: false }, codec))
    }
}

impl Encoder for RawFileEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), String> {
        self.writer.write_all(frame.as_slice()).map_err(|e| e.to_string())
    }

    fn close(&mut self) -> Result<(), String> {
        if !self.closed {
            self.writer.flush().map_err(|e| e.to_string())?;
            self.closed = true;
        }
        Ok(())
    }
}

impl Drop for RawFileEncoder {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn read_u32(r: &mut impl Read) -> Result<u32, String> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|e| e.to_string())?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f64(r: &mut impl Read) -> Result<f64, String> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).map_err(|e| e.to_string())?;
    Ok(f64::from_le_bytes(buf))
}

fn write_u32(w: &mut impl Write, v: u32) -> Result<(), String> {
    w.write_all(&v.to_le_bytes()).map_err(|e| e.to_string())
}

fn write_f64(w: &mut impl Write, v: f64) -> Result<(), String> {
    w.write_all(&v.to_le_bytes()).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;

    fn container_path(tag: &str) -> std::path::PathBuf {
        temp_dir().join(format!("frameflow-codec-test-{tag}-{}.raw", std::process::id()))
    }

    #[test]
    fn roundtrips_frames_through_raw_container() {
        let shape = FrameShape::new(2, 2);
        let path = container_path("roundtrip");

        let (mut encoder, codec) =
            RawFileEncoder::open(&path, shape, 30.0, &["avc1", "mp4v", "DIVX"]).unwrap();
        assert_eq!(codec, "avc1");
        let frame_a = Frame::new(shape, vec![1u8; shape.byte_len()]);
        let frame_b = Frame::new(shape, vec![2u8; shape.byte_len()]);
        encoder.write_frame(&frame_a).unwrap();
        encoder.write_frame(&frame_b).unwrap();
        encoder.close().unwrap();

        let mut decoder = RawFileDecoder::open(&path).unwrap();
        assert_eq!(decoder.declared_shape(), shape);
        assert_eq!(decoder.fps(), 30.0);
        let got_a = decoder.read_frame().unwrap().unwrap();
        let got_b = decoder.read_frame().unwrap().unwrap();
        assert_eq!(got_a, frame_a);
        assert_eq!(got_b, frame_b);
        assert!(decoder.read_frame().unwrap().is_none());

        std::fs::remove_file(&path).ok();
    }
}
