//! End-to-end pipeline scenarios, driven against the raw reference codec.
//! Frame dimensions are scaled down from a typical 1280x720 source to keep
//! the suite fast; the properties under test — frame count, ordering,
//! byte-equality, shutdown behavior — don't depend on the literal pixel
//! count.

use std::env::temp_dir;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use frameflow_core::{apply_chain, Catalog, Frame, FrameShape};
use frameflow_engine::{Controller, Decoder, DecoderOpener, Encoder, EncoderOpener, JobSpec, RawFileCodec, RawFileDecoder, RawFileEncoder};

fn unique_path(tag: &str) -> PathBuf {
    temp_dir().join(format!("frameflow-scenario-{tag}-{}-{}.raw", std::process::id(), tag.len()))
}

fn fill(frame_idx: u64, len: usize) -> Vec<u8> {
    (0..len).map(|i| ((frame_idx.wrapping_mul(31) as usize + i * 17) % 256) as u8).collect()
}

fn write_source(path: &PathBuf, shape: FrameShape, fps: f64, frame_count: u64) -> Vec<Frame> {
    let (mut encoder, _codec) = RawFileEncoder::open(path, shape, fps, &["avc1", "mp4v", "DIVX"]).unwrap();
    let mut frames = Vec::with_capacity(frame_count as usize);
    for i in 0..frame_count {
        let frame = Frame::new(shape, fill(i, shape.byte_len()));
        encoder.write_frame(&frame).unwrap();
        frames.push(frame);
    }
    encoder.close().unwrap();
    frames
}

fn read_destination_frames(path: &PathBuf, shape: FrameShape) -> Vec<Frame> {
    let mut decoder = RawFileDecoder::open(path).unwrap();
    let mut out = Vec::new();
    while let Some(frame) = decoder.read_frame().unwrap() {
        out.push(frame);
    }
    let _ = shape;
    out
}

/// Polls progress until `expected` frames are written or `timeout` elapses.
fn wait_for_frames(controller: &Controller, expected: u64, timeout: Duration) -> u64 {
    let deadline = Instant::now() + timeout;
    loop {
        let (_elapsed, _fps, frames) = controller.get_progress();
        if frames >= expected || Instant::now() >= deadline {
            return frames;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn empty_chain_reproduces_every_source_frame() {
    let shape = FrameShape::new(48, 64);
    let source = unique_path("s1-src");
    let destination = unique_path("s1-dst");
    let frame_count = 40u64;
    let frames = write_source(&source, shape, 30.0, frame_count);

    let job = JobSpec {
        source: source.clone(),
        destination: destination.clone(),
        worker_count: 4,
        slot_count: 12,
        effect_chain: vec![],
    };
    let codec = RawFileCodec;
    let controller = Controller::new();
    controller.start(&job, &codec, &codec, Arc::new(Catalog::with_default_effects())).unwrap();

    wait_for_frames(&controller, frame_count, Duration::from_secs(10));
    controller.stop();

    let got = read_destination_frames(&destination, shape);
    assert_eq!(got.len(), frames.len());
    assert_eq!(got, frames);

    std::fs::remove_file(&source).ok();
    std::fs::remove_file(&destination).ok();
}

#[test]
fn invert_chain_bitwise_complements_every_frame() {
    let shape = FrameShape::new(16, 16);
    let source = unique_path("s2-src");
    let destination = unique_path("s2-dst");
    let frame_count = 10u64;
    let frames = write_source(&source, shape, 24.0, frame_count);

    let job = JobSpec {
        source: source.clone(),
        destination: destination.clone(),
        worker_count: 2,
        slot_count: 8,
        effect_chain: vec!["Invert".to_string()],
    };
    let codec = RawFileCodec;
    let controller = Controller::new();
    controller.start(&job, &codec, &codec, Arc::new(Catalog::with_default_effects())).unwrap();

    wait_for_frames(&controller, frame_count, Duration::from_secs(10));
    controller.stop();

    let got = read_destination_frames(&destination, shape);
    assert_eq!(got.len(), frames.len());
    for (src, dst) in frames.iter().zip(got.iter()) {
        let expected: Vec<u8> = src.as_slice().iter().map(|&b| !b).collect();
        assert_eq!(dst.as_slice(), expected.as_slice());
    }

    std::fs::remove_file(&source).ok();
    std::fs::remove_file(&destination).ok();
}

#[test]
fn multi_step_chain_matches_direct_sequential_application() {
    let shape = FrameShape::new(12, 12);
    let source = unique_path("s3-src");
    let destination = unique_path("s3-dst");
    let frame_count = 20u64;
    let frames = write_source(&source, shape, 15.0, frame_count);

    let chain = vec!["Sharpen".to_string(), "Invert".to_string(), "Sharpen".to_string()];
    let job = JobSpec {
        source: source.clone(),
        destination: destination.clone(),
        worker_count: 1,
        slot_count: 6,
        effect_chain: chain.clone(),
    };
    let catalog = Arc::new(Catalog::with_default_effects());
    let codec = RawFileCodec;
    let controller = Controller::new();
    controller.start(&job, &codec, &codec, Arc::clone(&catalog)).unwrap();

    wait_for_frames(&controller, frame_count, Duration::from_secs(10));
    controller.stop();

    let got = read_destination_frames(&destination, shape);
    assert_eq!(got.len(), frames.len());
    for (src, dst) in frames.iter().zip(got.iter()) {
        let expected = apply_chain(src, &chain, &catalog);
        assert_eq!(dst, &expected);
    }

    std::fs::remove_file(&source).ok();
    std::fs::remove_file(&destination).ok();
}

#[test]
fn stop_mid_job_bounds_overshoot_and_leaves_no_arenas() {
    let shape = FrameShape::new(20, 20);
    let source = unique_path("s4-src");
    let destination = unique_path("s4-dst");
    let frame_count = 300u64;
    write_source(&source, shape, 30.0, frame_count);

    let worker_count = 3;
    let job = JobSpec {
        source: source.clone(),
        destination: destination.clone(),
        worker_count,
        slot_count: 10,
        effect_chain: vec![],
    };
    let codec = RawFileCodec;
    let controller = Controller::new();
    controller.start(&job, &codec, &codec, Arc::new(Catalog::with_default_effects())).unwrap();

    let target = 50u64;
    wait_for_frames(&controller, target, Duration::from_secs(10));
    controller.stop();

    let (_, _, frames_written) = controller.get_progress();
    assert!(frames_written <= target + worker_count as u64, "overshoot too large: {frames_written}");
    assert!(!controller.check_health());

    std::fs::remove_file(&source).ok();
    std::fs::remove_file(&destination).ok();
}

/// A `Decoder` whose reported "nominal" shape disagrees with the actual
/// shape of the frames it yields: canonical shape must come from the first
/// real decoded frame, not from any separately-tracked container metadata.
struct MismatchedShapeDecoder {
    nominal: FrameShape,
    actual: FrameShape,
    remaining: u64,
}

impl Decoder for MismatchedShapeDecoder {
    fn read_frame(&mut self) -> Result<Option<Frame>, String> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(Frame::zeroed(self.actual)))
    }

    fn fps(&self) -> f64 {
        30.0
    }
}

struct MismatchedShapeOpener {
    nominal: FrameShape,
    actual: FrameShape,
    frame_count: u64,
}

impl DecoderOpener for MismatchedShapeOpener {
    fn open(&self, _path: &std::path::Path) -> Result<Box<dyn Decoder>, String> {
        Ok(Box::new(MismatchedShapeDecoder {
            nominal: self.nominal,
            actual: self.actual,
            remaining: self.frame_count,
        }))
    }
}

#[test]
fn canonical_shape_comes_from_the_first_real_frame() {
    let nominal = FrameShape::new(1080, 1920);
    let actual = FrameShape::new(72, 68);
    let destination = unique_path("s5-dst");

    let job = JobSpec {
        source: PathBuf::from("unused-for-this-mock"),
        destination: destination.clone(),
        worker_count: 1,
        slot_count: 6,
        effect_chain: vec![],
    };
    let opener = MismatchedShapeOpener { nominal, actual, frame_count: 5 };
    let encoder_codec = RawFileCodec;
    let controller = Controller::new();
    controller
        .start(&job, &opener, &encoder_codec, Arc::new(Catalog::with_default_effects()))
        .unwrap();

    wait_for_frames(&controller, 5, Duration::from_secs(10));
    controller.stop();

    let mut decoder = RawFileDecoder::open(&destination).unwrap();
    assert_eq!(decoder.declared_shape(), actual);
    assert_ne!(decoder.declared_shape(), nominal);
    let first = decoder.read_frame().unwrap().unwrap();
    assert_eq!(first.shape(), actual);

    std::fs::remove_file(&destination).ok();
}

#[test]
fn a_failing_effect_is_neutral_in_the_destination() {
    let shape = FrameShape::new(10, 10);
    let source = unique_path("s6-src");
    let destination = unique_path("s6-dst");
    let frame_count = 8u64;
    let frames = write_source(&source, shape, 20.0, frame_count);

    let mut catalog = Catalog::with_default_effects();
    catalog.register(
        "AlwaysFails",
        Arc::new(|_frame: &Frame| -> Result<Frame, frameflow_core::EffectError> {
            Err(frameflow_core::EffectError::new("AlwaysFails", "synthetic scenario failure"))
        }),
    );
    let catalog = Arc::new(catalog);
    let chain = vec!["Invert".to_string(), "AlwaysFails".to_string(), "Invert".to_string()];

    let job = JobSpec {
        source: source.clone(),
        destination: destination.clone(),
        worker_count: 2,
        slot_count: 8,
        effect_chain: chain.clone(),
    };
    let codec = RawFileCodec;
    let controller = Controller::new();
    controller.start(&job, &codec, &codec, Arc::clone(&catalog)).unwrap();

    wait_for_frames(&controller, frame_count, Duration::from_secs(10));
    controller.stop();

    let got = read_destination_frames(&destination, shape);
    assert_eq!(got.len(), frames.len());
    for (src, dst) in frames.iter().zip(got.iter()) {
        let expected = apply_chain(src, &chain, &catalog);
        assert_eq!(dst, &expected);
    }

    std::fs::remove_file(&source).ok();
    std::fs::remove_file(&destination).ok();
}
