//! `frameflow run` — drives one job through [`frameflow_engine::Controller`]
//! end to end: parse flags into a `JobSpec`, start the pipeline, poll
//! progress onto a terminal spinner, and stop cleanly on completion or
//! Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use frameflow_core::Catalog;
use frameflow_engine::{Controller, JobSpec, RawFileCodec};

/// The interval the CLI polls `get_progress`/`check_health` at. Coarser
/// than the pipeline's own ~100ms stop-signal poll; this one is purely for
/// terminal output cadence.
const UI_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Args)]
pub struct RunArgs {
    /// Source video (the reference raw container; see `RawFileCodec`).
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Destination video.
    #[arg(value_name = "DESTINATION")]
    destination: PathBuf,

    /// Number of effect worker threads.
    #[arg(short, long)]
    workers: Option<usize>,

    /// INPUT/OUTPUT arena slot count. Defaults to `workers + 2` (the
    /// minimum the Controller will accept) rounded up to 10.
    #[arg(short, long)]
    slots: Option<usize>,

    /// Comma-separated, ordered effect chain (e.g. "Sharpen,Invert").
    /// Unknown names are skipped silently by the chain executor.
    #[arg(short, long)]
    effects: Option<String>,
}

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let workers = args.workers.unwrap_or_else(default_worker_count);
    let slots = args.slots.unwrap_or_else(|| default_slot_count(workers));
    let effect_chain = parse_effect_chain(args.effects.as_deref().unwrap_or(""));

    let job = JobSpec {
        source: args.source.clone(),
        destination: args.destination.clone(),
        worker_count: workers,
        slot_count: slots,
        effect_chain,
    };

    let controller = Arc::new(Controller::new());
    let codec = RawFileCodec;
    let catalog = Arc::new(Catalog::with_default_effects());

    {
        let controller = Arc::clone(&controller);
        ctrlc::set_handler(move || {
            tracing::info!("interrupt received, stopping job");
            controller.stop();
        })
        .ok();
    }

    controller.start(&job, &codec, &codec, catalog).map_err(anyhow::Error::from)?;

    println!(
        "frameflow: {} -> {} ({} workers, {} slots, chain [{}])",
        job.source.display(),
        job.destination.display(),
        job.worker_count,
        job.slot_count,
        job.effect_chain.join(", ")
    );

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {elapsed_precise} | {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );

    while controller.check_health() {
        let (elapsed, fps, frames) = controller.get_progress();
        pb.set_message(format!("{frames} frames written, {fps:.1} fps, {elapsed:.1}s elapsed"));
        pb.tick();
        thread::sleep(UI_POLL_INTERVAL);
    }

    let (elapsed, fps, frames) = controller.get_progress();
    controller.stop();
    pb.finish_with_message(format!("done: {frames} frames, {fps:.1} fps, {elapsed:.1}s elapsed"));

    Ok(())
}

fn default_worker_count() -> usize {
    thread::available_parallelism().map(|n| n.get().saturating_sub(1).max(1)).unwrap_or(1)
}

fn default_slot_count(workers: usize) -> usize {
    (workers + 2).max(10)
}

/// Splits a comma-separated `--effects` flag into an ordered chain,
/// trimming whitespace around each name and dropping empty segments (so
/// `"Sharpen, , Invert"` and a bare `""` both behave sensibly).
fn parse_effect_chain(spec: &str) -> Vec<String> {
    spec.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_effects_flag_is_an_empty_chain() {
        assert!(parse_effect_chain("").is_empty());
    }

    #[test]
    fn effects_flag_splits_trims_and_drops_blanks() {
        let chain = parse_effect_chain("Sharpen, Invert ,, Sepia");
        assert_eq!(chain, vec!["Sharpen", "Invert", "Sepia"]);
    }

    #[test]
    fn default_slot_count_is_at_least_ten_and_covers_worker_count() {
        assert_eq!(default_slot_count(1), 10);
        assert_eq!(default_slot_count(20), 22);
    }
}
