//! `frameflow effects` — lists the built-in effect catalog so a caller can
//! discover the names `frameflow run --effects` accepts.

use clap::Args;
use frameflow_core::Catalog;

#[derive(Args)]
pub struct EffectsArgs {}

const CATALOG_ORDER: &[&str] = &[
    "Sharpen", "Denoise", "Edge Detect", "HDR", "Contrast", "Sepia", "Emboss", "Invert", "Sketch",
    "Vignette",
];

pub fn run(_args: EffectsArgs) -> anyhow::Result<()> {
    let catalog = Catalog::with_default_effects();
    println!("{} effect(s) available:", catalog.len());
    for name in CATALOG_ORDER {
        if catalog.get(name).is_some() {
            println!("  {name}");
        }
    }
    Ok(())
}
