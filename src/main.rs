//! Command-line entry point for the celltally pipeline.
//!
//! Production path: normalize the annotation files, expand the mapping,
//! aggregate, and write the counts CSV. Tuning path (`--reference`): compare
//! the aggregate against an external reference count table and print the
//! delta summary instead of exporting.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};

use celltally::stats::Describe;
use celltally::{
    AnnotationFrame, SessionCache, Thresholds, aggregate, compare, export, reference, summarize,
};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Per-mouse, per-image immune cell counts from histology GeoJSON exports"
)]
struct Args {
    /// GeoJSON annotation files, named `<prefix>_<image number>.geojson`
    #[arg(required = true)]
    geojson: Vec<PathBuf>,

    /// Mouse-to-image mapping file (lines of '<mouse_id> <start>-<end>')
    #[arg(long)]
    mapping: PathBuf,

    /// Reference count CSV; switches to the tuning report instead of CSV export
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Threshold preset supplying per-marker defaults
    #[arg(long, value_enum, default_value_t = Preset::Export)]
    preset: Preset,

    /// Override the CD8 area threshold (µm²)
    #[arg(long)]
    cd8: Option<f64>,

    /// Override the CD4 area threshold (µm²)
    #[arg(long)]
    cd4: Option<f64>,

    /// Override the Foxp3 area threshold (µm²)
    #[arg(long)]
    foxp3: Option<f64>,

    /// Output CSV path (production path)
    #[arg(long, default_value = "image_data.csv")]
    output: PathBuf,
}

/// Named threshold presets; the two entry modes of the workflow carry
/// different defaults on purpose.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum Preset {
    /// Production defaults: CD8 25, CD4 30, Foxp3 20
    Export,
    /// Tuning defaults: 25 across the board, bounded to 0-100
    Tuning,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut thresholds = match args.preset {
        Preset::Export => Thresholds::EXPORT_DEFAULTS,
        Preset::Tuning => Thresholds::TUNING_DEFAULTS,
    };
    if let Some(cd8) = args.cd8 {
        thresholds.cd8 = cd8;
    }
    if let Some(cd4) = args.cd4 {
        thresholds.cd4 = cd4;
    }
    if let Some(foxp3) = args.foxp3 {
        thresholds.foxp3 = foxp3;
    }
    if matches!(args.preset, Preset::Tuning) {
        thresholds.validate_tuning_bounds()?;
    }

    let mut cache = SessionCache::new();

    let total = args.geojson.len();
    let mut fragments = Vec::with_capacity(total);
    for (index, path) in args.geojson.iter().enumerate() {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            bail!("annotation path {} has no usable file name", path.display());
        };
        let bytes =
            fs::read(path).with_context(|| format!("reading annotation file {}", path.display()))?;
        let frame = cache.annotation_frame(name, &bytes)?;
        fragments.push(frame.clone());
        log::info!("Normalized annotation file {}/{}: {name}", index + 1, total);
    }
    let combined = AnnotationFrame::concat(fragments)?;

    let mapping_bytes = fs::read(&args.mapping)
        .with_context(|| format!("reading mapping file {}", args.mapping.display()))?;
    let mapping = cache.mapping(&mapping_bytes)?.to_vec();

    let records = aggregate(&combined, &mapping, &thresholds)?;

    if let Some(reference_path) = &args.reference {
        let reference = reference::read_reference_file(reference_path)?;
        let rows = compare(&records, &reference);
        let summary = summarize(&rows);

        println!("Delta summary (reference - computed) over {} rows:", rows.len());
        println!(
            "{:<10} {:>12} {:>12} {:>12}",
            "statistic", "cd8_delta", "cd4_delta", "foxp3_delta"
        );
        for (statistic, cd8, cd4, foxp3) in summary_rows(&summary.cd8, &summary.cd4, &summary.foxp3)
        {
            println!("{statistic:<10} {cd8:>12} {cd4:>12} {foxp3:>12}");
        }
    } else {
        // Preview before export, like the head of the final table.
        for record in records.iter().take(5) {
            log::info!(
                "{} image {}: {} rows (cd8 {}, cd4 {}, foxp3 {})",
                record.mouse_id.as_deref().unwrap_or("(unmapped)"),
                record.image_number,
                record.row_count,
                record.cd8_count,
                record.cd4_count,
                record.foxp3_count
            );
        }
        export::write_csv_file(&records, &args.output)?;
        println!("Wrote {} rows to {}", records.len(), args.output.display());
    }

    Ok(())
}

fn summary_rows(
    cd8: &Describe,
    cd4: &Describe,
    foxp3: &Describe,
) -> Vec<(&'static str, String, String, String)> {
    let fmt = |value: Option<f64>| match value {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    };
    vec![
        (
            "count",
            cd8.count.to_string(),
            cd4.count.to_string(),
            foxp3.count.to_string(),
        ),
        ("mean", fmt(cd8.mean), fmt(cd4.mean), fmt(foxp3.mean)),
        ("std", fmt(cd8.std), fmt(cd4.std), fmt(foxp3.std)),
        ("min", fmt(cd8.min), fmt(cd4.min), fmt(foxp3.min)),
        ("25%", fmt(cd8.q1), fmt(cd4.q1), fmt(foxp3.q1)),
        ("50%", fmt(cd8.median), fmt(cd4.median), fmt(foxp3.median)),
        ("75%", fmt(cd8.q3), fmt(cd4.q3), fmt(foxp3.q3)),
        ("max", fmt(cd8.max), fmt(cd4.max), fmt(foxp3.max)),
    ]
}
