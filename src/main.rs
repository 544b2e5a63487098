use anyhow::{Context, Result};
use clap::Parser;
use photosort::cli::Cli;
use photosort::{ExifClock, Organizer, PerceptualHasher};
use std::time::Instant;

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let config = cli.into_config().context("Invalid options")?;
    println!(
        "▶ Organizing {} into {} (duplicates: {})",
        config.input_dir.display(),
        config.output_dir.display(),
        config.mode
    );

    let hasher = PerceptualHasher::new();
    let clock = ExifClock::new();
    let organizer = Organizer::new(config, &hasher, &clock).context("Invalid options")?;

    let start = Instant::now();
    let summary = organizer.run().context("Organizing failed")?;
    println!("✅ {} in {:.2?}", summary, start.elapsed());
    Ok(())
}
