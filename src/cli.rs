use crate::config::Config;
use crate::core::policy::{DEFAULT_THRESHOLD, DuplicateMode, PolicyError};
use clap::{ArgAction, Parser};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "photosort",
    version,
    about = "Copy photos into a date-organized tree, detecting near duplicates"
)]
pub struct Cli {
    /// Directory to import from
    #[arg(short, long = "input", value_name = "DIR")]
    pub input: PathBuf,

    /// Destination directory
    #[arg(short, long = "output", value_name = "DIR")]
    pub output: PathBuf,

    /// Duplicate detection mode.
    /// 0 = copy all files,
    /// 1 = detect and skip all duplicates,
    /// 2 = skip exact copies but mark other duplicates (keeps bracketed shots)
    #[arg(
        short = 'd',
        long = "duplicates",
        value_name = "MODE",
        default_value_t = 0,
        value_parser = clap::value_parser!(u8).range(0..=2)
    )]
    pub mode: u8,

    /// Similarity at which two photos count as duplicates.
    /// 0.8 keeps bracketed exposures apart, 0.6 also catches resized or cropped copies
    #[arg(
        short,
        long,
        value_name = "THRESHOLD",
        default_value_t = DEFAULT_THRESHOLD,
        value_parser = parse_threshold
    )]
    pub threshold: f64,

    /// More output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Hide the progress spinner
    #[arg(long)]
    pub no_progress: bool,
}

fn parse_threshold(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("`{}` is not a number", raw))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{} is not between 0 and 1", value))
    }
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    pub fn into_config(self) -> Result<Config, PolicyError> {
        let mode = DuplicateMode::try_from(self.mode)?;
        Ok(Config::new(self.input, self.output)
            .with_mode(mode)
            .with_threshold(self.threshold)
            .with_progress(!self.no_progress))
    }
}
