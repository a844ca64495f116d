// demark-cli/src/main.rs
//
// Command-line interface for the Demark watermark removal pipeline.
//
// Responsibilities:
// - Defining the flat CLI argument surface (input/output/regions/algorithm
//   plus tuning knobs).
// - Parsing the region list from its JSON argument.
// - Configuring logging and the telemetry handler (line-delimited JSON by
//   default, an interactive terminal renderer with --pretty).
// - Invoking demark_core::process_video and mapping the outcome to exit
//   codes: 0 on success, 1 on any fatal error, with an `error` event
//   emitted first.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use demark_core::{
    process_video, Algorithm, CoreConfig, CoreResult, EventDispatcher, JsonEventHandler, Quality,
    Region,
};

mod terminal;

#[derive(Parser, Debug)]
#[command(
    author,
    version, // Reads from Cargo.toml via "cargo" feature in clap
    about = "Demark: watermark removal for video",
    long_about = "Removes fixed rectangular watermark regions from every frame of a video, \
                  then remuxes the original audio back in using the best available encoder."
)]
struct Cli {
    /// Input video path
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// Output video path
    #[arg(long, value_name = "FILE")]
    output: PathBuf,

    /// Watermark regions as a JSON array of {x, y, width, height}
    #[arg(long, value_name = "JSON")]
    regions: String,

    /// Restoration algorithm: telea, ns, sttn, lama or propainter
    #[arg(long, default_value = "telea", value_name = "NAME")]
    algorithm: String,

    /// Output quality tier: low, medium or high
    #[arg(long, default_value = "high", value_name = "TIER")]
    quality: String,

    /// Frames per batch; 0 selects a device-appropriate default
    #[arg(long, default_value_t = 0, value_name = "N")]
    batch_size: usize,

    /// Neighborhood radius for the propagation inpainter
    #[arg(long, default_value_t = 3, value_name = "PIXELS")]
    inpaint_radius: u32,

    /// Checkpoint cache directory for the learned algorithms
    #[arg(long, env = "DEMARK_MODEL_DIR", value_name = "DIR")]
    model_dir: Option<PathBuf>,

    /// Render progress interactively instead of emitting JSON lines
    #[arg(long)]
    pretty: bool,

    /// Enable detailed logging output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let mut events = EventDispatcher::new();
    if cli.pretty {
        events.add_handler(Arc::new(terminal::TerminalEventHandler::new()));
    } else {
        events.add_handler(Arc::new(JsonEventHandler::new()));
    }

    if let Err(error) = run(cli, &events) {
        events.emit(demark_core::Event::Error {
            message: error.to_string(),
        });
        log::error!("Run failed: {error}");
        process::exit(1);
    }
}

fn run(cli: Cli, events: &EventDispatcher) -> CoreResult<()> {
    let mut config = CoreConfig::new(cli.input, cli.output);
    config.regions = parse_regions(&cli.regions)?;
    config.algorithm = cli.algorithm.parse::<Algorithm>()?;
    config.quality = cli.quality.parse::<Quality>()?;
    config.batch_size = (cli.batch_size > 0).then_some(cli.batch_size);
    config.inpaint_radius = cli.inpaint_radius;
    config.model_cache_dir = cli.model_dir;
    config.validate()?;

    process_video(&config, events)?;
    Ok(())
}

fn parse_regions(raw: &str) -> CoreResult<Vec<Region>> {
    serde_json::from_str(raw).map_err(|e| {
        demark_core::CoreError::Config(format!("could not parse region list: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_regions_accepts_original_shape() {
        let regions =
            parse_regions(r#"[{"x": 1200, "y": 40, "width": 240, "height": 80}]"#).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].x, 1200);
        assert_eq!(regions[0].height, 80);

        assert!(parse_regions("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_regions_rejects_malformed_json() {
        assert!(parse_regions("not json").is_err());
        assert!(parse_regions(r#"[{"x": 1}]"#).is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from([
            "demark",
            "--input",
            "in.mp4",
            "--output",
            "out.mp4",
            "--regions",
            "[]",
        ]);
        assert_eq!(cli.algorithm, "telea");
        assert_eq!(cli.quality, "high");
        assert_eq!(cli.batch_size, 0);
        assert_eq!(cli.inpaint_radius, 3);
        assert!(!cli.pretty);
    }
}
