use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use spotfit::config::{AppConfig, CONFIG_FILE};
use spotfit::{output, SpotAnalyzer};

#[derive(Parser)]
#[command(name = "spotfit")]
#[command(about = "Fit a rotated 2D Gaussian to a beam spot image and report its widths")]
#[command(version)]
struct Args {
    /// Spot image (.csv, .dat, .jpg, .tif)
    input: PathBuf,

    /// Background image subtracted before fitting
    #[arg(short, long, value_name = "PATH")]
    background: Option<PathBuf>,

    /// JSON file with the default background folder
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Write data, fit, residual and projections into this directory
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Optimizer iteration budget
    #[arg(long, default_value_t = 200)]
    max_iterations: usize,

    /// Show per-stage details
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = AppConfig::load(&args.config)?;

    let mut analyzer = SpotAnalyzer::new().with_max_iterations(args.max_iterations);
    if let Some(bg) = &args.background {
        let bg = config.resolve(bg);
        info!("Background: {}", bg.display());
        analyzer = analyzer.with_background(bg);
    }

    let report = analyzer
        .analyze(&args.input)
        .with_context(|| format!("Analysis of {} failed", args.input.display()))?;

    for warning in &report.warnings {
        eprintln!("Warning: {}", warning);
    }

    let p = &report.fit.params;
    info!(
        "A={:.1} t={:.4} sx={:.2} sy={:.2} x0={:.2} y0={:.2} C={:.2} ({} iterations, converged={})",
        p.amplitude,
        p.angle,
        p.sigma_x,
        p.sigma_y,
        p.x0,
        p.y0,
        p.offset,
        report.fit.iterations,
        report.fit.converged
    );

    for line in report.summary_lines() {
        println!("{}", line);
    }

    if let Some(dir) = &args.output_dir {
        output::save_report(&report, dir).context("Failed to write results")?;
        info!("Results written to {}", dir.display());
    }

    Ok(())
}
