use std::{path::PathBuf, time};

use base64::{engine::general_purpose, Engine};
use clap::{Args, Parser, Subcommand};
use eyre::Context;
use pos::{
    config::{self, Config},
    farm::Farm,
    interrupt::Interrupt,
    plot_verification::{verify_plot, verify_plots},
    plotting::build_plot,
};

/// Build and check Proof of Space plots
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plot a file
    Plot(PlotArgs),
    /// Verify plot data
    VerifyPlot(VerifyPlotArgs),
    /// Remove temporaries left by interrupted plotting
    Clean(CleanArgs),
}

#[derive(Args)]
struct PlotArgs {
    /// File to plot
    #[arg(short, long)]
    source: PathBuf,

    /// Path of the plot file.
    /// If not given, the plot goes into the `plots` folder of `--storage-dir`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Storage directory the plot is kept in
    #[arg(long, default_value = "./pos-data")]
    storage_dir: PathBuf,

    /// Base64-encoded public key of the plot owner
    #[arg(long)]
    public_key: String,

    /// Size of the plot (2^k entries), overrides the config
    #[arg(short)]
    k: Option<u8>,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Args)]
struct VerifyPlotArgs {
    /// Plot file or directory of plots to verify
    #[arg(short, long)]
    input: PathBuf,

    /// Fraction of entries (in %) to recompute
    #[arg(short, long, default_value_t = 5.0)]
    fraction: f64,
}

#[derive(Args)]
struct CleanArgs {
    /// Storage directory to clean
    #[arg(long, default_value = "./pos-data")]
    storage_dir: PathBuf,
}

fn plot(args: PlotArgs, mut cfg: Config) -> eyre::Result<()> {
    let public_key = general_purpose::STANDARD
        .decode(args.public_key)
        .wrap_err("decoding public key")?;
    if args.k.is_some() {
        cfg.plot.k = args.k;
    }
    let mut interrupt = Interrupt::new();
    if let Some(secs) = args.timeout {
        interrupt = interrupt.with_timeout(time::Duration::from_secs(secs));
    }

    let now = time::Instant::now();
    let plot = match args.output {
        Some(output) => build_plot(&args.source, &output, &public_key, &cfg.plot, &interrupt)?,
        None => Farm::new(args.storage_dir, public_key)
            .with_plot_config(cfg.plot)
            .plot_file(&args.source, &interrupt)?,
    };

    let elapsed = now.elapsed();
    let entries = plot.num_entries();
    println!(
        "Plotting {entries} entries into {} took {:.2} seconds. Speed: {:.0} entries/sec",
        plot.path().display(),
        elapsed.as_secs_f64(),
        entries as f64 / elapsed.as_secs_f64(),
    );
    Ok(())
}

fn verify_data(args: VerifyPlotArgs) -> eyre::Result<()> {
    if args.input.is_dir() {
        verify_plots(&args.input, args.fraction)?;
    } else {
        verify_plot(&args.input, args.fraction)?;
    }
    println!("Plot data verified successfully");
    Ok(())
}

fn clean(args: CleanArgs, cfg: Config) -> eyre::Result<()> {
    // Cleaning needs no owner key.
    let removed = Farm::new(args.storage_dir, Vec::new())
        .with_plot_config(cfg.plot)
        .remove_leftovers()?;
    println!("Removed {removed} leftovers of interrupted plotting");
    Ok(())
}

fn main() -> eyre::Result<()> {
    env_logger::init();
    let args = Cli::parse();

    let cfg = match &args.config {
        Some(path) => config::load(path)
            .wrap_err_with(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    match args.command {
        Commands::Plot(plot_args) => plot(plot_args, cfg)?,
        Commands::VerifyPlot(verify_args) => verify_data(verify_args)?,
        Commands::Clean(clean_args) => clean(clean_args, cfg)?,
    }

    Ok(())
}
