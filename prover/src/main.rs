use std::path::PathBuf;

use base64::{engine::general_purpose, Engine as _};
use clap::Parser;
use eyre::Context;
use pos::{
    config::{self, ProofConfig},
    prove::find_proof_with,
    quality::score_proof,
    verification::Verifier,
    Challenge,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the directory with plots
    #[arg(short, long)]
    plot_dir: PathBuf,

    /// Challenge to prove
    /// Value must be base64 encoded
    #[arg(short, long)]
    challenge: String,

    /// Base64-encoded public key of the plot owner
    #[arg(long)]
    public_key: String,

    /// Path to a JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Extra challenge prefix bits, overrides the config
    #[arg(long)]
    extra_prefix_bits: Option<u8>,
}

fn main() -> eyre::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut cfg: ProofConfig = match &cli.config {
        Some(path) => config::load(path)?.proof,
        None => ProofConfig::default(),
    };
    if let Some(bits) = cli.extra_prefix_bits {
        cfg.extra_prefix_bits = bits;
    }

    let challenge = Challenge(
        general_purpose::STANDARD
            .decode(&cli.challenge)?
            .as_slice()
            .try_into()
            .wrap_err("challenge should be 32B")?,
    );
    let public_key = general_purpose::STANDARD.decode(&cli.public_key)?;

    // Generate a proof
    let Some(proof) = find_proof_with(&challenge, &cli.plot_dir, cfg)? else {
        println!("No proof available for the challenge");
        return Ok(());
    };
    println!("Generated proof: {}", serde_json::to_string_pretty(&proof)?);
    println!(
        "Quality: {}",
        score_proof(&proof, &challenge, &public_key)
    );

    // Verify the proof
    match Verifier::new(cfg).verify(&proof, &challenge, &public_key) {
        Ok(()) => println!("Proof verified"),
        Err(e) => eyre::bail!("Proof verification failed: {e}"),
    }
    Ok(())
}
