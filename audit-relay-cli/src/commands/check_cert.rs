use std::path::PathBuf;

use anyhow::{Context, Result};
use audit_relay::codec::{AlgorithmMode, CertificateCodec, CertificateConfig};
use clap::Args;
use colored::Colorize;

const PROBE: &str = "audit-relay certificate probe";

#[derive(Args)]
pub struct CheckCertArgs {
    /// PEM bundle to check
    #[arg(short, long, value_name = "PATH")]
    path: PathBuf,

    /// rsa_encrypt, rsa_sign or ecdsa_sign
    #[arg(short, long, default_value = "rsa_encrypt")]
    algorithm: AlgorithmMode,

    /// Password of an encrypted private key
    #[arg(long, env = "AUDIT_RELAY_KEY_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

pub async fn execute(args: CheckCertArgs) -> Result<()> {
    let mut config = CertificateConfig::new(&args.path, args.algorithm);
    config.password = args.password;

    let codec = CertificateCodec::load(&config)
        .with_context(|| format!("{} is not usable for {}", args.path.display(), args.algorithm))?;

    let output = codec
        .transform(PROBE)
        .context("Bundle loaded but the probe transform failed")?;

    if args.algorithm.is_signature() && !codec.verify(PROBE, &output)? {
        anyhow::bail!("Probe signature did not verify against the certificate");
    }

    println!("{} {}", "✓".green().bold(), args.path.display());
    println!("  {} {}", "mode:".bold(), codec.mode());
    if let Some(not_after) = codec.not_after() {
        println!("  {} {}", "valid until:".bold(), not_after);
    }
    println!("  {} {} bytes", "probe record:".bold(), output.len());

    Ok(())
}
