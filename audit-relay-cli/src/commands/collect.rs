use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use audit_relay::codec::RecordDecryptor;
use audit_relay::collector::{Collector, DEFAULT_MAX_RECORD_LENGTH};
use clap::Args;
use colored::Colorize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct CollectArgs {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:6514")]
    bind: SocketAddr,

    /// Private-key bundle for decrypting rsa_encrypt records
    #[arg(short, long, value_name = "PATH")]
    certificate: Option<PathBuf>,

    /// Password of an encrypted private key
    #[arg(long, env = "AUDIT_RELAY_KEY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Longest accepted record in bytes; longer ones drop the connection
    #[arg(long, default_value_t = DEFAULT_MAX_RECORD_LENGTH)]
    max_record_length: usize,
}

pub async fn execute(args: CollectArgs, log_level: &str) -> Result<()> {
    super::init_logging("audit-relay-collector", log_level)?;

    let decryptor = match &args.certificate {
        Some(path) => Some(
            RecordDecryptor::load(path, args.password.as_deref())
                .with_context(|| format!("Failed to load private key from {}", path.display()))?,
        ),
        None => None,
    };

    let collector = Collector::bind(args.bind, decryptor)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?
        .with_max_record_length(args.max_record_length);
    let local = collector.local_addr()?;

    eprintln!(
        "{} listening on {}{}",
        "✓".green().bold(),
        local.to_string().cyan(),
        if args.certificate.is_some() {
            " (decrypting)".dimmed().to_string()
        } else {
            String::new()
        }
    );

    let (tx, mut rx) = mpsc::channel(256);
    let shutdown = CancellationToken::new();

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    let server = tokio::spawn(collector.run(tx, shutdown.clone()));

    // stdout carries only records
    while let Some(record) = rx.recv().await {
        println!("{} {}", record.peer.to_string().dimmed(), record.body);
    }

    server.await.context("Collector task failed")??;
    eprintln!("{} collector stopped", "✓".green().bold());
    Ok(())
}
