use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use audit_relay::config::RelayConfig;
use audit_relay::context::{attributes, AttributeMap};
use audit_relay::event::AuditEvent;
use audit_relay::setup::build_dispatcher;
use clap::Args;
use colored::Colorize;

#[derive(Args)]
pub struct SendArgs {
    /// Config file (default: standard search path)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Event kind: Login, Logout, Insert, Update, Delete or any custom name
    #[arg(short, long, default_value = "Login")]
    kind: String,

    /// Affected entity name
    #[arg(long, default_value = "")]
    entity: String,

    /// Primary key of the affected entity
    #[arg(long, default_value = "")]
    key: String,

    /// Calling method recorded in the `class` token
    #[arg(long, default_value = "audit-relay.send")]
    method: String,

    /// UserName attribute
    #[arg(long)]
    user: Option<String>,

    /// Role attribute
    #[arg(long)]
    role: Option<String>,

    /// IpAddress attribute
    #[arg(long)]
    ip: Option<String>,

    /// QueryPath attribute (controller/action)
    #[arg(long)]
    query: Option<String>,

    /// Mark the event as failed with this detail
    #[arg(long, value_name = "DETAIL")]
    failed: Option<String>,

    /// JSON payload attached to the event
    #[arg(long, value_name = "JSON")]
    payload: Option<String>,

    /// How long to wait for detached deliveries before exiting
    #[arg(long, default_value_t = 500)]
    wait_ms: u64,
}

pub async fn execute(args: SendArgs, log_level: &str) -> Result<()> {
    let config = match &args.config {
        Some(path) => RelayConfig::load_from(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => RelayConfig::load().context("Failed to load configuration")?,
    };
    super::init_logging(&config.service.name, log_level)?;

    let dispatcher = build_dispatcher(&config)
        .await
        .context("Failed to build dispatcher")?;

    let mut ctx = AttributeMap::new();
    for (name, value) in [
        (attributes::USER_NAME, &args.user),
        (attributes::ROLE, &args.role),
        (attributes::IP_ADDRESS, &args.ip),
        (attributes::QUERY_PATH, &args.query),
    ] {
        if let Some(value) = value {
            ctx = ctx.with(name, value);
        }
    }

    let mut event = AuditEvent::new(args.kind.as_str())
        .with_entity(&args.entity, &args.key)
        .with_calling_method(&args.method);
    if let Some(detail) = &args.failed {
        event = event.failed(detail);
    }
    if let Some(raw) = &args.payload {
        let payload = serde_json::from_str(raw).context("--payload is not valid JSON")?;
        event = event.with_payload(payload);
    }

    dispatcher
        .insert(&event, &ctx.shared())
        .await
        .context("Dispatch failed")?;

    // detached deliveries run on this runtime
    tokio::time::sleep(Duration::from_millis(args.wait_ms)).await;

    println!(
        "{} {} event {} dispatched to {} registration(s)",
        "✓".green().bold(),
        event.kind.to_string().cyan(),
        event.id,
        dispatcher.len()
    );
    for health in dispatcher.health() {
        let status = if health.is_healthy() {
            "ok".green()
        } else {
            "failed".red()
        };
        print!("  {} {}", health.registration.bold(), status);
        match &health.last_error {
            Some(error) if !health.is_healthy() => println!(" {}", error.dimmed()),
            _ => println!(),
        }
    }

    Ok(())
}
