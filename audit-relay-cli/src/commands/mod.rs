pub mod check_cert;
pub mod collect;
pub mod send;

use audit_relay::config::{LogFormat, ServiceConfig};

/// Pretty diagnostics on stderr for interactive use
pub(crate) fn init_logging(service: &str, log_level: &str) -> anyhow::Result<()> {
    audit_relay::observability::init_tracing(&ServiceConfig {
        name: service.to_string(),
        log_level: log_level.to_string(),
        log_format: LogFormat::Pretty,
    })?;
    Ok(())
}
