//! Dispatcher assembly from configuration
//!
//! Providers are built eagerly: SQL pools connect and certificate bundles are
//! validated here, so configuration mistakes surface at startup rather than
//! on the first audited request.

use std::sync::Arc;

use crate::codec::CertificateCodec;
use crate::config::{BackendConfig, RelayConfig, RemoteLogConfig};
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::format::KeyValueFormatter;
use crate::provider::{AuditProvider, MemoryProvider, RemoteLogProvider, SqlProvider};
use crate::transport::{SecureTransport, TransportTarget};

/// Build every configured registration, in order
pub async fn build_dispatcher(config: &RelayConfig) -> Result<Dispatcher> {
    config.validate()?;

    let mut builder = Dispatcher::builder();
    for registration in &config.registrations {
        let provider = build_provider(&registration.backend)
            .await
            .map_err(|e| match e {
                // keep certificate and key errors typed for the caller
                Error::CertificateInvalid { .. } | Error::InvalidKeyConfiguration(_) => e,
                other => Error::Configuration(format!(
                    "registration '{}' ({}): {}",
                    registration.name,
                    registration.backend.kind(),
                    other
                )),
            })?;

        tracing::info!(
            registration = %registration.name,
            backend = registration.backend.kind(),
            policy = %registration.failure_policy,
            "Audit registration ready"
        );
        builder = builder.register(&registration.name, provider, registration.failure_policy);
    }

    if config.registrations.is_empty() {
        tracing::warn!("No audit registrations configured; events will be discarded");
    }

    Ok(builder.build())
}

/// Build the provider for one backend
pub async fn build_provider(backend: &BackendConfig) -> Result<Arc<dyn AuditProvider>> {
    Ok(match backend {
        BackendConfig::Sql(table) => Arc::new(SqlProvider::connect(table.clone()).await?),
        BackendConfig::RemoteLog(remote) => Arc::new(build_remote_log(remote)?),
        BackendConfig::Memory => Arc::new(MemoryProvider::new()),
    })
}

/// Build a remote log provider, loading its certificate bundle
pub fn build_remote_log(config: &RemoteLogConfig) -> Result<RemoteLogProvider> {
    let target = TransportTarget::new(&config.host, config.port)?;
    let codec = match &config.certificate {
        Some(certificate) => CertificateCodec::load(certificate)?,
        None => CertificateCodec::passthrough(),
    };

    let transport = SecureTransport::new(target, Arc::new(codec))
        .with_connect_timeout(config.connect_timeout());

    Ok(RemoteLogProvider::new(transport)
        .with_formatter(Arc::new(KeyValueFormatter::with_code_prefix(
            &config.code_prefix,
        )))
        .with_delivery(config.delivery))
}
