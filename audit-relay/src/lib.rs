//! # audit-relay
//!
//! Audit event fan-out with per-destination failure policy.
//!
//! Application code emits structured audit events (logins, entity changes,
//! failures) and the relay delivers each one to every configured destination:
//! a relational table, a remote SIEM collector, or an in-process store. One
//! destination failing never prevents the others from receiving the event.
//!
//! ## Features
//!
//! - **Fan-out dispatcher**: concurrent delivery, first-match lookup, cooperative cancellation
//! - **Failure policy**: per destination, `none`, `console` or `exception`
//! - **SIEM records**: `key="value"` lines with `KLOG` status codes
//! - **Protected transport**: RSA-OAEP encryption or RSA/ECDSA signatures from a PEM bundle
//! - **SQL storage**: PostgreSQL or SQLite through `sqlx`, with context-derived custom columns
//! - **Collector**: receiving end of the transport, with record decryption
//!
//! ## Example
//!
//! ```rust,no_run
//! use audit_relay::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = RelayConfig::load()?;
//!     init_tracing(&config.service)?;
//!
//!     let dispatcher = build_dispatcher(&config).await?;
//!
//!     let ctx = AttributeMap::new()
//!         .with(attributes::USER_NAME, "mrossi")
//!         .with(attributes::IP_ADDRESS, "10.0.0.7")
//!         .shared();
//!     let event = AuditEvent::new(EventKind::Login);
//!
//!     dispatcher.insert(&event, &ctx).await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod collector;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod format;
pub mod health;
pub mod observability;
pub mod policy;
pub mod provider;
pub mod setup;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::codec::{AlgorithmMode, CertificateCodec, CertificateConfig, RecordDecryptor};
    pub use crate::collector::{Collector, ReceivedRecord};
    pub use crate::config::{
        BackendConfig, LogFormat, RegistrationConfig, RelayConfig, RemoteLogConfig, ServiceConfig,
    };
    pub use crate::context::{attributes, AttributeMap, AuditContext, SharedContext};
    pub use crate::dispatcher::{Dispatcher, DispatcherBuilder, ProviderRegistration};
    pub use crate::error::{AuditError, CertificateErrorKind, Error, Result};
    pub use crate::event::{AuditEvent, EventKind};
    pub use crate::format::{KeyValueFormatter, MessageFormatter};
    pub use crate::health::RegistrationHealth;
    pub use crate::observability::init_tracing;
    pub use crate::policy::{FailurePolicy, Operation};
    pub use crate::provider::{
        AuditProvider, AuditTableConfig, DeliveryMode, MemoryProvider, RemoteLogProvider,
        SqlProvider,
    };
    pub use crate::setup::build_dispatcher;
    pub use crate::transport::{SecureTransport, TransportTarget};

    pub use async_trait::async_trait;
    pub use tokio_util::sync::CancellationToken;
    pub use uuid::Uuid;
}
