//! Audit provider capability and built-in backends
//!
//! Every destination implements [`AuditProvider`]. The dispatcher holds
//! providers as `Arc<dyn AuditProvider>` and never needs to know which
//! backend it is talking to.
//!
//! # Available Backends
//!
//! - **Memory** ([`MemoryProvider`]): process-local map, for development and tests
//! - **SQL** ([`SqlProvider`]): one row per event in PostgreSQL or SQLite
//! - **Remote log** ([`RemoteLogProvider`]): formatted, protected records sent to a SIEM collector

use async_trait::async_trait;
use uuid::Uuid;

use crate::context::SharedContext;
use crate::error::Result;
use crate::event::AuditEvent;

pub mod memory;
pub mod remote_log;
pub mod sql;

pub use memory::MemoryProvider;
pub use remote_log::{DeliveryMode, RemoteLogProvider};
pub use sql::{AuditTableConfig, SqlProvider};

/// A destination for audit events
///
/// Implementations must be safe to call concurrently; the dispatcher runs
/// every registration of a dispatch on its own task.
#[async_trait]
pub trait AuditProvider: Send + Sync {
    /// Record a new event
    async fn insert(&self, event: &AuditEvent, ctx: &SharedContext) -> Result<()>;

    /// Overwrite the event stored under `id`
    async fn replace(&self, id: Uuid, event: &AuditEvent, ctx: &SharedContext) -> Result<()>;

    /// Look up an event; `Ok(None)` when this destination does not have it
    async fn get(&self, id: Uuid) -> Result<Option<AuditEvent>>;
}
