//! Remote log (SIEM) provider
//!
//! Renders each event with a [`MessageFormatter`], protects it through the
//! [`SecureTransport`] codec and ships it to the collector. Formatting and
//! transformation always run inline, so codec failures reach the
//! registration's failure policy; only the socket write may be detached.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use super::AuditProvider;
use crate::context::SharedContext;
use crate::error::Result;
use crate::event::AuditEvent;
use crate::format::{KeyValueFormatter, MessageFormatter};
use crate::transport::SecureTransport;

/// When a record counts as sent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Hand the write to a background task; delivery failures are logged and dropped
    #[default]
    Detached,
    /// Wait for the write; delivery failures go to the failure policy
    Awaited,
}

/// Sends formatted records to a remote collector
pub struct RemoteLogProvider {
    transport: Arc<SecureTransport>,
    formatter: Arc<dyn MessageFormatter>,
    delivery: DeliveryMode,
}

impl std::fmt::Debug for RemoteLogProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteLogProvider")
            .field("target", self.transport.target())
            .field("mode", &self.transport.codec().mode())
            .field("delivery", &self.delivery)
            .finish_non_exhaustive()
    }
}

impl RemoteLogProvider {
    /// Provider using the default `key="value"` layout and detached delivery
    pub fn new(transport: SecureTransport) -> Self {
        Self {
            transport: Arc::new(transport),
            formatter: Arc::new(KeyValueFormatter::default()),
            delivery: DeliveryMode::default(),
        }
    }

    /// Replace the record layout
    pub fn with_formatter(mut self, formatter: Arc<dyn MessageFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Choose detached or awaited delivery
    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    async fn ship(&self, event: &AuditEvent, ctx: &SharedContext) -> Result<()> {
        let line = self.formatter.render(event, ctx.as_ref());
        let record = self.transport.prepare(&line)?;

        match self.delivery {
            DeliveryMode::Awaited => self.transport.deliver(&record).await,
            DeliveryMode::Detached => {
                let transport = Arc::clone(&self.transport);
                let event_id = event.id;
                tokio::spawn(
                    async move {
                        if let Err(e) = transport.deliver(&record).await {
                            tracing::warn!(
                                %event_id,
                                error = %e,
                                "Detached audit record delivery failed"
                            );
                        }
                    }
                    .in_current_span(),
                );
                Ok(())
            }
        }
    }
}

#[async_trait]
impl AuditProvider for RemoteLogProvider {
    async fn insert(&self, event: &AuditEvent, ctx: &SharedContext) -> Result<()> {
        self.ship(event, ctx).await
    }

    /// A collector is append-only; the replacement goes out as a new record
    async fn replace(&self, id: Uuid, event: &AuditEvent, ctx: &SharedContext) -> Result<()> {
        let event = AuditEvent {
            id,
            ..event.clone()
        };
        self.ship(&event, ctx).await
    }

    async fn get(&self, _id: Uuid) -> Result<Option<AuditEvent>> {
        Ok(None)
    }
}
