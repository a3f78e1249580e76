//! In-process provider

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::AuditProvider;
use crate::context::SharedContext;
use crate::error::{Error, Result};
use crate::event::AuditEvent;

/// Keeps events in a process-local map keyed by event id
#[derive(Debug, Default)]
pub struct MemoryProvider {
    events: RwLock<HashMap<Uuid, AuditEvent>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Copy of every stored event, oldest first
    pub async fn snapshot(&self) -> Vec<AuditEvent> {
        let mut events: Vec<_> = self.events.read().await.values().cloned().collect();
        events.sort_by_key(|e| e.timestamp);
        events
    }
}

#[async_trait]
impl AuditProvider for MemoryProvider {
    async fn insert(&self, event: &AuditEvent, _ctx: &SharedContext) -> Result<()> {
        self.events.write().await.insert(event.id, event.clone());
        Ok(())
    }

    async fn replace(&self, id: Uuid, event: &AuditEvent, _ctx: &SharedContext) -> Result<()> {
        let mut events = self.events.write().await;
        match events.get_mut(&id) {
            Some(slot) => {
                *slot = AuditEvent {
                    id,
                    ..event.clone()
                };
                Ok(())
            }
            None => Err(Error::NotFound(format!("audit event {}", id))),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<AuditEvent>> {
        Ok(self.events.read().await.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;

    #[tokio::test]
    async fn test_insert_get_replace() {
        let provider = MemoryProvider::new();
        let ctx = context::empty();
        let event = AuditEvent::new("Insert").with_entity("Persona", "1");

        provider.insert(&event, &ctx).await.unwrap();
        assert_eq!(provider.get(event.id).await.unwrap(), Some(event.clone()));

        let updated = AuditEvent::new("Update").with_entity("Persona", "1");
        provider.replace(event.id, &updated, &ctx).await.unwrap();

        let stored = provider.get(event.id).await.unwrap().unwrap();
        assert_eq!(stored.id, event.id);
        assert_eq!(stored.kind.as_str(), "Update");
        assert_eq!(provider.len().await, 1);
    }

    #[tokio::test]
    async fn test_replace_missing_is_not_found() {
        let provider = MemoryProvider::new();
        let err = provider
            .replace(Uuid::new_v4(), &AuditEvent::new("Update"), &context::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(provider.get(Uuid::new_v4()).await.unwrap().is_none());
    }
}
