//! Fan-out dispatcher
//!
//! The [`Dispatcher`] owns an immutable list of [`ProviderRegistration`]s and
//! forwards every operation to them:
//!
//! - **insert / replace**: one tokio task per registration, all awaited.
//!   Each failure is settled by its registration's [`FailurePolicy`]; the
//!   call fails only when a [`FailurePolicy::Raise`] registration failed, and
//!   then with the first such failure in registration order.
//! - **get**: registrations are asked one at a time, in order; the first hit
//!   wins and later registrations are not consulted.
//!
//! A provider that panics is treated as a failed call. Cancelling a dispatch
//! stops the wait but not the providers: tasks already started run to
//! completion and still settle their outcome.
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::builder()
//!     .register("db", Arc::new(sql_provider), FailurePolicy::Raise)
//!     .register("siem", Arc::new(remote_log), FailurePolicy::Console)
//!     .build();
//!
//! dispatcher.insert(&AuditEvent::new("Login"), &ctx).await?;
//! ```

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::context::SharedContext;
use crate::error::{Error, Result};
use crate::event::AuditEvent;
use crate::health::{HealthTracker, RegistrationHealth};
use crate::policy::{FailurePolicy, Operation};
use crate::provider::AuditProvider;

/// A named provider with its failure policy
pub struct ProviderRegistration {
    name: String,
    provider: Arc<dyn AuditProvider>,
    policy: FailurePolicy,
    health: HealthTracker,
}

impl std::fmt::Debug for ProviderRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistration")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ProviderRegistration {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn AuditProvider>,
        policy: FailurePolicy,
    ) -> Self {
        let name = name.into();
        Self {
            health: HealthTracker::new(name.clone()),
            name,
            provider,
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Settle one call outcome; `Err` only when the policy raises
    fn settle<T: Default>(&self, operation: Operation, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.health.record_success();
                Ok(value)
            }
            Err(error) => {
                let consecutive = self.health.record_failure(&error.to_string());
                self.policy
                    .settle(&self.name, operation, error, consecutive)
                    .map(|()| T::default())
            }
        }
    }
}

/// Write operation sent to every registration
#[derive(Debug, Clone, Copy)]
enum Write {
    Insert,
    Replace(Uuid),
}

impl Write {
    fn operation(&self) -> Operation {
        match self {
            Self::Insert => Operation::Insert,
            Self::Replace(_) => Operation::Replace,
        }
    }
}

/// Builder for [`Dispatcher`]
#[derive(Debug, Default)]
pub struct DispatcherBuilder {
    registrations: Vec<ProviderRegistration>,
}

impl DispatcherBuilder {
    /// Append a registration; order matters for `get` and error reporting
    pub fn register(
        mut self,
        name: impl Into<String>,
        provider: Arc<dyn AuditProvider>,
        policy: FailurePolicy,
    ) -> Self {
        self.registrations
            .push(ProviderRegistration::new(name, provider, policy));
        self
    }

    /// Append a prepared registration
    pub fn registration(mut self, registration: ProviderRegistration) -> Self {
        self.registrations.push(registration);
        self
    }

    pub fn build(self) -> Dispatcher {
        let mut seen = HashSet::new();
        for registration in &self.registrations {
            if !seen.insert(registration.name.as_str()) {
                tracing::warn!(
                    registration = %registration.name,
                    "Duplicate audit registration name '{}'; failures will be ambiguous",
                    registration.name
                );
            }
        }

        tracing::debug!(
            registrations = self.registrations.len(),
            "Audit dispatcher built"
        );

        Dispatcher {
            registrations: self.registrations.into(),
        }
    }
}

/// Composite provider fanning events out to every registration
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registrations: Arc<[ProviderRegistration]>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Registration names, in order
    pub fn registration_names(&self) -> Vec<&str> {
        self.registrations.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Failure counters of every registration, in order
    pub fn health(&self) -> Vec<RegistrationHealth> {
        self.registrations
            .iter()
            .map(|r| r.health.snapshot())
            .collect()
    }

    /// Deliver a new event to every registration
    pub async fn insert(&self, event: &AuditEvent, ctx: &SharedContext) -> Result<()> {
        self.fan_out(Write::Insert, event, ctx, None).await
    }

    /// [`insert`](Self::insert) that stops waiting when `cancel` fires
    pub async fn insert_with_cancel(
        &self,
        event: &AuditEvent,
        ctx: &SharedContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.fan_out(Write::Insert, event, ctx, Some(cancel)).await
    }

    /// Overwrite event `id` in every registration
    pub async fn replace(&self, id: Uuid, event: &AuditEvent, ctx: &SharedContext) -> Result<()> {
        self.fan_out(Write::Replace(id), event, ctx, None).await
    }

    /// [`replace`](Self::replace) that stops waiting when `cancel` fires
    pub async fn replace_with_cancel(
        &self,
        id: Uuid,
        event: &AuditEvent,
        ctx: &SharedContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.fan_out(Write::Replace(id), event, ctx, Some(cancel))
            .await
    }

    /// First registration that has event `id` wins
    pub async fn get(&self, id: Uuid) -> Result<Option<AuditEvent>> {
        self.lookup(id, None).await
    }

    /// [`get`](Self::get) that stops waiting when `cancel` fires
    pub async fn get_with_cancel(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<AuditEvent>> {
        self.lookup(id, Some(cancel)).await
    }

    async fn fan_out(
        &self,
        write: Write,
        event: &AuditEvent,
        ctx: &SharedContext,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        let operation = write.operation();
        let event = Arc::new(event.clone());

        let handles: Vec<_> = (0..self.registrations.len())
            .map(|index| {
                let registrations = Arc::clone(&self.registrations);
                let event = Arc::clone(&event);
                let ctx = Arc::clone(ctx);
                let span = tracing::info_span!(
                    "audit.dispatch",
                    registration = %self.registrations[index].name,
                    %operation
                );

                tokio::spawn(
                    async move {
                        let registration = &registrations[index];
                        let provider = &registration.provider;
                        let call = async {
                            match write {
                                Write::Insert => provider.insert(&event, &ctx).await,
                                Write::Replace(id) => provider.replace(id, &event, &ctx).await,
                            }
                        };
                        let outcome = AssertUnwindSafe(call)
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|panic| Err(Error::TaskFailed(panic_message(panic))));
                        registration.settle(operation, outcome)
                    }
                    .instrument(span),
                )
            })
            .collect();

        let joined = futures::future::join_all(handles);
        let outcomes = match cancel {
            Some(cancel) => tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::warn!(
                        %operation,
                        event_id = %event.id,
                        "Audit dispatch cancelled; in-flight providers continue detached"
                    );
                    return Err(Error::Cancelled);
                }
                outcomes = joined => outcomes,
            },
            None => joined.await,
        };

        // outcomes are in registration order
        let mut first_raised = None;
        for (index, outcome) in outcomes.into_iter().enumerate() {
            let result = match outcome {
                Ok(result) => result,
                Err(join_error) => self.registrations[index]
                    .settle::<()>(operation, Err(Error::TaskFailed(join_error.to_string()))),
            };
            if let Err(error) = result {
                first_raised.get_or_insert(error);
            }
        }

        match first_raised {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn lookup(
        &self,
        id: Uuid,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<AuditEvent>> {
        for index in 0..self.registrations.len() {
            let registrations = Arc::clone(&self.registrations);
            let span = tracing::info_span!(
                "audit.dispatch",
                registration = %self.registrations[index].name,
                operation = %Operation::Get
            );

            let handle = tokio::spawn(
                async move {
                    let registration = &registrations[index];
                    let outcome = AssertUnwindSafe(registration.provider.get(id))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| Err(Error::TaskFailed(panic_message(panic))));
                    registration.settle(Operation::Get, outcome)
                }
                .instrument(span),
            );

            let joined = match cancel {
                Some(cancel) => tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::warn!(event_id = %id, "Audit lookup cancelled");
                        return Err(Error::Cancelled);
                    }
                    joined = handle => joined,
                },
                None => handle.await,
            };

            let found = match joined {
                Ok(result) => result?,
                Err(join_error) => self.registrations[index]
                    .settle(Operation::Get, Err(Error::TaskFailed(join_error.to_string())))?,
            };
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("provider panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("provider panicked: {}", message)
    } else {
        "provider panicked".to_string()
    }
}

#[async_trait]
impl AuditProvider for Dispatcher {
    async fn insert(&self, event: &AuditEvent, ctx: &SharedContext) -> Result<()> {
        Dispatcher::insert(self, event, ctx).await
    }

    async fn replace(&self, id: Uuid, event: &AuditEvent, ctx: &SharedContext) -> Result<()> {
        Dispatcher::replace(self, id, event, ctx).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<AuditEvent>> {
        Dispatcher::get(self, id).await
    }
}
