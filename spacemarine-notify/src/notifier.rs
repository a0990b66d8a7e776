use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::NotifyError;
use crate::event::ChangeEvent;
use crate::registry::{Payload, SubscriberRegistry};

/// Callback run once the enclosing transaction has committed
pub type CommitHook = Box<dyn FnOnce() + Send + 'static>;

/// Post-commit hook registration exposed by the persistence layer
pub trait CommitScope {
    /// Whether work done through this scope is still uncommitted
    fn transaction_active(&self) -> bool;

    /// Defer `hook` until commit succeeds. Hooks of a scope that rolls back
    /// never run.
    fn on_after_commit(&mut self, hook: CommitHook);
}

/// Ordered list of deferred hooks
///
/// Dropping the list without calling `run_all` discards every hook.
#[derive(Default)]
pub struct CommitHooks {
    hooks: Vec<CommitHook>,
}

impl CommitHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: CommitHook) {
        self.hooks.push(hook);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook in registration order
    pub fn run_all(self) {
        for hook in self.hooks {
            hook();
        }
    }
}

impl fmt::Debug for CommitHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitHooks")
            .field("pending", &self.hooks.len())
            .finish()
    }
}

/// Scope for work that autocommits. Hooks run right away.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTransaction;

impl CommitScope for NoTransaction {
    fn transaction_active(&self) -> bool {
        false
    }

    fn on_after_commit(&mut self, hook: CommitHook) {
        hook();
    }
}

/// Publishes change events to the live subscribers of their topic
#[derive(Clone)]
pub struct ChangeNotifier {
    registry: SubscriberRegistry,
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("registry", &self.registry)
            .finish()
    }
}

impl ChangeNotifier {
    #[must_use]
    pub const fn new(registry: SubscriberRegistry) -> Self {
        Self { registry }
    }

    #[must_use]
    pub const fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Serialize once and fan out. Returns how many subscribers accepted it.
    pub fn publish(&self, event: &ChangeEvent) -> Result<usize, NotifyError> {
        let payload: Payload = Arc::from(event.to_json()?);
        let topic = event.topic();
        let delivered = self.registry.broadcast(topic, payload);

        debug!(
            topic = %topic,
            action = %event.action(),
            subject_id = event.subject_id(),
            delivered,
            "Change event published"
        );

        Ok(delivered)
    }

    /// Publish now. Failures are logged, never returned: the mutation
    /// behind the event has already committed.
    pub fn notify(&self, event: ChangeEvent) {
        if let Err(err) = self.publish(&event) {
            warn!(
                topic = %event.topic(),
                action = %event.action(),
                subject_id = event.subject_id(),
                error = %err,
                "Failed to publish change event"
            );
        }
    }

    /// Publish after `scope` commits, or now if it has no open transaction
    pub fn notify_within<S>(&self, scope: &mut S, event: ChangeEvent)
    where
        S: CommitScope + ?Sized,
    {
        if scope.transaction_active() {
            let notifier = self.clone();
            scope.on_after_commit(Box::new(move || notifier.notify(event)));
        } else {
            self.notify(event);
        }
    }
}
