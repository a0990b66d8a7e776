//! Commit-scoped change notification
//!
//! Holds the live subscriber set and the notifier that publishes
//! `ChangeEvent`s to it once the producing mutation has committed.

pub mod error;
pub mod event;
pub mod notifier;
pub mod registry;

pub use error::{DeliveryError, NotifyError};
pub use event::{topic_for, Action, ChangeEvent, EntityType, Topic};
pub use notifier::{ChangeNotifier, CommitHook, CommitHooks, CommitScope, NoTransaction};
pub use registry::{Payload, Subscriber, SubscriberId, SubscriberRegistry};
