//! Prelude module for convenient imports
//!
//! This module re-exports commonly used types and traits for easy access.

// Core protocol
pub use crate::demand::Demand;
pub use crate::error::DemandError;
#[cfg(feature = "json")]
pub use crate::error::DecodeError;
// Operators
pub use crate::ops::{
  Buffer, Decode, Decoder, FlatMap, IntoStream, Prefetch, PrefixWhile, Sink, TryPrefixWhile, WhenFull,
};
#[cfg(feature = "json")]
pub use crate::ops::JsonDecoder;
// Sources
pub use crate::publisher::{Empty, Fail, Just, PassthroughSubject, Publisher, Sequence};
pub use crate::subscriber::{BoxedSubscriber, Completion, Subscriber};
pub use crate::subscription::{
  BoxedSubscription, EmptySubscription, Subscription, SubscriptionGuard, SubscriptionState,
};
// Test collaborators
pub use crate::testing::{Event, ManualPublisher, TestSubscriber};
