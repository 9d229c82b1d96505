//! # rxflow: demand-driven reactive streams
//!
//! A publisher pushes values to a subscriber only as far as the subscriber
//! asked for them. Credit travels upstream as [`Demand`]; values, one
//! terminal [`Completion`] and nothing else travel downstream.
//!
//! ## Quick Start
//!
//! ```rust
//! use rxflow::prelude::*;
//!
//! let subscriber = TestSubscriber::<i32, ()>::new(Demand::max(3));
//! Sequence::new(0..)
//!   .prefix_while(|v| *v < 100)
//!   .subscribe(subscriber.clone());
//!
//! assert_eq!(subscriber.values(), vec![0, 1, 2]);
//! subscriber.cancel();
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Publisher`] | Produces values once subscribed, never beyond granted demand |
//! | [`Subscriber`] | Receives the subscription, the values and one completion |
//! | [`Subscription`] | Grants credit with `request`, stops the stream with `cancel` |
//! | [`Demand`] | Saturating credit counter, finite or unlimited |
//!
//! Everything runs on the caller's stack: there is no executor. Any thread
//! may call `request`, `cancel` or deliver upstream signals concurrently.
//!
//! ## Feature Flags
//!
//! - **`json`** (default): [`JsonDecoder`](ops::decode::JsonDecoder) backed
//!   by `serde_json`.
//!
//! [`Publisher`]: publisher::Publisher
//! [`Subscriber`]: subscriber::Subscriber
//! [`Subscription`]: subscription::Subscription
//! [`Demand`]: demand::Demand
//! [`Completion`]: subscriber::Completion

pub mod demand;
pub mod error;
pub mod ops;
pub mod prelude;
pub mod publisher;
pub mod subscriber;
pub mod subscription;
pub mod testing;

// Re-export the prelude module
pub use prelude::*;

#[cfg(doctest)]
mod __markdown_doctests {
  mod readme {
    #![doc = include_str!("../README.md")]
  }
}
