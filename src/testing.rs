//! Collaborators for conformance tests.
//!
//! [`TestSubscriber`] attaches to any publisher with a chosen demand and
//! records every signal in order. [`ManualPublisher`] is a source a test
//! drives by hand; it ignores demand on purpose so operators can be fed
//! values they did not ask for.

mod manual_publisher;
mod test_subscriber;

pub use manual_publisher::ManualPublisher;
pub use test_subscriber::{Event, TestSubscriber};
