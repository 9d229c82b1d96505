//! Operators built on the protocol.
//!
//! Operators with one upstream and one downstream and no queue of their own
//! are [`relay`]s. `flat_map` and `buffer` keep their own state machines
//! because their upstream finishing does not end the downstream stream.

pub mod buffer;
pub mod decode;
pub mod flat_map;
pub mod into_stream;
pub mod prefix_while;
pub mod relay;
pub mod sink;

pub use buffer::{Buffer, Prefetch, WhenFull};
pub use decode::{Decode, Decoder};
#[cfg(feature = "json")]
pub use decode::JsonDecoder;
pub use flat_map::FlatMap;
pub use into_stream::IntoStream;
pub use prefix_while::{PrefixWhile, TryPrefixWhile};
pub use sink::Sink;
