//! Error types surfaced by the crate's own APIs.
//!
//! Stream failures travel as the publisher's associated `Err` type inside
//! [`Completion::Failure`](crate::subscriber::Completion). The enums here
//! cover the places where the crate itself produces a recoverable error.

/// Errors produced when decoding a [`Demand`](crate::demand::Demand) from its
/// wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DemandError {
  /// The raw value is above the `unlimited` bit pattern (`2^63`).
  #[error("demand wire value {0} is out of range (max 2^63)")]
  OutOfRange(u64),
}

/// Errors produced by the bundled decoders.
#[cfg(feature = "json")]
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
  /// The payload is not valid JSON for the requested type.
  #[error("json decode failed: {0}")]
  Json(#[from] serde_json::Error),
}
