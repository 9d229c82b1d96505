//! Decode operator implementation
//!
//! Turns raw upstream payloads into values through a synchronous
//! [`Decoder`]. The decoder runs once per value and is never retried; the
//! first decode error cancels upstream and fails the stream.

use std::marker::PhantomData;

use crate::{
  ops::relay::{Hint, Relay, RelayStep, Step},
  publisher::Publisher,
  subscriber::Subscriber,
};

/// Synchronous `input → value` conversion that may fail.
pub trait Decoder<Input>: Send {
  type Output;
  type Error;

  fn decode(&self, input: &Input) -> Result<Self::Output, Self::Error>;
}

impl<Input, Output, Error, F> Decoder<Input> for F
where
  F: Fn(&Input) -> Result<Output, Error> + Send,
{
  type Output = Output;
  type Error = Error;

  #[inline]
  fn decode(&self, input: &Input) -> Result<Output, Error> { self(input) }
}

/// Decodes JSON byte payloads into `T`.
#[cfg(feature = "json")]
pub struct JsonDecoder<T>(Hint<T>);

#[cfg(feature = "json")]
impl<T> JsonDecoder<T> {
  pub fn new() -> Self { JsonDecoder(PhantomData) }
}

#[cfg(feature = "json")]
impl<T> Default for JsonDecoder<T> {
  fn default() -> Self { Self::new() }
}

#[cfg(feature = "json")]
impl<Input, T> Decoder<Input> for JsonDecoder<T>
where
  Input: AsRef<[u8]>,
  T: serde::de::DeserializeOwned,
{
  type Output = T;
  type Error = crate::error::DecodeError;

  fn decode(&self, input: &Input) -> Result<T, Self::Error> {
    Ok(serde_json::from_slice(input.as_ref())?)
  }
}

#[derive(Clone)]
pub struct Decode<S, D> {
  pub source: S,
  pub decoder: D,
}

pub struct DecodeStep<I, E, D> {
  decoder: D,
  _hint: Hint<(I, E)>,
}

impl<I, E, D> RelayStep for DecodeStep<I, E, D>
where
  D: Decoder<I>,
  E: From<D::Error>,
{
  type In = I;
  type Out = D::Output;
  type Err = E;

  fn step(&mut self, value: I) -> Step<D::Output, E> {
    match self.decoder.decode(&value) {
      Ok(decoded) => Step::Emit(decoded),
      Err(err) => Step::Fail(E::from(err)),
    }
  }
}

impl<S, D> Publisher for Decode<S, D>
where
  S: Publisher,
  S::Item: 'static,
  S::Err: From<D::Error> + 'static,
  D: Decoder<S::Item> + 'static,
  D::Output: 'static,
{
  type Item = D::Output;
  type Err = S::Err;

  fn subscribe<O>(self, subscriber: O)
  where
    O: Subscriber<Item = D::Output, Err = S::Err> + 'static,
  {
    let Decode { source, decoder } = self;
    let step = DecodeStep { decoder, _hint: PhantomData };
    source.subscribe(Relay::new(subscriber, step));
  }
}
