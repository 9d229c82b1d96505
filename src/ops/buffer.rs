//! Buffer operator implementation
//!
//! A bounded FIFO queue between upstream and downstream. How eagerly the
//! queue is filled is set by [`Prefetch`]; what happens to a value arriving
//! at a full queue is set by [`WhenFull`].

use std::{
  collections::VecDeque,
  fmt,
  sync::{Arc, Weak},
};

use parking_lot::{Mutex, MutexGuard};

use crate::{
  demand::Demand,
  publisher::Publisher,
  subscriber::{Completion, Subscriber},
  subscription::{BoxedSubscription, Subscription},
};

/// How the buffer asks upstream for values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefetch {
  /// Request unlimited demand on subscription and let the queue absorb the
  /// difference. Every value handed downstream from the queue is replaced by
  /// a fresh request.
  KeepFull,
  /// Request only what downstream asked for and the queue does not already
  /// hold.
  ByRequest,
}

/// What happens to a value that arrives while the queue is full.
pub enum WhenFull<E> {
  /// Discard the incoming value.
  DropNewest,
  /// Evict the oldest queued value to make room.
  DropOldest,
  /// Fail the stream with the error built by the closure.
  CustomError(Arc<dyn Fn() -> E + Send + Sync>),
}

impl<E> WhenFull<E> {
  pub fn custom_error<F>(make_error: F) -> Self
  where
    F: Fn() -> E + Send + Sync + 'static,
  {
    WhenFull::CustomError(Arc::new(make_error))
  }
}

impl<E> Clone for WhenFull<E> {
  fn clone(&self) -> Self {
    match self {
      WhenFull::DropNewest => WhenFull::DropNewest,
      WhenFull::DropOldest => WhenFull::DropOldest,
      WhenFull::CustomError(make_error) => WhenFull::CustomError(make_error.clone()),
    }
  }
}

impl<E> fmt::Debug for WhenFull<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      WhenFull::DropNewest => f.write_str("DropNewest"),
      WhenFull::DropOldest => f.write_str("DropOldest"),
      WhenFull::CustomError(_) => f.write_str("CustomError"),
    }
  }
}

/// Buffer operator.
///
/// # Examples
///
/// ```
/// use rxflow::prelude::*;
///
/// let subscriber = TestSubscriber::<i32, ()>::new(Demand::NONE);
/// Sequence::new(vec![1, 2, 3])
///   .buffer(2, Prefetch::KeepFull, WhenFull::DropOldest)
///   .subscribe(subscriber.clone());
///
/// subscriber.request(Demand::max(2));
/// assert_eq!(subscriber.values(), vec![2, 3]);
/// assert_eq!(subscriber.completion(), Some(Completion::Finished));
/// ```
pub struct Buffer<S: Publisher> {
  pub source: S,
  pub size: usize,
  pub prefetch: Prefetch,
  pub when_full: WhenFull<S::Err>,
}

impl<S: Publisher> Buffer<S> {
  pub fn new(source: S, size: usize, prefetch: Prefetch, when_full: WhenFull<S::Err>) -> Self {
    assert!(size > 0, "buffer size must be above zero");
    Buffer { source, size, prefetch, when_full }
  }
}

impl<S> Publisher for Buffer<S>
where
  S: Publisher,
  S::Item: Send + 'static,
  S::Err: Send + 'static,
{
  type Item = S::Item;
  type Err = S::Err;

  fn subscribe<O>(self, subscriber: O)
  where
    O: Subscriber<Item = S::Item, Err = S::Err> + 'static,
  {
    let Buffer { source, size, prefetch, when_full } = self;
    source.subscribe(BufferSubscriber::new(subscriber, size, prefetch, when_full));
  }
}

struct BufferState<T> {
  upstream: Option<BoxedSubscription>,
  queue: VecDeque<T>,
  demand: Demand,
  /// Requested from upstream but not received yet. Only tracked for
  /// [`Prefetch::ByRequest`].
  outstanding: Demand,
  emitting: bool,
  upstream_finished: bool,
  terminated: bool,
}

impl<T> BufferState<T> {
  fn terminate(&mut self) -> Option<Option<BoxedSubscription>> {
    if self.terminated {
      return None;
    }
    self.terminated = true;
    self.queue.clear();
    Some(self.upstream.take())
  }
}

struct BufferSubscriber<D, T, E> {
  downstream: D,
  size: usize,
  prefetch: Prefetch,
  when_full: WhenFull<E>,
  state: Mutex<BufferState<T>>,
  this: Weak<Self>,
}

impl<D, T, E> BufferSubscriber<D, T, E> {
  fn new(downstream: D, size: usize, prefetch: Prefetch, when_full: WhenFull<E>) -> Arc<Self> {
    Arc::new_cyclic(|this| BufferSubscriber {
      downstream,
      size,
      prefetch,
      when_full,
      state: Mutex::new(BufferState {
        upstream: None,
        queue: VecDeque::with_capacity(size),
        demand: Demand::NONE,
        outstanding: Demand::NONE,
        emitting: false,
        upstream_finished: false,
        terminated: false,
      }),
      this: this.clone(),
    })
  }
}

impl<D, T, E> BufferSubscriber<D, T, E>
where
  D: Subscriber<Item = T, Err = E>,
{
  /// Delivers queued values while credit lasts, then gives up the emitting
  /// role and tops upstream up. Must only be called by the holder of that
  /// role.
  fn drain(&self) {
    let mut dequeued = 0u64;
    loop {
      let mut state = self.state.lock();
      if state.terminated {
        state.emitting = false;
        return;
      }
      if !state.demand.is_zero() {
        if let Some(value) = state.queue.pop_front() {
          state.demand.take_one();
          drop(state);
          dequeued += 1;
          let more = self.downstream.on_next(value);
          self.state.lock().demand += more;
          continue;
        }
      }

      state.emitting = false;
      if state.upstream_finished {
        let finished = state.queue.is_empty();
        if finished {
          state.terminated = true;
        }
        drop(state);
        if finished {
          tracing::debug!("buffer drained, finishing");
          self.downstream.on_complete(Completion::Finished);
        }
        return;
      }

      let refill = match self.prefetch {
        Prefetch::KeepFull => Demand::max(dequeued),
        Prefetch::ByRequest => {
          let wanted = state.demand - Demand::max(state.queue.len() as u64);
          let more =
            if state.outstanding.is_unlimited() { Demand::NONE } else { wanted - state.outstanding };
          state.outstanding += more;
          more
        }
      };
      let upstream = if refill.is_zero() { None } else { state.upstream.clone() };
      drop(state);
      if let Some(upstream) = upstream {
        tracing::trace!(demand = %refill, "buffer requesting upstream");
        upstream.request(refill);
      }
      return;
    }
  }

  /// Applies the overflow policy while still holding the lock that saw the
  /// queue full.
  fn overflow(&self, mut state: MutexGuard<'_, BufferState<T>>, value: T) {
    match &self.when_full {
      WhenFull::DropNewest => {
        tracing::trace!("buffer full, dropping newest value");
      }
      WhenFull::DropOldest => {
        let oldest = state.queue.pop_front();
        state.queue.push_back(value);
        drop(state);
        drop(oldest);
        tracing::trace!("buffer full, dropped oldest value");
      }
      WhenFull::CustomError(make_error) => {
        let Some(upstream) = state.terminate() else {
          return;
        };
        drop(state);
        tracing::debug!(size = self.size, "buffer overflowed, failing");
        if let Some(upstream) = upstream {
          upstream.cancel();
        }
        self.downstream.on_complete(Completion::Failure(make_error()));
      }
    }
  }
}

impl<D, T, E> Subscriber for BufferSubscriber<D, T, E>
where
  D: Subscriber<Item = T, Err = E> + 'static,
  T: Send + 'static,
  E: Send + 'static,
{
  type Item = T;
  type Err = E;

  fn on_subscribe(&self, subscription: BoxedSubscription) {
    {
      let mut state = self.state.lock();
      if state.terminated || state.upstream.is_some() || state.upstream_finished {
        drop(state);
        tracing::warn!("buffer received a second upstream subscription, cancelling it");
        subscription.cancel();
        return;
      }
      state.upstream = Some(subscription.clone());
    }
    if let Some(this) = self.this.upgrade() {
      self.downstream.on_subscribe(this);
    }
    if self.state.lock().terminated {
      return;
    }
    if self.prefetch == Prefetch::KeepFull {
      tracing::trace!("buffer prefetching unlimited");
      subscription.request(Demand::UNLIMITED);
    }
  }

  fn on_next(&self, value: T) -> Demand {
    let mut state = self.state.lock();
    if state.terminated {
      return Demand::NONE;
    }
    if self.prefetch == Prefetch::ByRequest {
      state.outstanding.take_one();
    }

    if !state.emitting && state.queue.is_empty() && !state.demand.is_zero() {
      state.demand.take_one();
      state.emitting = true;
      drop(state);
      let more = self.downstream.on_next(value);
      self.state.lock().demand += more;
      self.drain();
      return Demand::NONE;
    }

    if state.queue.len() < self.size {
      state.queue.push_back(value);
      return Demand::NONE;
    }
    self.overflow(state, value);
    Demand::NONE
  }

  fn on_complete(&self, completion: Completion<E>) {
    match completion {
      Completion::Failure(err) => {
        if self.state.lock().terminate().is_none() {
          return;
        }
        tracing::debug!("upstream failed, buffer discarded");
        self.downstream.on_complete(Completion::Failure(err));
      }
      Completion::Finished => {
        let mut state = self.state.lock();
        if state.terminated || state.upstream_finished {
          return;
        }
        state.upstream_finished = true;
        state.upstream = None;
        let finished = !state.emitting && state.queue.is_empty();
        if finished {
          state.terminated = true;
        }
        drop(state);
        if finished {
          self.downstream.on_complete(Completion::Finished);
        }
      }
    }
  }
}

impl<D, T, E> Subscription for BufferSubscriber<D, T, E>
where
  D: Subscriber<Item = T, Err = E>,
  T: Send,
  E: Send,
{
  fn request(&self, demand: Demand) {
    if demand.is_zero() {
      return;
    }
    let mut state = self.state.lock();
    if state.terminated {
      return;
    }
    state.demand += demand;
    if state.emitting {
      return;
    }
    state.emitting = true;
    drop(state);
    self.drain();
  }

  fn cancel(&self) {
    let Some(upstream) = self.state.lock().terminate() else {
      return;
    };
    tracing::debug!("buffer cancelled");
    if let Some(upstream) = upstream {
      upstream.cancel();
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::prelude::*;

  struct CancelOnSubscribe;

  impl Subscriber for CancelOnSubscribe {
    type Item = i32;
    type Err = &'static str;

    fn on_subscribe(&self, subscription: BoxedSubscription) { subscription.cancel(); }

    fn on_next(&self, _: i32) -> Demand { Demand::NONE }

    fn on_complete(&self, _: Completion<&'static str>) {}
  }

  fn manual_buffer(
    size: usize,
    prefetch: Prefetch,
    when_full: WhenFull<&'static str>,
    initial: Demand,
  ) -> (ManualPublisher<i32, &'static str>, std::sync::Arc<TestSubscriber<i32, &'static str>>) {
    let source = ManualPublisher::new();
    let subscriber = TestSubscriber::new(initial);
    source.clone().buffer(size, prefetch, when_full).subscribe(subscriber.clone());
    (source, subscriber)
  }

  #[rxflow_macro::test]
  fn drop_oldest_keeps_latest_values() {
    let subscriber = TestSubscriber::<i32, ()>::new(Demand::NONE);
    Sequence::new(vec![1, 2, 3])
      .buffer(2, Prefetch::KeepFull, WhenFull::DropOldest)
      .subscribe(subscriber.clone());
    assert_eq!(subscriber.values(), Vec::<i32>::new());

    subscriber.request(Demand::max(2));
    assert_eq!(subscriber.values(), vec![2, 3]);
    assert_eq!(subscriber.completion(), Some(Completion::Finished));
  }

  #[rxflow_macro::test]
  fn drop_newest_keeps_earliest_values() {
    let subscriber = TestSubscriber::<i32, ()>::new(Demand::NONE);
    Sequence::new(vec![1, 2, 3])
      .buffer(2, Prefetch::KeepFull, WhenFull::DropNewest)
      .subscribe(subscriber.clone());

    subscriber.request(Demand::UNLIMITED);
    assert_eq!(subscriber.values(), vec![1, 2]);
    assert_eq!(subscriber.completion(), Some(Completion::Finished));
  }

  #[rxflow_macro::test]
  fn custom_error_fails_and_cancels_upstream() {
    let (source, subscriber) =
      manual_buffer(1, Prefetch::KeepFull, WhenFull::custom_error(|| "full"), Demand::NONE);

    source.send(1);
    source.send(2);
    assert!(source.is_cancelled());
    assert_eq!(subscriber.completion(), Some(Completion::Failure("full")));

    source.send(3);
    subscriber.request(Demand::UNLIMITED);
    assert_eq!(subscriber.values(), Vec::<i32>::new());
    assert_eq!(subscriber.completions(), 1);
  }

  #[rxflow_macro::test]
  fn keep_full_requests_unlimited() {
    let (source, _subscriber) = manual_buffer(3, Prefetch::KeepFull, WhenFull::DropNewest, Demand::NONE);
    assert_eq!(source.requested(), Demand::UNLIMITED);
  }

  #[rxflow_macro::test]
  fn by_request_follows_downstream_demand() {
    let (source, subscriber) = manual_buffer(4, Prefetch::ByRequest, WhenFull::DropNewest, Demand::max(3));
    assert_eq!(source.requested(), Demand::max(3));

    for v in 1..=3 {
      source.send(v);
    }
    assert_eq!(subscriber.values(), vec![1, 2, 3]);
    assert_eq!(source.requested(), Demand::max(3));

    subscriber.request(Demand::max(2));
    assert_eq!(source.requested(), Demand::max(5));
  }

  #[rxflow_macro::test]
  fn by_request_does_not_rerequest_outstanding_demand() {
    let (source, subscriber) = manual_buffer(4, Prefetch::ByRequest, WhenFull::DropNewest, Demand::max(2));
    subscriber.request(Demand::max(1));
    assert_eq!(source.requested(), Demand::max(3));

    source.send(1);
    subscriber.request(Demand::max(1));
    assert_eq!(source.requested(), Demand::max(4));
  }

  #[rxflow_macro::test]
  fn finishes_after_queue_drains() {
    let (source, subscriber) = manual_buffer(4, Prefetch::KeepFull, WhenFull::DropNewest, Demand::NONE);
    source.send(1);
    source.send(2);
    source.complete(Completion::Finished);
    assert_eq!(subscriber.completion(), None);

    subscriber.request(Demand::max(1));
    assert_eq!(subscriber.values(), vec![1]);
    assert_eq!(subscriber.completion(), None);

    subscriber.request(Demand::max(1));
    assert_eq!(subscriber.values(), vec![1, 2]);
    assert_eq!(subscriber.completion(), Some(Completion::Finished));
  }

  #[rxflow_macro::test]
  fn failure_discards_queue() {
    let (source, subscriber) = manual_buffer(4, Prefetch::KeepFull, WhenFull::DropNewest, Demand::NONE);
    source.send(1);
    source.send(2);
    source.complete(Completion::Failure("broken"));
    assert_eq!(subscriber.completion(), Some(Completion::Failure("broken")));

    subscriber.request(Demand::UNLIMITED);
    assert_eq!(subscriber.values(), Vec::<i32>::new());
  }

  #[rxflow_macro::test]
  fn cancel_discards_queue_once() {
    let (source, subscriber) = manual_buffer(4, Prefetch::KeepFull, WhenFull::DropNewest, Demand::NONE);
    source.send(1);

    subscriber.cancel();
    subscriber.cancel();
    assert_eq!(source.cancellations(), 1);

    subscriber.request(Demand::UNLIMITED);
    source.complete(Completion::Finished);
    assert_eq!(subscriber.values(), Vec::<i32>::new());
    assert_eq!(subscriber.completion(), None);
  }

  #[rxflow_macro::test]
  #[should_panic(expected = "buffer size must be above zero")]
  fn zero_size_panics() {
    let _ = Sequence::<_, ()>::new(0..3).buffer(0, Prefetch::KeepFull, WhenFull::DropNewest);
  }

  #[rxflow_macro::test]
  fn drop_oldest_rotates_a_full_queue() {
    let (source, subscriber) = manual_buffer(2, Prefetch::KeepFull, WhenFull::DropOldest, Demand::NONE);
    for v in 1..=5 {
      assert_eq!(source.send(v), Demand::NONE);
    }

    subscriber.request(Demand::max(3));
    assert_eq!(subscriber.values(), vec![4, 5]);

    source.send(6);
    assert_eq!(subscriber.values(), vec![4, 5, 6]);
  }

  #[rxflow_macro::test]
  fn overflow_after_cancel_is_ignored() {
    let (source, subscriber) =
      manual_buffer(1, Prefetch::KeepFull, WhenFull::custom_error(|| "full"), Demand::NONE);
    source.send(1);
    subscriber.cancel();

    source.send(2);
    assert_eq!(source.cancellations(), 1);
    assert_eq!(subscriber.completion(), None);
  }

  #[rxflow_macro::test]
  fn cancel_during_subscribe_skips_upstream_request() {
    let source = ManualPublisher::<i32, &'static str>::new();
    source.clone().buffer(2, Prefetch::KeepFull, WhenFull::DropNewest).subscribe(CancelOnSubscribe);
    assert_eq!(source.requested(), Demand::NONE);
    assert!(source.is_cancelled());
  }
}
