//! FlatMap operator implementation
//!
//! Every upstream value is turned into an inner publisher; the values of all
//! inner publishers are merged into one downstream stream. Upstream is asked
//! for `max_publishers` values up front and for one more each time an inner
//! publisher finishes, which bounds how many inner publishers are subscribed
//! at once.
//!
//! Each inner publisher is asked for one value at a time. A value that arrives
//! while downstream has no credit waits in that inner publisher's single
//! pending slot and is delivered, in registration order, once credit shows
//! up.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{
  demand::Demand,
  ops::relay::Hint,
  publisher::Publisher,
  subscriber::{Completion, Subscriber},
  subscription::{BoxedSubscription, DynamicSubscriptions, Subscription},
};

/// FlatMap operator: merges the inner publishers produced by `transform`.
///
/// # Examples
///
/// ```
/// use rxflow::prelude::*;
///
/// let subscriber = TestSubscriber::<i32, ()>::new(Demand::UNLIMITED);
/// Sequence::new(1..=3)
///   .flat_map(Demand::max(1), |v| Sequence::new(vec![v * 10, v * 10 + 1]))
///   .subscribe(subscriber.clone());
/// assert_eq!(subscriber.values(), vec![10, 11, 20, 21, 30, 31]);
/// ```
pub struct FlatMap<S, F> {
  pub source: S,
  pub max_publishers: Demand,
  pub transform: F,
}

impl<S, F> FlatMap<S, F> {
  pub fn new(source: S, max_publishers: Demand, transform: F) -> Self {
    assert!(!max_publishers.is_zero(), "flat_map needs max_publishers above zero");
    FlatMap { source, max_publishers, transform }
  }
}

impl<S, F, P> Publisher for FlatMap<S, F>
where
  S: Publisher,
  S::Item: 'static,
  S::Err: Send + 'static,
  F: FnMut(S::Item) -> P + Send + 'static,
  P: Publisher<Err = S::Err>,
  P::Item: Send + 'static,
{
  type Item = P::Item;
  type Err = S::Err;

  fn subscribe<O>(self, subscriber: O)
  where
    O: Subscriber<Item = P::Item, Err = S::Err> + 'static,
  {
    let FlatMap { source, max_publishers, transform } = self;
    source.subscribe(Outer::new(subscriber, max_publishers, transform));
  }
}

enum Link {
  Waiting,
  Active(BoxedSubscription),
  Completed,
  Cancelled,
}

struct Child<T> {
  subscription: Option<BoxedSubscription>,
  pending: Option<T>,
  completed: bool,
}

struct MergeState<T> {
  upstream: Link,
  demand: Demand,
  children: DynamicSubscriptions<Child<T>>,
  /// Somebody is delivering to downstream; everyone else parks values in
  /// pending slots and leaves the draining to that caller.
  emitting: bool,
  terminated: bool,
  /// Keeps the merge alive while it runs, even if downstream drops its
  /// handle. Released on the terminal transition.
  anchor: Option<BoxedSubscription>,
}

impl<T> MergeState<T> {
  /// Marks the merge finished when upstream completed and no inner publisher
  /// is left. Returns whether the caller must now finish downstream.
  fn finish_if_drained(&mut self) -> bool {
    if self.terminated || self.emitting {
      return false;
    }
    if matches!(self.upstream, Link::Completed) && self.children.is_empty() {
      self.terminated = true;
      self.anchor = None;
      true
    } else {
      false
    }
  }

  /// Enters the terminal state, handing back every link that must be
  /// cancelled.
  fn terminate(&mut self, except: Option<usize>) -> Option<Vec<BoxedSubscription>> {
    if self.terminated {
      return None;
    }
    self.terminated = true;
    self.anchor = None;
    let mut links = Vec::with_capacity(self.children.len() + 1);
    if let Link::Active(upstream) = std::mem::replace(&mut self.upstream, Link::Cancelled) {
      links.push(upstream);
    }
    if let Some(id) = except {
      self.children.remove(id);
    }
    links.extend(self.children.drain().filter_map(|child| child.subscription));
    Some(links)
  }
}

/// Subscribed to upstream; the subscription handed to downstream.
struct Outer<D, F, In, T> {
  downstream: D,
  transform: Mutex<F>,
  max_publishers: Demand,
  state: Mutex<MergeState<T>>,
  this: Weak<Self>,
  _hint: Hint<In>,
}

/// Subscribed to one inner publisher. Holds only a weak link to the merge.
struct Side<D, F, In, T> {
  index: usize,
  parent: Weak<Outer<D, F, In, T>>,
}

impl<D, F, In, T> Outer<D, F, In, T> {
  fn new(downstream: D, max_publishers: Demand, transform: F) -> Arc<Self> {
    Arc::new_cyclic(|this| Outer {
      downstream,
      transform: Mutex::new(transform),
      max_publishers,
      state: Mutex::new(MergeState {
        upstream: Link::Waiting,
        demand: Demand::NONE,
        children: DynamicSubscriptions::new(),
        emitting: false,
        terminated: false,
        anchor: None,
      }),
      this: this.clone(),
      _hint: Hint::default(),
    })
  }
}

impl<D, F, In, T> Outer<D, F, In, T>
where
  D: Subscriber<Item = T>,
{
  fn fail(&self, err: D::Err, except: Option<usize>) {
    let Some(links) = self.state.lock().terminate(except) else {
      return;
    };
    tracing::debug!(links = links.len(), "flat_map failed, cancelling upstream and inner publishers");
    for link in links {
      link.cancel();
    }
    self.downstream.on_complete(Completion::Failure(err));
  }

  fn finish(&self) {
    tracing::debug!("flat_map finished");
    self.downstream.on_complete(Completion::Finished);
  }

  fn child_subscribed(&self, index: usize, subscription: BoxedSubscription) {
    {
      let mut state = self.state.lock();
      if !state.terminated {
        if let Some(child) = state.children.get_mut(index) {
          child.subscription = Some(subscription.clone());
          drop(state);
          subscription.request(Demand::max(1));
          return;
        }
      }
    }
    subscription.cancel();
  }

  fn child_value(&self, index: usize, value: T) -> Demand {
    let mut state = self.state.lock();
    if state.terminated {
      return Demand::NONE;
    }
    let can_emit = !state.emitting && !state.demand.is_zero();
    let Some(child) = state.children.get_mut(index) else {
      return Demand::NONE;
    };
    if child.pending.is_some() {
      tracing::warn!(child = index, "inner publisher sent a value it was not asked for, dropping it");
      return Demand::NONE;
    }
    if !can_emit {
      child.pending = Some(value);
      return Demand::NONE;
    }
    state.demand.take_one();
    state.emitting = true;
    drop(state);

    let more = self.downstream.on_next(value);
    self.state.lock().demand += more;
    self.drain();
    Demand::max(1)
  }

  fn child_completed(&self, index: usize, completion: Completion<D::Err>) {
    let err = match completion {
      Completion::Finished => None,
      Completion::Failure(err) => Some(err),
    };
    if let Some(err) = err {
      self.fail(err, Some(index));
      return;
    }

    let mut state = self.state.lock();
    if state.terminated {
      return;
    }
    match state.children.get_mut(index) {
      Some(child) if child.pending.is_some() => {
        // Leave it registered until its last value is drained.
        child.completed = true;
        child.subscription = None;
      }
      Some(_) => {
        state.children.remove(index);
      }
      None => return,
    }
    tracing::trace!(child = index, remaining = state.children.len(), "inner publisher finished");

    if state.finish_if_drained() {
      drop(state);
      self.finish();
      return;
    }
    let upstream = match &state.upstream {
      Link::Active(upstream) => Some(upstream.clone()),
      _ => None,
    };
    drop(state);
    if let Some(upstream) = upstream {
      upstream.request(Demand::max(1));
    }
  }

  /// Delivers pending values while credit lasts, then gives up the emitting
  /// role. Must only be called by the holder of that role.
  fn drain(&self) {
    loop {
      let mut state = self.state.lock();
      if state.terminated {
        state.emitting = false;
        return;
      }

      if !state.demand.is_zero() {
        if let Some((id, child)) = state.children.find_mut(|c| c.pending.is_some()) {
          let value = child.pending.take();
          let next = if child.completed { None } else { child.subscription.clone() };
          if child.completed {
            state.children.remove(id);
          }
          state.demand.take_one();
          drop(state);

          if let Some(value) = value {
            let more = self.downstream.on_next(value);
            self.state.lock().demand += more;
          }
          if let Some(next) = next {
            next.request(Demand::max(1));
          }
          continue;
        }
      }

      state.emitting = false;
      let finished = state.finish_if_drained();
      drop(state);
      if finished {
        self.finish();
      }
      return;
    }
  }

  /// Unbounded credit: take every pending value in one go and deliver them
  /// without looking at the demand counter in between.
  fn drain_unbounded(&self) {
    let batch: SmallVec<[(T, Option<BoxedSubscription>); 4]> = {
      let mut state = self.state.lock();
      let batch = state
        .children
        .iter_mut()
        .filter_map(|child| {
          let value = child.pending.take()?;
          let next = if child.completed { None } else { child.subscription.clone() };
          Some((value, next))
        })
        .collect();
      state.children.retain(|child| !child.completed);
      batch
    };

    for (value, next) in batch {
      if self.state.lock().terminated {
        return;
      }
      self.downstream.on_next(value);
      if let Some(next) = next {
        next.request(Demand::max(1));
      }
    }
  }
}

impl<D, F, In, T, P> Subscriber for Outer<D, F, In, T>
where
  D: Subscriber<Item = T> + 'static,
  D::Err: Send + 'static,
  F: FnMut(In) -> P + Send + 'static,
  P: Publisher<Item = T, Err = D::Err>,
  T: Send + 'static,
  In: 'static,
{
  type Item = In;
  type Err = D::Err;

  fn on_subscribe(&self, subscription: BoxedSubscription) {
    {
      let mut state = self.state.lock();
      if !matches!(state.upstream, Link::Waiting) {
        let cancelled = state.terminated;
        drop(state);
        if !cancelled {
          tracing::warn!("flat_map received a second upstream subscription, cancelling it");
        }
        subscription.cancel();
        return;
      }
      state.upstream = Link::Active(subscription.clone());
      state.anchor = self.this.upgrade().map(|this| this as BoxedSubscription);
    }
    if let Some(this) = self.this.upgrade() {
      self.downstream.on_subscribe(this);
    }
    if self.state.lock().terminated {
      return;
    }
    tracing::trace!(max_publishers = %self.max_publishers, "flat_map requesting upstream");
    subscription.request(self.max_publishers);
  }

  fn on_next(&self, value: In) -> Demand {
    if self.state.lock().terminated {
      return Demand::NONE;
    }
    let inner = {
      let mut transform = self.transform.lock();
      (*transform)(value)
    };
    let index = {
      let mut state = self.state.lock();
      if state.terminated {
        return Demand::NONE;
      }
      state.children.add(Child { subscription: None, pending: None, completed: false })
    };
    tracing::trace!(child = index, "subscribing inner publisher");
    inner.subscribe(Side { index, parent: self.this.clone() });
    Demand::NONE
  }

  fn on_complete(&self, completion: Completion<D::Err>) {
    match completion {
      Completion::Failure(err) => self.fail(err, None),
      Completion::Finished => {
        let mut state = self.state.lock();
        if state.terminated {
          return;
        }
        state.upstream = Link::Completed;
        let finished = state.finish_if_drained();
        drop(state);
        if finished {
          self.finish();
        }
      }
    }
  }
}

impl<D, F, In, T> Subscription for Outer<D, F, In, T>
where
  D: Subscriber<Item = T>,
  D::Err: Send,
  F: Send,
  T: Send,
{
  fn request(&self, demand: Demand) {
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

    if demand.is_unlimited() {
      self.drain_unbounded();
    }
    self.drain();
  }

  fn cancel(&self) {
    let Some(links) = self.state.lock().terminate(None) else {
      return;
    };
    tracing::debug!(links = links.len(), "flat_map cancelled");
    for link in links {
      link.cancel();
    }
  }
}

impl<D, F, In, T> Subscriber for Side<D, F, In, T>
where
  D: Subscriber<Item = T>,
  D::Err: Send,
  F: Send,
  T: Send,
{
  type Item = T;
  type Err = D::Err;

  fn on_subscribe(&self, subscription: BoxedSubscription) {
    match self.parent.upgrade() {
      Some(parent) => parent.child_subscribed(self.index, subscription),
      None => subscription.cancel(),
    }
  }

  fn on_next(&self, value: T) -> Demand {
    match self.parent.upgrade() {
      Some(parent) => parent.child_value(self.index, value),
      None => Demand::NONE,
    }
  }

  fn on_complete(&self, completion: Completion<D::Err>) {
    if let Some(parent) = self.parent.upgrade() {
      parent.child_completed(self.index, completion);
    }
  }
}
