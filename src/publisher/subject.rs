//! Hot multicast publisher driven by imperative `send` calls.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::{
  demand::Demand,
  publisher::Publisher,
  subscriber::{Completion, Subscriber},
  subscription::{DynamicSubscriptions, EmptySubscription, Subscription},
};

/// Broadcasts sent values to every current subscriber that has outstanding
/// demand. Subscribers without demand miss the value; it is not buffered.
///
/// Once a completion is sent, current subscribers receive it and later
/// subscribers receive it immediately after subscribing.
///
/// ```
/// use rxflow::prelude::*;
///
/// let subject = PassthroughSubject::<i32, ()>::new();
/// let eager = TestSubscriber::new(Demand::UNLIMITED);
/// let idle = TestSubscriber::new(Demand::NONE);
/// subject.clone().subscribe(eager.clone());
/// subject.clone().subscribe(idle.clone());
///
/// subject.send(1);
/// assert_eq!(eager.values(), vec![1]);
/// assert!(idle.values().is_empty());
/// ```
pub struct PassthroughSubject<T, E> {
  core: Arc<SubjectCore<T, E>>,
}

impl<T, E> Clone for PassthroughSubject<T, E> {
  fn clone(&self) -> Self { PassthroughSubject { core: self.core.clone() } }
}

impl<T, E> Default for PassthroughSubject<T, E> {
  fn default() -> Self { Self::new() }
}

trait Conduit<T, E>: Send + Sync {
  fn offer(&self, value: T);
  fn finish(&self, completion: Completion<E>);
}

type ConduitRef<T, E> = Arc<dyn Conduit<T, E>>;

struct SubjectState<T, E> {
  conduits: DynamicSubscriptions<ConduitRef<T, E>>,
  completion: Option<Completion<E>>,
}

struct SubjectCore<T, E> {
  state: Mutex<SubjectState<T, E>>,
}

/// One subscriber's link to the subject. `demand` is `None` once the link is
/// cancelled or finished.
struct SubjectSubscription<S, T, E> {
  id: Mutex<Option<usize>>,
  downstream: S,
  demand: Mutex<Option<Demand>>,
  core: Weak<SubjectCore<T, E>>,
}

impl<T, E> PassthroughSubject<T, E> {
  pub fn new() -> Self {
    PassthroughSubject {
      core: Arc::new(SubjectCore {
        state: Mutex::new(SubjectState { conduits: DynamicSubscriptions::new(), completion: None }),
      }),
    }
  }

  /// Number of live subscribers.
  pub fn subscriber_count(&self) -> usize { self.core.state.lock().conduits.len() }
}

impl<T: Clone, E: Clone> PassthroughSubject<T, E> {
  /// Delivers `value` to every subscriber with outstanding demand.
  pub fn send(&self, value: T) {
    let conduits: Vec<_> = {
      let state = self.core.state.lock();
      if state.completion.is_some() {
        return;
      }
      state.conduits.iter().cloned().collect()
    };
    for conduit in conduits {
      conduit.offer(value.clone());
    }
  }

  /// Terminates the subject. Only the first completion has any effect.
  pub fn send_completion(&self, completion: Completion<E>) {
    let conduits: Vec<_> = {
      let mut state = self.core.state.lock();
      if state.completion.is_some() {
        return;
      }
      state.completion = Some(completion.clone());
      state.conduits.drain().collect()
    };
    tracing::debug!(subscribers = conduits.len(), "subject completed");
    for conduit in conduits {
      conduit.finish(completion.clone());
    }
  }
}

impl<T, E> Publisher for PassthroughSubject<T, E>
where
  T: Clone + Send + 'static,
  E: Clone + Send + 'static,
{
  type Item = T;
  type Err = E;

  fn subscribe<S>(self, subscriber: S)
  where
    S: Subscriber<Item = T, Err = E> + 'static,
  {
    let completed = self.core.state.lock().completion.clone();
    if let Some(completion) = completed {
      subscriber.on_subscribe(EmptySubscription::boxed());
      subscriber.on_complete(completion);
      return;
    }

    let link = Arc::new(SubjectSubscription {
      id: Mutex::new(None),
      downstream: subscriber,
      demand: Mutex::new(Some(Demand::NONE)),
      core: Arc::downgrade(&self.core),
    });
    // Registered only after `on_subscribe` so no signal can overtake it.
    link.downstream.on_subscribe(link.clone());

    let mut state = self.core.state.lock();
    match state.completion.clone() {
      Some(completion) => {
        drop(state);
        link.finish(completion);
      }
      None => {
        let demand = link.demand.lock();
        if demand.is_some() {
          let id = state.conduits.add(link.clone());
          *link.id.lock() = Some(id);
        }
      }
    }
  }
}

impl<S, T, E> Conduit<T, E> for SubjectSubscription<S, T, E>
where
  S: Subscriber<Item = T, Err = E>,
  T: Send,
  E: Send,
{
  fn offer(&self, value: T) {
    let taken = match self.demand.lock().as_mut() {
      Some(demand) => demand.take_one(),
      None => false,
    };
    if !taken {
      return;
    }
    let more = self.downstream.on_next(value);
    if let Some(demand) = self.demand.lock().as_mut() {
      *demand += more;
    }
  }

  fn finish(&self, completion: Completion<E>) {
    if self.demand.lock().take().is_some() {
      self.downstream.on_complete(completion);
    }
  }
}

impl<S, T, E> Subscription for SubjectSubscription<S, T, E>
where
  S: Subscriber<Item = T, Err = E>,
  T: Send,
  E: Send,
{
  fn request(&self, more: Demand) {
    if let Some(demand) = self.demand.lock().as_mut() {
      *demand += more;
    }
  }

  fn cancel(&self) {
    if self.demand.lock().take().is_none() {
      return;
    }
    let id = self.id.lock().take();
    if let (Some(id), Some(core)) = (id, self.core.upgrade()) {
      core.state.lock().conduits.remove(id);
    }
  }
}
