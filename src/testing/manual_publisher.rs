use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use parking_lot::Mutex;

use crate::{
  demand::Demand,
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Completion, Subscriber},
  subscription::Subscription,
};

/// Hand-driven single-subscriber source.
///
/// It records the demand it was granted and how often it was cancelled, but
/// delivers whatever the test sends regardless of either.
pub struct ManualPublisher<T, E> {
  core: Arc<ManualCore<T, E>>,
}

struct ManualCore<T, E> {
  downstream: Mutex<Option<BoxedSubscriber<T, E>>>,
  requested: Mutex<Demand>,
  cancellations: AtomicUsize,
}

struct ManualSubscription<T, E>(Arc<ManualCore<T, E>>);

impl<T, E> Clone for ManualPublisher<T, E> {
  fn clone(&self) -> Self { ManualPublisher { core: self.core.clone() } }
}

impl<T, E> Default for ManualPublisher<T, E> {
  fn default() -> Self { Self::new() }
}

impl<T, E> ManualPublisher<T, E> {
  pub fn new() -> Self {
    ManualPublisher {
      core: Arc::new(ManualCore {
        downstream: Mutex::new(None),
        requested: Mutex::new(Demand::NONE),
        cancellations: AtomicUsize::new(0),
      }),
    }
  }

  /// Total demand granted so far, including demand returned from `on_next`.
  pub fn requested(&self) -> Demand { *self.core.requested.lock() }

  pub fn is_cancelled(&self) -> bool { self.cancellations() > 0 }

  pub fn cancellations(&self) -> usize { self.core.cancellations.load(Ordering::SeqCst) }

  /// Pushes `value` to the subscriber and returns the demand it handed back.
  pub fn send(&self, value: T) -> Demand {
    let downstream = self.core.downstream.lock().clone();
    match downstream {
      Some(downstream) => {
        let more = downstream.on_next(value);
        *self.core.requested.lock() += more;
        more
      }
      None => Demand::NONE,
    }
  }

  pub fn complete(&self, completion: Completion<E>) {
    let downstream = self.core.downstream.lock().clone();
    if let Some(downstream) = downstream {
      downstream.on_complete(completion);
    }
  }
}

impl<T, E> Publisher for ManualPublisher<T, E>
where
  T: 'static,
  E: 'static,
{
  type Item = T;
  type Err = E;

  fn subscribe<S>(self, subscriber: S)
  where
    S: Subscriber<Item = T, Err = E> + 'static,
  {
    let subscriber: BoxedSubscriber<T, E> = Arc::new(subscriber);
    *self.core.downstream.lock() = Some(subscriber.clone());
    subscriber.on_subscribe(Arc::new(ManualSubscription(self.core.clone())));
  }
}

impl<T: 'static, E: 'static> Subscription for ManualSubscription<T, E> {
  fn request(&self, demand: Demand) { *self.0.requested.lock() += demand; }

  fn cancel(&self) { self.0.cancellations.fetch_add(1, Ordering::SeqCst); }
}
