use smallvec::SmallVec;

/// Entries keyed by a monotonically increasing ID, kept in insertion order.
///
/// Used wherever an operator tracks a changing set of links: the inner
/// publishers of `flat_map` (iterated in registration order when draining) and
/// the subscribers of a subject.
///
/// - **SmallVec Optimization**: Uses `SmallVec<[_; 2]>` to avoid heap
///   allocation for the common case of 0-2 entries.
///
/// # Examples
///
/// ```rust
/// use rxflow::subscription::DynamicSubscriptions;
///
/// let mut subs: DynamicSubscriptions<&str> = DynamicSubscriptions::default();
///
/// let a = subs.add("a");
/// let b = subs.add("b");
/// assert_eq!(subs.iter().copied().collect::<Vec<_>>(), ["a", "b"]);
///
/// assert_eq!(subs.remove(a), Some("a"));
/// assert_eq!(subs.get(b), Some(&"b"));
/// assert_eq!(subs.len(), 1);
/// ```
pub struct DynamicSubscriptions<U> {
  next_id: usize,
  items: SmallVec<[(usize, U); 2]>,
}

impl<U> Default for DynamicSubscriptions<U> {
  fn default() -> Self { Self { next_id: 0, items: SmallVec::new() } }
}

impl<U> DynamicSubscriptions<U> {
  /// Create an empty container.
  #[inline]
  pub fn new() -> Self { Self::default() }

  /// Add an entry and return its unique ID.
  #[inline]
  pub fn add(&mut self, item: U) -> usize {
    let id = self.next_id;
    self.next_id += 1;
    self.items.push((id, item));
    id
  }

  /// Remove an entry by ID.
  pub fn remove(&mut self, id: usize) -> Option<U> {
    self
      .items
      .iter()
      .position(|(i, _)| *i == id)
      .map(|pos| self.items.remove(pos).1)
  }

  #[inline]
  pub fn get(&self, id: usize) -> Option<&U> {
    self.items.iter().find(|(i, _)| *i == id).map(|(_, item)| item)
  }

  #[inline]
  pub fn get_mut(&mut self, id: usize) -> Option<&mut U> {
    self.items.iter_mut().find(|(i, _)| *i == id).map(|(_, item)| item)
  }

  /// The first entry, in insertion order, matching `pred`.
  pub fn find_mut<P>(&mut self, mut pred: P) -> Option<(usize, &mut U)>
  where
    P: FnMut(&U) -> bool,
  {
    self
      .items
      .iter_mut()
      .find(|(_, item)| pred(item))
      .map(|(id, item)| (*id, item))
  }

  /// Keep only the entries for which `keep` returns `true`.
  pub fn retain<P>(&mut self, mut keep: P)
  where
    P: FnMut(&mut U) -> bool,
  {
    self.items.retain(|(_, item)| keep(item));
  }

  #[inline]
  pub fn len(&self) -> usize { self.items.len() }

  #[inline]
  pub fn is_empty(&self) -> bool { self.items.is_empty() }

  /// Drain all entries.
  #[inline]
  pub fn drain(&mut self) -> impl Iterator<Item = U> + '_ {
    self.items.drain(..).map(|(_, item)| item)
  }

  #[inline]
  pub fn iter(&self) -> impl Iterator<Item = &U> { self.items.iter().map(|(_, item)| item) }

  #[inline]
  pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut U> {
    self.items.iter_mut().map(|(_, item)| item)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[rxflow_macro::test]
  fn ids_keep_insertion_order() {
    let mut subs = DynamicSubscriptions::new();
    let a = subs.add('a');
    let b = subs.add('b');
    let c = subs.add('c');
    assert!(a < b && b < c);

    subs.remove(b);
    let d = subs.add('d');
    assert!(d > c);
    assert_eq!(subs.iter().copied().collect::<String>(), "acd");

    let (id, item) = subs.find_mut(|v| *v > 'b').unwrap();
    assert_eq!((id, *item), (c, 'c'));
    *subs.get_mut(a).unwrap() = 'z';
    assert_eq!(subs.get(a), Some(&'z'));
    subs.retain(|v| *v != 'd');
    assert_eq!(subs.len(), 2);
    assert_eq!(subs.drain().count(), 2);
    assert!(subs.is_empty());
  }
}
