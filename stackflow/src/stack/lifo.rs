//! Vec-backed LIFO stack.

use serde::{Deserialize, Serialize};

/// An ordered LIFO container.
///
/// Elements are stored bottom-to-top, so iteration with [`Stack::iter`]
/// follows push order and [`Stack::iter_pop_order`] follows pop order.
/// `pop` and `peek` return `None` on an empty stack rather than failing.
///
/// Cloning a stack is the shallow copy: the ordering is independent, and
/// elements that are shared handles (such as `Arc`) keep their identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stack<T> {
    items: Vec<T>,
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Stack<T> {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty stack with room for `capacity` elements.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Pushes an element onto the top of the stack.
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Removes and returns the top element, or `None` if the stack is empty.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Returns the top element without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    /// Returns the number of live elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the stack holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Removes every element.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Places the contents of `top` above the current top.
    ///
    /// The result is the same as pushing every element of `top`, bottom
    /// first, onto this stack.
    pub fn merge_with(&mut self, top: Self) {
        self.items.extend(top.items);
    }

    /// Removes the topmost element matching `predicate`, keeping the
    /// relative order of everything else.
    pub fn sort_delete_by<F>(&mut self, mut predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let position = self.items.iter().rposition(|item| predicate(item))?;
        Some(self.items.remove(position))
    }

    /// Drops the oldest elements until at most `limit` remain.
    ///
    /// Returns the dropped elements, oldest first.
    pub fn retain_newest(&mut self, limit: usize) -> Vec<T> {
        let excess = self.items.len().saturating_sub(limit);
        self.items.drain(..excess).collect()
    }

    /// Iterates from the bottom of the stack to the top.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Iterates in the order elements would be popped.
    pub fn iter_pop_order(&self) -> std::iter::Rev<std::slice::Iter<'_, T>> {
        self.items.iter().rev()
    }

    /// Returns the elements bottom-to-top.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Consumes the stack, returning its elements bottom-to-top.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: Clone> Stack<T> {
    /// Returns a stack whose pop order is this stack's push order.
    #[must_use]
    pub fn reverse_copy(&self) -> Self {
        Self {
            items: self.items.iter().rev().cloned().collect(),
        }
    }
}

impl<T: PartialEq> Stack<T> {
    /// Returns true if an element equal to `item` is present.
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    /// Removes one element equal to `item` from anywhere in the stack.
    ///
    /// The topmost match is removed; the rest keep their relative order.
    pub fn sort_delete(&mut self, item: &T) -> Option<T> {
        self.sort_delete_by(|candidate| candidate == item)
    }

    /// Returns true if both stacks have the same size and pop the same
    /// elements in the same order.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter_pop_order()
                .zip(other.iter_pop_order())
                .all(|(a, b)| a == b)
    }
}

impl<T> From<Vec<T>> for Stack<T> {
    /// Builds a stack from elements listed bottom-to-top.
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

impl<T> FromIterator<T> for Stack<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<T> Extend<T> for Stack<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl<T> IntoIterator for Stack<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    /// Yields elements bottom-to-top.
    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Stack<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
