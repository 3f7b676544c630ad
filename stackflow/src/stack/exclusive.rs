//! Stack holding each element at most once.

use super::Stack;
use std::ops::Deref;

/// A stack in which no two elements compare equal.
///
/// Pushing an element that is already present removes the old occurrence
/// first, so the element moves to the top and the size is unchanged.
/// Read-only [`Stack`] operations are available through `Deref`; every
/// mutation goes through this type so uniqueness cannot be bypassed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusiveStack<T> {
    inner: Stack<T>,
}

impl<T> Default for ExclusiveStack<T> {
    fn default() -> Self {
        Self {
            inner: Stack::new(),
        }
    }
}

impl<T: PartialEq> ExclusiveStack<T> {
    /// Creates an empty exclusive stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `item`, first removing any element equal to it.
    ///
    /// Returns true if an existing element was repositioned.
    pub fn push(&mut self, item: T) -> bool {
        let displaced = self.inner.sort_delete(&item).is_some();
        self.inner.push(item);
        displaced
    }

    /// Removes and returns the top element.
    pub fn pop(&mut self) -> Option<T> {
        self.inner.pop()
    }

    /// Removes the element equal to `item`, keeping the order of the rest.
    pub fn sort_delete(&mut self, item: &T) -> Option<T> {
        self.inner.sort_delete(item)
    }

    /// Removes the element matching `predicate`, keeping the order of the rest.
    pub fn sort_delete_by<F>(&mut self, predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        self.inner.sort_delete_by(predicate)
    }

    /// Pushes every element of `top`, bottom first.
    pub fn merge_with(&mut self, top: Stack<T>) {
        for item in top {
            self.push(item);
        }
    }

    /// Removes every element.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl<T> Deref for ExclusiveStack<T> {
    type Target = Stack<T>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T: PartialEq> FromIterator<T> for ExclusiveStack<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut stack = Self::new();
        for item in iter {
            stack.push(item);
        }
        stack
    }
}

impl<T: PartialEq> From<Stack<T>> for ExclusiveStack<T> {
    fn from(stack: Stack<T>) -> Self {
        stack.into_iter().collect()
    }
}
