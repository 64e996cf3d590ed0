// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Live, shared element lists handed out by frames.

use std::cell::RefCell;
use std::rc::Rc;

/// A reference-counted list that observes later mutations of its owner.
///
/// Frames hand out clones of their internal collections; the handle stays
/// valid after the frame changes and always shows the current contents.
pub struct Collection<T: Clone> {
    items: Rc<RefCell<Vec<T>>>,
}

impl<T: Clone> Collection<T> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            items: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// Returns `true` if the collection holds no elements.
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Returns a handle to the element at `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        self.items.borrow().get(index).cloned()
    }

    /// Copies the current contents out, so callers can iterate while the
    /// collection is mutated.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.borrow().clone()
    }

    pub(crate) fn push(&self, item: T) {
        self.items.borrow_mut().push(item);
    }

    /// Removes the first element matching `pred`; returns whether one was found.
    pub(crate) fn remove_first(&self, pred: impl Fn(&T) -> bool) -> bool {
        let mut items = self.items.borrow_mut();
        match items.iter().position(pred) {
            Some(index) => {
                items.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn any(&self, pred: impl Fn(&T) -> bool) -> bool {
        self.items.borrow().iter().any(pred)
    }
}

impl<T: Clone> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            items: Rc::clone(&self.items),
        }
    }
}

impl<T: Clone> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.items.borrow().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_contents() {
        let owner = Collection::new();
        let view = owner.clone();
        owner.push(1);
        owner.push(2);
        assert_eq!(view.len(), 2);
        assert!(owner.remove_first(|v| *v == 1));
        assert_eq!(view.snapshot(), vec![2]);
        assert!(!owner.remove_first(|v| *v == 7));
    }
}
