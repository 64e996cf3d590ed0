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

//! Per-buffer-index bookkeeping for multi-buffered backends.
//!
//! Each slot holds the synchronization object signalled when the frame
//! recorded into that index was submitted, and the resources whose release
//! must wait until the GPU has finished with that frame.
//!
//! ```text
//! flip():  set_fence(submit())   slot i: [fence_i, deletions_i]
//!          advance()             i -> (i + 1) % n
//!          take_fence() + wait   GPU finished frame that last used slot i+1
//!          take_deletions()      release what that frame retired
//! ```

/// A single slot of the ring.
#[derive(Debug)]
struct FrameSlot<F, R> {
    fence: Option<F>,
    deletions: Vec<R>,
}

/// A fixed-size ring of fences and deferred-deletion queues.
#[derive(Debug)]
pub struct FrameRing<F, R> {
    slots: Vec<FrameSlot<F, R>>,
    current_index: usize,
    label: &'static str,
}

impl<F, R> FrameRing<F, R> {
    /// Creates a ring with `count` slots (at least one).
    pub fn new(count: usize, label: &'static str) -> Self {
        let slots = (0..count.max(1))
            .map(|_| FrameSlot {
                fence: None,
                deletions: Vec::new(),
            })
            .collect();
        Self {
            slots,
            current_index: 0,
            label,
        }
    }

    /// Moves to the next slot and returns its index.
    pub fn advance(&mut self) -> usize {
        self.current_index = (self.current_index + 1) % self.slots.len();
        self.current_index
    }

    /// The current slot index.
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; a ring has at least one slot.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Queues a resource for release once the current slot comes round again.
    pub fn defer(&mut self, resource: R) {
        self.slots[self.current_index].deletions.push(resource);
    }

    /// Queues several resources, see [`FrameRing::defer`].
    pub fn defer_all(&mut self, resources: impl IntoIterator<Item = R>) {
        self.slots[self.current_index].deletions.extend(resources);
    }

    /// Stores the fence for the current slot, returning any fence it replaces.
    pub fn set_fence(&mut self, fence: F) -> Option<F> {
        let previous = self.slots[self.current_index].fence.replace(fence);
        if previous.is_some() {
            log::trace!(
                "{} ring: slot {} fence replaced before being waited on",
                self.label,
                self.current_index
            );
        }
        previous
    }

    /// Takes the current slot's fence.
    pub fn take_fence(&mut self) -> Option<F> {
        self.slots[self.current_index].fence.take()
    }

    /// Takes the current slot's deferred deletions.
    pub fn take_deletions(&mut self) -> Vec<R> {
        std::mem::take(&mut self.slots[self.current_index].deletions)
    }

    /// Empties every slot, for teardown.
    pub fn drain(&mut self) -> (Vec<F>, Vec<R>) {
        let mut fences = Vec::new();
        let mut deletions = Vec::new();
        for slot in &mut self.slots {
            fences.extend(slot.fence.take());
            deletions.append(&mut slot.deletions);
        }
        (fences, deletions)
    }
}
