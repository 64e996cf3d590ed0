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

//! Object identity, names, application data and destroy notifications.
//!
//! Every scene object embeds an [`ObjectCore`] as the **first** field of its
//! shared storage. Rust drops fields in declaration order, so the destroy
//! callbacks registered on the core run before any other part of the object is
//! released.

use crate::status::{RmError, RmResult};
use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique identifier for a scene object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl ObjectId {
    fn next() -> Self {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identifies a registered destroy callback so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackToken(u64);

/// A function run once when the owning object is destroyed.
pub type DestroyCallback = Box<dyn FnOnce(ObjectId)>;

/// State shared by every scene object.
pub struct ObjectCore {
    id: ObjectId,
    name: RefCell<Option<String>>,
    app_data: Cell<usize>,
    callbacks: RefCell<Vec<(CallbackToken, DestroyCallback)>>,
    next_token: Cell<u64>,
}

impl ObjectCore {
    /// Creates a core with a fresh id.
    pub fn new() -> Self {
        Self {
            id: ObjectId::next(),
            name: RefCell::new(None),
            app_data: Cell::new(0),
            callbacks: RefCell::new(Vec::new()),
            next_token: Cell::new(0),
        }
    }

    /// Copies the name and application data of another object, keeping a fresh id.
    pub fn clone_metadata(&self) -> Self {
        let core = Self::new();
        core.name.replace(self.name.borrow().clone());
        core.app_data.set(self.app_data.get());
        core
    }

    /// Returns the object id.
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Number of destroy callbacks currently registered.
    pub fn callback_count(&self) -> usize {
        self.callbacks.borrow().len()
    }
}

impl Default for ObjectCore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObjectCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCore")
            .field("id", &self.id)
            .field("name", &self.name.borrow())
            .field("callbacks", &self.callbacks.borrow().len())
            .finish()
    }
}

impl Drop for ObjectCore {
    fn drop(&mut self) {
        let callbacks = std::mem::take(self.callbacks.get_mut());
        if !callbacks.is_empty() {
            log::trace!(
                "Object {:?} destroyed, running {} callback(s)",
                self.id,
                callbacks.len()
            );
        }
        for (_, callback) in callbacks {
            callback(self.id);
        }
    }
}

/// Implemented by every scene object to expose its [`ObjectCore`].
pub trait Object {
    /// Returns the shared object state.
    fn core(&self) -> &ObjectCore;

    /// Returns the object id.
    fn id(&self) -> ObjectId {
        self.core().id()
    }

    /// Stores an opaque application value on the object.
    fn set_app_data(&self, data: usize) {
        self.core().app_data.set(data);
    }

    /// Returns the application value last stored with [`Object::set_app_data`].
    fn app_data(&self) -> usize {
        self.core().app_data.get()
    }
}

/// Objects that carry a user-visible name.
pub trait Nameable {
    /// Sets or clears the name.
    fn set_name(&self, name: Option<&str>);
    /// Returns the name, if any.
    fn name(&self) -> Option<String>;
}

impl<T: Object + ?Sized> Nameable for T {
    fn set_name(&self, name: Option<&str>) {
        self.core().name.replace(name.map(str::to_owned));
    }

    fn name(&self) -> Option<String> {
        self.core().name.borrow().clone()
    }
}

/// Objects that notify observers when their last reference goes away.
pub trait Destroyable {
    /// Registers a callback that runs once, just before the object is freed.
    fn add_destroy_callback(&self, callback: DestroyCallback) -> CallbackToken;
    /// Removes a previously registered callback.
    fn delete_destroy_callback(&self, token: CallbackToken) -> RmResult<()>;
}

impl<T: Object + ?Sized> Destroyable for T {
    fn add_destroy_callback(&self, callback: DestroyCallback) -> CallbackToken {
        let core = self.core();
        let token = CallbackToken(core.next_token.get());
        core.next_token.set(token.0 + 1);
        core.callbacks.borrow_mut().push((token, callback));
        token
    }

    fn delete_destroy_callback(&self, token: CallbackToken) -> RmResult<()> {
        let mut callbacks = self.core().callbacks.borrow_mut();
        let index = callbacks
            .iter()
            .position(|(t, _)| *t == token)
            .ok_or(RmError::NotFound)?;
        let removed = callbacks.remove(index);
        drop(callbacks);
        drop(removed);
        Ok(())
    }
}
