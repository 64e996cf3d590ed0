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

//! Textures: a pixel surface plus the version counter caches key on.

use super::surface::Surface;
use crate::math::Rgba8;
use crate::object::{Object, ObjectCore};
use crate::status::RmResult;
use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

struct TextureInner {
    core: ObjectCore,
    surface: RefCell<Surface>,
    version: Cell<u32>,
}

/// A shared texture handle. Clones refer to the same texture.
#[derive(Clone)]
pub struct Texture(Rc<TextureInner>);

impl Texture {
    /// Creates a texture backed by `surface`.
    pub fn new(surface: Surface) -> Self {
        Texture(Rc::new(TextureInner {
            core: ObjectCore::new(),
            surface: RefCell::new(surface),
            version: Cell::new(0),
        }))
    }

    /// Read access to the backing surface.
    pub fn surface(&self) -> Ref<'_, Surface> {
        self.0.surface.borrow()
    }

    /// The current content version. Bumped on every pixel or palette change.
    pub fn version(&self) -> u32 {
        self.0.version.get()
    }

    /// Signals that the pixels or the palette changed behind the texture's back.
    pub fn changed(&self, _pixels: bool, _palette: bool) {
        self.bump();
    }

    /// Mutates the pixels in place and bumps the version.
    pub fn update_surface<R>(&self, f: impl FnOnce(&mut Surface) -> R) -> R {
        let out = f(&mut self.0.surface.borrow_mut());
        self.bump();
        out
    }

    /// Replaces the backing surface.
    pub fn replace_surface(&self, surface: Surface) {
        self.0.surface.replace(surface);
        self.bump();
    }

    /// Updates palette entries of an indexed texture.
    pub fn set_palette(&self, first: usize, entries: &[Rgba8]) -> RmResult<()> {
        self.0.surface.borrow_mut().set_palette(first, entries)?;
        self.bump();
        Ok(())
    }

    /// Number of live handles to this texture.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    fn bump(&self) {
        self.0.version.set(self.0.version.get().wrapping_add(1));
    }
}

impl Object for Texture {
    fn core(&self) -> &ObjectCore {
        &self.0.core
    }
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.surface();
        f.debug_struct("Texture")
            .field("id", &self.id())
            .field("size", &(s.width(), s.height()))
            .field("version", &self.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Destroyable;

    #[test]
    fn test_changes_bump_version() {
        let t = Texture::new(Surface::new_rgba(2, 2));
        let v0 = t.version();
        t.changed(true, false);
        assert_eq!(t.version(), v0 + 1);
        t.update_surface(|s| s.put_pixel(0, 0, Rgba8::WHITE));
        assert_eq!(t.version(), v0 + 2);
        assert_eq!(t.surface().pixel(0, 0), Rgba8::WHITE);
    }

    #[test]
    fn test_palette_update_on_rgba_fails_without_bump() {
        let t = Texture::new(Surface::new_rgba(1, 1));
        let v0 = t.version();
        assert!(t.set_palette(0, &[Rgba8::WHITE]).is_err());
        assert_eq!(t.version(), v0);
    }

    #[test]
    fn test_destroy_fires_on_last_clone() {
        let fired = Rc::new(Cell::new(false));
        let t = Texture::new(Surface::new_rgba(1, 1));
        let flag = fired.clone();
        t.add_destroy_callback(Box::new(move |_| flag.set(true)));
        let other = t.clone();
        drop(t);
        assert!(!fired.get());
        drop(other);
        assert!(fired.get());
    }
}
