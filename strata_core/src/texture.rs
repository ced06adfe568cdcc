// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Textures referenced by id from texture layers.
//!
//! A [`TextureManager`] owns textures created through its [`TextureFactory`].
//! Texture layers hold only a [`TextureId`]; painting acquires the texture for
//! the duration of the draw, and a texture cannot be deleted while acquired.

use core::fmt;
use core::ops::Deref;
use core::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tiny_skia::Pixmap;

use crate::geometry::ISize;
use crate::image::Image;
use crate::trace::{
    ResourceTracer, Trackable, TrackableDevice, TrackableOwnership, TrackableType, TracedResource,
};

/// Identifier of a texture registered in a [`TextureManager`].
pub type TextureId = i64;

static NEXT_TEXTURE_ID: AtomicI64 = AtomicI64::new(1);

/// A drawable texture.
#[derive(Clone, Debug)]
pub struct Texture {
    id: TextureId,
    image: Image,
    hw_compose: bool,
}

impl Texture {
    fn new(image: Image, hw_compose: bool) -> Self {
        Self {
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            image,
            hw_compose,
        }
    }

    /// Unique id, also used as the key in the manager.
    #[must_use]
    pub fn id(&self) -> TextureId {
        self.id
    }

    /// The pixels to draw.
    #[must_use]
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Dimensions in pixels.
    #[must_use]
    pub fn size(&self) -> ISize {
        self.image.size()
    }

    /// Returns `true` if the texture lives in the hardware-compose device.
    #[must_use]
    pub fn is_hw_compose_texture(&self) -> bool {
        self.hw_compose
    }
}

impl Trackable for Texture {
    fn trace(&self, tracer: &mut dyn ResourceTracer) {
        let device = if self.hw_compose {
            TrackableDevice::Gpu
        } else {
            TrackableDevice::Cpu
        };
        tracer.trace_resource(TracedResource {
            annotation: "Texture pixels",
            kind: TrackableType::Texture,
            device,
            ownership: TrackableOwnership::Shared,
            id: self.image.unique_id(),
            size: Some(self.image.byte_size()),
        });
    }
}

/// Creates textures suitable for the render target in use.
#[derive(Clone, Copy, Debug)]
pub struct TextureFactory {
    hw_compose: bool,
}

impl TextureFactory {
    /// Factory for raster targets, or for hardware-compose targets when
    /// `hw_compose` is set.
    #[must_use]
    pub fn new(hw_compose: bool) -> Self {
        Self { hw_compose }
    }

    /// Returns `true` if created textures belong to a GPU device.
    #[must_use]
    pub fn is_hw_compose(&self) -> bool {
        self.hw_compose
    }

    /// Creates a texture from pixels.
    #[must_use]
    pub fn make_from_pixmap(&self, pixmap: Pixmap) -> Texture {
        let image = if self.hw_compose {
            Image::texture_backed(pixmap)
        } else {
            Image::from_pixmap(pixmap)
        };
        Texture::new(image, self.hw_compose)
    }

    /// Creates a texture from an existing image.
    #[must_use]
    pub fn make_from_image(&self, image: &Image) -> Texture {
        if image.is_texture_backed() == self.hw_compose {
            Texture::new(image.clone(), self.hw_compose)
        } else {
            self.make_from_pixmap(image.pixmap().clone())
        }
    }
}

/// Called once when a texture is deleted.
pub type DeletionCallback = Box<dyn FnOnce(TextureId) + Send>;

struct TextureEntry {
    texture: Arc<Texture>,
    acquired_count: u32,
    annotation: String,
    deletion_callbacks: Vec<DeletionCallback>,
}

/// Registry of textures shared between the host and the present thread.
pub struct TextureManager {
    factory: TextureFactory,
    entries: Mutex<HashMap<TextureId, TextureEntry>>,
}

impl fmt::Debug for TextureManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureManager")
            .field("factory", &self.factory)
            .field("textures", &self.entries.lock().len())
            .finish()
    }
}

impl TextureManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new(factory: TextureFactory) -> Self {
        Self {
            factory,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The factory textures are created with.
    #[must_use]
    pub fn factory(&self) -> &TextureFactory {
        &self.factory
    }

    /// Creates and registers a texture. Returns `None` if `make` fails.
    pub fn create(
        &self,
        make: impl FnOnce(&TextureFactory) -> Option<Texture>,
        annotation: &str,
    ) -> Option<TextureId> {
        let texture = make(&self.factory)?;
        let id = texture.id();
        log::debug!("Created texture \"{annotation}\", id={id}");
        self.entries.lock().insert(
            id,
            TextureEntry {
                texture: Arc::new(texture),
                acquired_count: 0,
                annotation: annotation.to_owned(),
                deletion_callbacks: Vec::new(),
            },
        );
        Some(id)
    }

    /// Deletes a texture. Refused (returns `false`) for unknown ids and for
    /// textures that are currently acquired.
    pub fn delete(&self, id: TextureId) -> bool {
        let entry = {
            let mut entries = self.entries.lock();
            let Some(acquired) = entries.get(&id).map(|e| e.acquired_count) else {
                log::warn!("Try deleting texture object id={id}, which refers to an invalid texture");
                return false;
            };
            if acquired > 0 {
                log::warn!("Try deleting an acquired texture object id={id}, refused");
                return false;
            }
            entries.remove(&id)
        };
        if let Some(entry) = entry {
            for callback in entry.deletion_callbacks {
                callback(id);
            }
        }
        true
    }

    /// Registers a callback run when texture `id` is deleted. Returns
    /// `false` for unknown ids.
    pub fn subscribe_deletion(&self, id: TextureId, callback: DeletionCallback) -> bool {
        match self.entries.lock().get_mut(&id) {
            Some(entry) => {
                entry.deletion_callbacks.push(callback);
                true
            }
            None => false,
        }
    }

    /// Acquires a texture for drawing. The texture stays acquired until the
    /// returned guard is dropped.
    pub fn acquire(&self, id: TextureId) -> Option<ScopedTextureAcquire<'_>> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&id) else {
            log::warn!("Try acquiring an invalid texture object id={id}");
            return None;
        };
        entry.acquired_count += 1;
        Some(ScopedTextureAcquire {
            manager: self,
            texture: entry.texture.clone(),
        })
    }

    fn release(&self, id: TextureId) {
        let mut entries = self.entries.lock();
        match entries.get_mut(&id) {
            Some(entry) if entry.acquired_count > 0 => entry.acquired_count -= 1,
            Some(_) => log::warn!("Try releasing a not acquired texture object id={id}, refused"),
            None => log::warn!("Try releasing an invalid texture object id={id}"),
        }
    }

    /// Number of registered textures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if no texture is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for TextureManager {
    fn drop(&mut self) {
        for (id, entry) in self.entries.get_mut().drain() {
            for callback in entry.deletion_callbacks {
                callback(id);
            }
        }
    }
}

impl Trackable for TextureManager {
    fn trace(&self, tracer: &mut dyn ResourceTracer) {
        let textures: Vec<(String, Arc<Texture>)> = self
            .entries
            .lock()
            .values()
            .map(|e| (e.annotation.clone(), e.texture.clone()))
            .collect();
        for (index, (annotation, texture)) in textures.iter().enumerate() {
            tracer.trace_member(&format!("Texture#{index} [{annotation}]"), &**texture);
        }
    }
}

/// A texture held acquired for drawing.
pub struct ScopedTextureAcquire<'a> {
    manager: &'a TextureManager,
    texture: Arc<Texture>,
}

impl fmt::Debug for ScopedTextureAcquire<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopedTextureAcquire")
            .field(&self.texture.id())
            .finish()
    }
}

impl Deref for ScopedTextureAcquire<'_> {
    type Target = Texture;

    fn deref(&self) -> &Texture {
        &self.texture
    }
}

impl Drop for ScopedTextureAcquire<'_> {
    fn drop(&mut self) {
        self.manager.release(self.texture.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn manager() -> TextureManager {
        TextureManager::new(TextureFactory::new(false))
    }

    fn pixels() -> Pixmap {
        Pixmap::new(4, 4).unwrap()
    }

    #[test]
    fn acquired_texture_cannot_be_deleted() {
        let tm = manager();
        let id = tm.create(|f| Some(f.make_from_pixmap(pixels())), "test").unwrap();
        let guard = tm.acquire(id).unwrap();
        assert_eq!(guard.size(), ISize::new(4, 4));
        assert!(!tm.delete(id), "delete must be refused while acquired");
        drop(guard);
        assert!(tm.delete(id));
        assert!(tm.acquire(id).is_none());
    }

    #[test]
    fn failed_factory_registers_nothing() {
        let tm = manager();
        assert!(tm.create(|_| None, "nothing").is_none());
        assert!(tm.is_empty());
    }

    #[test]
    fn deletion_callbacks_run_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tm = manager();
        let id = tm.create(|f| Some(f.make_from_pixmap(pixels())), "cb").unwrap();
        let c = calls.clone();
        assert!(tm.subscribe_deletion(
            id,
            Box::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
        ));
        assert!(tm.delete(id));
        assert!(!tm.delete(id));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_manager_runs_callbacks() {
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let tm = manager();
            let id = tm.create(|f| Some(f.make_from_pixmap(pixels())), "drop").unwrap();
            let c = calls.clone();
            tm.subscribe_deletion(
                id,
                Box::new(move |_| {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hw_compose_factory_marks_textures() {
        let f = TextureFactory::new(true);
        let t = f.make_from_pixmap(pixels());
        assert!(t.is_hw_compose_texture());
        assert!(t.image().is_texture_backed());
    }
}
