// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cross-thread references to objects that must die on the present thread.
//!
//! Images, pictures and surfaces may hold GPU resources. They can be shared
//! with the host inside a [`GpuObjectGuard`], which releases the object on
//! the present thread when the last clone goes away elsewhere. The
//! [`GpuObjectCollector`] tracks every live guard so shutdown can release
//! all of them while the present thread still exists.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::local_context::LocalContext;
use crate::task_runner::ReleaseQueue;

type CollectedCallback = Box<dyn FnOnce() + Send>;

trait Collectable: Send + Sync {
    fn invalidate(&self);
}

struct GuardCell<T: Send + 'static> {
    object: Mutex<Option<T>>,
    /// The object holds resources of the present thread.
    retained: AtomicBool,
    on_collected: Mutex<Option<CollectedCallback>>,
    releaser: Option<Arc<dyn ReleaseQueue>>,
}

impl<T: Send + 'static> Collectable for GuardCell<T> {
    fn invalidate(&self) {
        self.retained.store(false, Ordering::Release);
        let object = self.object.lock().take();
        drop(object);
        let callback = self.on_collected.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl<T: Send + 'static> Drop for GuardCell<T> {
    fn drop(&mut self) {
        let Some(object) = self.object.get_mut().take() else {
            return;
        };
        if !*self.retained.get_mut() || LocalContext::is_present_thread() {
            return;
        }
        let Some(releaser) = &self.releaser else {
            return;
        };
        if !releaser.post_release(Box::new(move || drop(object))) {
            log::warn!(
                "Released a {} outside the present thread: it is no longer running",
                core::any::type_name::<T>()
            );
        }
    }
}

/// A shared reference to `T` that is released on the present thread.
///
/// Cloning shares the object. When the last clone is dropped the object is
/// dropped in place if it is not retained by the present thread, or if the
/// drop already happens there; otherwise the drop is posted to the present
/// thread's task runner. Once collected, the guard is empty and every
/// accessor returns `None`.
pub struct GpuObjectGuard<T: Send + 'static> {
    cell: Arc<GuardCell<T>>,
}

impl<T: Send + 'static> Clone for GpuObjectGuard<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for GpuObjectGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuObjectGuard")
            .field("type", &core::any::type_name::<T>())
            .field("valid", &self.is_valid())
            .field("retained", &self.is_retained())
            .finish()
    }
}

impl<T: Send + 'static> GpuObjectGuard<T> {
    /// Wraps `object` and registers it with `collector`.
    ///
    /// `releaser` receives the final drop when `retained` is set and the
    /// last clone goes away off the present thread.
    pub fn new(
        object: T,
        retained: bool,
        collector: &GpuObjectCollector,
        releaser: Option<Arc<dyn ReleaseQueue>>,
    ) -> Self {
        let cell = Arc::new(GuardCell {
            object: Mutex::new(Some(object)),
            retained: AtomicBool::new(retained),
            on_collected: Mutex::new(None),
            releaser,
        });
        let weak: Weak<dyn Collectable> = Arc::downgrade(&cell) as Weak<dyn Collectable>;
        collector.register(weak);
        Self { cell }
    }

    /// Wraps `object` using the calling present thread's collector and task
    /// runner.
    ///
    /// Outside a present thread the guard is neither registered nor
    /// retained.
    pub fn for_present_thread(object: T, retained: bool) -> Self {
        match LocalContext::current() {
            Some(context) => {
                let releaser: Arc<dyn ReleaseQueue> = Arc::clone(context.task_runner()) as _;
                Self::new(object, retained, context.collector(), Some(releaser))
            }
            None => Self::unregistered(object),
        }
    }

    /// Wraps an object that holds no present-thread resources.
    pub fn unregistered(object: T) -> Self {
        Self {
            cell: Arc::new(GuardCell {
                object: Mutex::new(Some(object)),
                retained: AtomicBool::new(false),
                on_collected: Mutex::new(None),
                releaser: None,
            }),
        }
    }

    /// Runs `f` with the object unless it was collected.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.cell.object.lock().as_ref().map(f)
    }

    /// Runs `f` with the object mutably unless it was collected.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.cell.object.lock().as_mut().map(f)
    }

    /// Returns `false` once the object was collected.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.cell.object.lock().is_some()
    }

    /// Returns `true` if dropping the object must happen on the present
    /// thread.
    #[must_use]
    pub fn is_retained(&self) -> bool {
        self.cell.retained.load(Ordering::Acquire)
    }

    /// Registers a callback invoked when the collector invalidates this
    /// guard. Replaces any previous callback.
    pub fn set_collected_callback(&self, callback: impl FnOnce() + Send + 'static) {
        *self.cell.on_collected.lock() = Some(Box::new(callback));
    }

    /// Returns `true` if both guards share one object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T: Clone + Send + 'static> GpuObjectGuard<T> {
    /// Clones the object out of the guard.
    #[must_use]
    pub fn cloned(&self) -> Option<T> {
        self.with(T::clone)
    }
}

/// Registry of live guards.
pub struct GpuObjectCollector {
    live: Mutex<Vec<Weak<dyn Collectable>>>,
}

impl fmt::Debug for GpuObjectCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuObjectCollector")
            .field("live", &self.live_count())
            .finish()
    }
}

impl Default for GpuObjectCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuObjectCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: Mutex::new(Vec::new()),
        }
    }

    fn register(&self, guard: Weak<dyn Collectable>) {
        let mut live = self.live.lock();
        live.retain(|guard| guard.strong_count() > 0);
        live.push(guard);
    }

    /// Number of guards still alive.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live
            .lock()
            .iter()
            .filter(|guard| guard.strong_count() > 0)
            .count()
    }

    /// Invalidates every live guard: drops its object in place and runs its
    /// collected callback. Returns the number of guards invalidated.
    ///
    /// Call on the present thread before it exits.
    pub fn collect(&self) -> usize {
        let live: Vec<Arc<dyn Collectable>> = core::mem::take(&mut *self.live.lock())
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for guard in &live {
            guard.invalidate();
        }
        if !live.is_empty() {
            log::debug!("Collected {} GPU objects", live.len());
        }
        live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct DeferredReleases {
        pending: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    }

    impl ReleaseQueue for DeferredReleases {
        fn post_release(&self, release: Box<dyn FnOnce() + Send>) -> bool {
            self.pending.lock().push(release);
            true
        }
    }

    impl DeferredReleases {
        fn run(&self) -> usize {
            let pending = core::mem::take(&mut *self.pending.lock());
            let count = pending.len();
            for release in pending {
                release();
            }
            count
        }
    }

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn setup() -> (GpuObjectCollector, Arc<DeferredReleases>, Arc<AtomicUsize>) {
        (
            GpuObjectCollector::new(),
            Arc::new(DeferredReleases::default()),
            Arc::new(AtomicUsize::new(0)),
        )
    }

    #[test]
    fn retained_object_is_released_through_the_queue() {
        let (collector, releases, drops) = setup();
        let guard = GpuObjectGuard::new(
            DropCounter(Arc::clone(&drops)),
            true,
            &collector,
            Some(Arc::clone(&releases) as Arc<dyn ReleaseQueue>),
        );
        let clone = guard.clone();
        drop(guard);
        assert_eq!(releases.pending.lock().len(), 0, "a clone is still alive");
        drop(clone);
        assert_eq!(drops.load(Ordering::SeqCst), 0, "release is deferred");
        assert_eq!(releases.run(), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unretained_object_is_dropped_in_place() {
        let (collector, releases, drops) = setup();
        let guard = GpuObjectGuard::new(
            DropCounter(Arc::clone(&drops)),
            false,
            &collector,
            Some(Arc::clone(&releases) as Arc<dyn ReleaseQueue>),
        );
        drop(guard);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(releases.run(), 0);
    }

    #[test]
    fn collect_invalidates_and_notifies() {
        let (collector, releases, drops) = setup();
        let notified = Arc::new(AtomicBool::new(false));
        let guard = GpuObjectGuard::new(
            DropCounter(Arc::clone(&drops)),
            true,
            &collector,
            Some(Arc::clone(&releases) as Arc<dyn ReleaseQueue>),
        );
        {
            let notified = Arc::clone(&notified);
            guard.set_collected_callback(move || notified.store(true, Ordering::SeqCst));
        }
        assert_eq!(collector.live_count(), 1);

        assert_eq!(collector.collect(), 1);
        assert!(notified.load(Ordering::SeqCst));
        assert!(!guard.is_valid());
        assert!(!guard.is_retained());
        assert_eq!(guard.with(|_| ()), None);
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        drop(guard);
        assert_eq!(releases.run(), 0, "nothing left to release");
        assert_eq!(collector.live_count(), 0);
    }

    #[test]
    fn dead_guards_are_not_collected() {
        let collector = GpuObjectCollector::new();
        let guard = GpuObjectGuard::new(1_u32, false, &collector, None);
        let kept = GpuObjectGuard::new(2_u32, false, &collector, None);
        drop(guard);
        assert_eq!(collector.live_count(), 1);
        assert_eq!(collector.collect(), 1);
        assert_eq!(kept.cloned(), None);
    }

    #[test]
    fn guard_outside_present_thread_is_unregistered() {
        let guard = GpuObjectGuard::for_present_thread(String::from("picture"), true);
        assert!(!guard.is_retained());
        assert_eq!(guard.cloned().as_deref(), Some("picture"));
        assert_eq!(guard.with_mut(|s| s.push('!')), Some(()));
        assert_eq!(guard.cloned().as_deref(), Some("picture!"));
    }
}
