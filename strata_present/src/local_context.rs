// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-thread singleton of the present thread.

use core::cell::RefCell;
use core::fmt;
use std::collections::VecDeque;
use std::ffi::CStr;
use std::rc::Rc;
use std::sync::Arc;

use strata_vulkan::VulkanContext;

use crate::error::PresentError;
use crate::gpu_guard::GpuObjectCollector;
use crate::link::ThreadLink;
use crate::options::PresentOptions;
use crate::task_runner::TaskRunner;

thread_local! {
    static CURRENT: RefCell<Option<Rc<LocalContext>>> = const { RefCell::new(None) };
}

type IdleCallback = Box<dyn FnOnce()>;

/// What the present thread knows about itself.
///
/// Installed when the present thread starts and removed when it terminates,
/// so [`LocalContext::current`] doubles as the "am I on the present thread"
/// test.
pub struct LocalContext {
    link: Arc<ThreadLink>,
    options: Arc<PresentOptions>,
    task_runner: Arc<TaskRunner>,
    idle: RefCell<VecDeque<IdleCallback>>,
    vulkan: RefCell<Option<Arc<VulkanContext>>>,
}

impl fmt::Debug for LocalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalContext")
            .field("link", &self.link)
            .field("idle", &self.idle.borrow().len())
            .field("vulkan", &self.vulkan.borrow().is_some())
            .finish_non_exhaustive()
    }
}

impl LocalContext {
    /// Installs a context for the calling thread and returns it.
    pub(crate) fn install(link: Arc<ThreadLink>, options: Arc<PresentOptions>) -> Rc<Self> {
        let task_runner = TaskRunner::new(&link);
        link.set_task_runner(&task_runner);
        let context = Rc::new(Self {
            link,
            options,
            task_runner,
            idle: RefCell::new(VecDeque::new()),
            vulkan: RefCell::new(None),
        });
        CURRENT.with(|current| {
            if current.borrow_mut().replace(Rc::clone(&context)).is_some() {
                log::warn!("Replaced the local context of {:?}", std::thread::current().name());
            }
        });
        context
    }

    /// Removes the calling thread's context.
    pub(crate) fn uninstall() -> Option<Rc<Self>> {
        CURRENT.with(|current| current.borrow_mut().take())
    }

    /// The context of the calling thread, if it is a present thread.
    #[must_use]
    pub fn current() -> Option<Rc<Self>> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Runs `f` with the calling thread's context.
    pub fn with<R>(f: impl FnOnce(&Self) -> R) -> Option<R> {
        Self::current().map(|context| f(&context))
    }

    /// Returns `true` on a thread running a present loop.
    #[must_use]
    pub fn is_present_thread() -> bool {
        CURRENT.with(|current| current.borrow().is_some())
    }

    /// Queues `callback` for the next idle pass of the present loop.
    pub fn post_idle(&self, callback: impl FnOnce() + 'static) {
        self.idle.borrow_mut().push_back(Box::new(callback));
    }

    /// Runs idle callbacks until none are left, including ones posted by the
    /// callbacks themselves. Returns how many ran.
    pub fn run_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let Some(callback) = self.idle.borrow_mut().pop_front() else {
                return ran;
            };
            callback();
            ran += 1;
        }
    }

    /// Returns `true` if idle callbacks are waiting.
    #[must_use]
    pub fn has_idle_work(&self) -> bool {
        !self.idle.borrow().is_empty()
    }

    /// The queues of this thread pair.
    #[must_use]
    pub fn link(&self) -> &Arc<ThreadLink> {
        &self.link
    }

    /// Live GPU object guards.
    #[must_use]
    pub fn collector(&self) -> &GpuObjectCollector {
        self.link.collector()
    }

    /// The built-in task runner.
    #[must_use]
    pub fn task_runner(&self) -> &Arc<TaskRunner> {
        &self.task_runner
    }

    /// Options the present thread was started with.
    #[must_use]
    pub fn options(&self) -> &PresentOptions {
        &self.options
    }

    /// The Vulkan instance shared by every surface of this thread.
    ///
    /// Created on first use with `surface_extensions` added to the configured
    /// instance extensions; later callers get the same instance.
    pub fn vulkan_context(
        &self,
        surface_extensions: &[&CStr],
    ) -> Result<Arc<VulkanContext>, PresentError> {
        if let Some(context) = self.vulkan.borrow().as_ref() {
            let missing = surface_extensions
                .iter()
                .any(|ext| !context_has_instance_extension(&self.options, ext));
            if missing {
                log::warn!(
                    "Vulkan instance already exists; surface extensions {surface_extensions:?} were not requested at creation"
                );
            }
            return Ok(Arc::clone(context));
        }
        let options = self.options.context_options(surface_extensions);
        let context = VulkanContext::new(&options)?;
        log::info!("Created Vulkan context on {}", context.device_name());
        *self.vulkan.borrow_mut() = Some(Arc::clone(&context));
        Ok(context)
    }

    /// Drops the shared Vulkan instance. Devices keep it alive until they
    /// are destroyed.
    pub(crate) fn release_vulkan_context(&self) {
        self.vulkan.borrow_mut().take();
    }
}

fn context_has_instance_extension(options: &PresentOptions, extension: &CStr) -> bool {
    let Ok(name) = extension.to_str() else {
        return false;
    };
    options.instance_extensions.iter().any(|e| e == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn install() -> Rc<LocalContext> {
        LocalContext::install(ThreadLink::new(None), Arc::new(PresentOptions::default()))
    }

    #[test]
    fn install_marks_the_thread() {
        assert!(!LocalContext::is_present_thread());
        let _context = install();
        assert!(LocalContext::is_present_thread());
        assert!(LocalContext::uninstall().is_some());
        assert!(!LocalContext::is_present_thread());
    }

    #[test]
    fn idle_callbacks_run_in_order_including_nested_posts() {
        let context = install();
        let order = Rc::new(RefCell::new(Vec::new()));
        {
            let order = Rc::clone(&order);
            let inner = Rc::clone(&context);
            context.post_idle(move || {
                order.borrow_mut().push(1);
                let order = Rc::clone(&order);
                inner.post_idle(move || order.borrow_mut().push(3));
            });
        }
        {
            let order = Rc::clone(&order);
            context.post_idle(move || order.borrow_mut().push(2));
        }
        assert!(context.has_idle_work());
        assert_eq!(context.run_idle(), 3);
        assert_eq!(*order.borrow(), [1, 2, 3]);
        assert!(!context.has_idle_work());
        LocalContext::uninstall();
    }

    #[test]
    fn with_is_none_off_the_present_thread() {
        let hits = Cell::new(0);
        assert!(LocalContext::with(|_| hits.set(1)).is_none());
        assert_eq!(hits.get(), 0);
    }
}
