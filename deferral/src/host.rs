//! Composite owners that cascade disposal to registered children.
//!
//! A [`DisposeHost`] collects child disposables over its lifetime and
//! releases all of them, exactly once, when it is disposed itself. Owner
//! types embed a host and delegate to it:
//!
//! ```rust
//! use std::rc::Rc;
//! use deferral::dispose::{from_callback, Dispose, DisposeState};
//! use deferral::errors::CleanupResult;
//! use deferral::host::DisposeHost;
//!
//! struct Session {
//!     host: DisposeHost,
//! }
//!
//! impl Session {
//!     fn open() -> Self {
//!         let host = DisposeHost::new();
//!         host.register(Rc::new(from_callback(|| println!("socket closed")))).unwrap();
//!         Self { host }
//!     }
//! }
//!
//! impl Dispose for Session {
//!     fn dispose(&self) -> CleanupResult {
//!         self.host.dispose()
//!     }
//! }
//!
//! let session = Session::open();
//! session.dispose().unwrap();
//! assert!(session.host.disposed());
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::config::{LateRegistration, LifecycleConfig};
use crate::dispose::{
    assert_not_disposed, dispose_all_if_supported, log_failures, Dispose, DisposeState,
};
use crate::errors::{CleanupResult, DisposedError};
use crate::monitor::global_leak_detector;
use crate::types::{ResourceId, ResourceLabel};

type CleanupHook = Box<dyn FnOnce() -> CleanupResult>;

/// Owner of a dynamic set of child disposables.
///
/// Children are de-duplicated by pointer identity and released in
/// registration order. A failing child never stops the cascade and never
/// surfaces from [`Dispose::dispose`]; failures are logged and discarded.
/// Callers that need the individual errors dispose their own collections
/// with [`dispose_all_if_supported`].
///
/// The optional cleanup hook runs once, after every child, outside any
/// guard. Its error is returned to the caller.
pub struct DisposeHost {
    id: ResourceId,
    label: Option<ResourceLabel>,
    config: LifecycleConfig,
    disposed: Cell<bool>,
    children: RefCell<Vec<Rc<dyn Dispose>>>,
    registered: RefCell<HashSet<*const ()>>,
    cleanup: RefCell<Option<CleanupHook>>,
}

impl DisposeHost {
    /// Create an empty host with default configuration
    pub fn new() -> Self {
        Self::with_config(LifecycleConfig::default())
    }

    /// Create an empty host
    pub fn with_config(config: LifecycleConfig) -> Self {
        let id = ResourceId::new();
        if config.track_leaks {
            global_leak_detector().register_creation(id, "DisposeHost", None);
        }
        Self {
            id,
            label: None,
            config,
            disposed: Cell::new(false),
            children: RefCell::new(Vec::new()),
            registered: RefCell::new(HashSet::new()),
            cleanup: RefCell::new(None),
        }
    }

    /// Name this host in logs and errors
    #[must_use]
    pub fn with_label(mut self, label: ResourceLabel) -> Self {
        if self.config.track_leaks {
            global_leak_detector().set_label(&self.id, &label);
        }
        self.label = Some(label);
        self
    }

    /// Run `hook` once after all children have been released.
    #[must_use]
    pub fn with_cleanup<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() -> CleanupResult + 'static,
    {
        *self.cleanup.get_mut() = Some(Box::new(hook));
        self
    }

    /// Identifier used for leak tracking
    pub const fn id(&self) -> ResourceId {
        self.id
    }

    /// The label, if one was given
    pub const fn label(&self) -> Option<&ResourceLabel> {
        self.label.as_ref()
    }

    /// Number of children waiting to be released
    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    /// Register children for release when this host is disposed.
    ///
    /// Registering a child that is already present is a no-op. After the
    /// host has been disposed the configured [`LateRegistration`] policy
    /// applies; only `Reject` returns an error.
    pub fn register_for_dispose<I>(&self, children: I) -> Result<(), DisposedError>
    where
        I: IntoIterator<Item = Rc<dyn Dispose>>,
    {
        if self.disposed.get() {
            return self.register_late(children.into_iter().collect());
        }

        let mut registered = self.registered.borrow_mut();
        let mut owned = self.children.borrow_mut();
        for child in children {
            if registered.insert(Rc::as_ptr(&child).cast::<()>()) {
                owned.push(child);
            }
        }
        Ok(())
    }

    /// Register a single child
    pub fn register<D: Dispose + 'static>(&self, child: Rc<D>) -> Result<(), DisposedError> {
        let child: Rc<dyn Dispose> = child;
        self.register_for_dispose([child])
    }

    /// Fails with [`DisposedError`] once this host has been disposed.
    pub fn check_not_disposed(&self) -> Result<(), DisposedError> {
        assert_not_disposed(self)
    }

    fn register_late(&self, children: Vec<Rc<dyn Dispose>>) -> Result<(), DisposedError> {
        let resource = self.resource_name();
        match self.config.late_registration {
            LateRegistration::DisposeImmediately => {
                debug!(
                    resource = %resource,
                    children = children.len(),
                    "Disposing children registered after disposal"
                );
                let errors = dispose_all_if_supported(&children);
                log_failures(&resource, &errors, self.config.max_logged_failures.into());
                Ok(())
            }
            LateRegistration::Reject => Err(DisposedError::new(resource)),
            LateRegistration::Ignore => {
                debug!(
                    resource = %resource,
                    children = children.len(),
                    "Ignoring children registered after disposal"
                );
                Ok(())
            }
        }
    }
}

impl Default for DisposeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispose for DisposeHost {
    fn dispose(&self) -> CleanupResult {
        // Flag first: a child that disposes its owner again must find it done.
        if self.disposed.replace(true) {
            return Ok(());
        }

        let children = std::mem::take(&mut *self.children.borrow_mut());
        self.registered.borrow_mut().clear();

        let resource = self.resource_name();
        let errors = dispose_all_if_supported(&children);
        debug!(
            resource = %resource,
            children = children.len(),
            failures = errors.len(),
            "Disposed host"
        );
        log_failures(&resource, &errors, self.config.max_logged_failures.into());
        drop(children);

        if self.config.track_leaks {
            global_leak_detector().register_disposal(&self.id);
        }

        let hook = self.cleanup.borrow_mut().take();
        hook.map_or(Ok(()), |hook| hook())
    }
}

impl DisposeState for DisposeHost {
    fn disposed(&self) -> bool {
        self.disposed.get()
    }

    fn resource_name(&self) -> String {
        self.label
            .as_ref()
            .map_or_else(|| "DisposeHost".to_string(), ToString::to_string)
    }
}

impl Drop for DisposeHost {
    fn drop(&mut self) {
        if self.disposed.get() || !self.config.warn_on_undisposed_drop {
            return;
        }
        let pending = self.children.get_mut().len();
        if pending > 0 {
            warn!(
                resource = %self.resource_name(),
                children = pending,
                "DisposeHost dropped without dispose - children were not released"
            );
        }
    }
}

impl fmt::Debug for DisposeHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposeHost")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("disposed", &self.disposed.get())
            .field("children", &self.children.borrow().len())
            .finish_non_exhaustive()
    }
}
