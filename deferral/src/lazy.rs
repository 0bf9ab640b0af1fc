//! Deferred construction handles.
//!
//! A [`Lazy`] wraps a factory and postpones running it until the value is
//! genuinely used. Before that, [`Lazy::get`] hands out a [`Placeholder`]:
//! a forwarding reference that answers type checks from a [`TypeHint`]
//! without building, and builds on first real access.
//!
//! ```rust
//! use deferral::lazy::Lazy;
//!
//! #[derive(Default)]
//! struct Counter { count: u32 }
//!
//! let lazy = Lazy::new(Counter::default);
//! let counter = lazy.get().unwrap();
//! assert!(!lazy.has());
//!
//! counter.with_mut(|c| c.count += 1).unwrap();
//! assert!(lazy.has());
//! assert_eq!(counter.with(|c| c.count).unwrap(), 1);
//! ```
//!
//! A failing factory is never retried. The failure is cached and every later
//! access returns the same [`ConstructionError`].

use std::any::{type_name, Any};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::config::LifecycleConfig;
use crate::dispose::{dispose_if_supported, guarded, short_type_name, AsDispose, Dispose, DisposeState};
use crate::errors::{
    BoxError, CleanupError, CleanupResult, ConstructionError, DisposedError, LazyError, LazyResult,
};
use crate::monitor::global_leak_detector;
use crate::types::{ResourceId, ResourceLabel, TypeHint};

type Factory<T> = Box<dyn FnOnce() -> Result<T, BoxError>>;
type Release<T> = fn(&T) -> Option<CleanupError>;

/// Lifecycle state of a deferred handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LazyState {
    /// Nothing has touched the handle yet
    Unresolved,
    /// A placeholder was handed out but the value is not built
    Placeholder,
    /// The factory succeeded; the value is cached
    Resolved,
    /// The factory failed; the failure is cached
    Faulted,
    /// The handle was disposed. Terminal.
    Disposed,
}

struct Inner<T: 'static> {
    id: ResourceId,
    label: RefCell<Option<ResourceLabel>>,
    tracked: Cell<bool>,
    warn_on_drop: Cell<bool>,
    release: Option<Release<T>>,
    state: Cell<LazyState>,
    factory: Cell<Option<Factory<T>>>,
    hint: Cell<Option<TypeHint>>,
    value: RefCell<Option<T>>,
    fault: RefCell<Option<ConstructionError>>,
}

impl<T: 'static> Inner<T> {
    fn resource_name(&self) -> String {
        self.label.borrow().as_ref().map_or_else(
            || short_type_name(type_name::<Lazy<T>>()),
            ToString::to_string,
        )
    }

    fn disposed_error(&self) -> LazyError {
        DisposedError::new(self.resource_name()).into()
    }

    fn cached_fault(&self) -> LazyError {
        self.fault.borrow().clone().map_or_else(
            || self.disposed_error(),
            LazyError::Faulted,
        )
    }

    fn build(&self) -> LazyResult<bool> {
        match self.state.get() {
            LazyState::Disposed => {
                self.release_value();
                return Err(self.disposed_error());
            }
            LazyState::Faulted => return Err(self.cached_fault()),
            LazyState::Resolved => return Ok(false),
            LazyState::Unresolved | LazyState::Placeholder => {}
        }

        // The factory is taken out before it runs, so it is dropped along
        // with everything it captured as soon as it returns.
        let Some(factory) = self.factory.take() else {
            return Err(LazyError::Reentrant {
                resource: self.resource_name(),
            });
        };

        let outcome = match guarded(factory) {
            Ok(result) => result.map_err(ConstructionError::new),
            Err(message) => Err(ConstructionError::new(message)),
        };

        if self.state.get() == LazyState::Disposed {
            warn!(
                resource = %self.resource_name(),
                "Handle disposed during construction - built value released"
            );
            if let Ok(value) = outcome {
                self.dispose_value(value);
            }
            return Err(self.disposed_error());
        }

        match outcome {
            Ok(value) => {
                *self.value.borrow_mut() = Some(value);
                self.hint.set(Some(TypeHint::of::<T>()));
                self.state.set(LazyState::Resolved);
                debug!(resource = %self.resource_name(), "Deferred value constructed");
            }
            Err(error) => {
                warn!(
                    resource = %self.resource_name(),
                    error = %error,
                    "Deferred construction failed"
                );
                *self.fault.borrow_mut() = Some(error);
                self.state.set(LazyState::Faulted);
            }
        }
        Ok(true)
    }

    fn force(&self) -> LazyResult<()> {
        self.build()?;
        match self.state.get() {
            LazyState::Resolved => Ok(()),
            LazyState::Faulted => Err(self.cached_fault()),
            _ => Err(self.disposed_error()),
        }
    }

    fn dispose_value(&self, value: T) {
        if let Some(release) = self.release {
            if let Some(error) = release(&value) {
                warn!(
                    resource = %self.resource_name(),
                    error = %error,
                    "Cleanup failure swallowed while disposing deferred value"
                );
            }
        }
        drop(value);
    }

    /// Takes the built value out and releases it. Returns false, leaving the
    /// value in place, while a `Ref` or `RefMut` to it is still alive.
    fn release_value(&self) -> bool {
        let Ok(mut slot) = self.value.try_borrow_mut() else {
            return false;
        };
        let value = slot.take();
        drop(slot);
        if let Some(value) = value {
            self.dispose_value(value);
        }
        true
    }

    fn resolve(&self) -> LazyResult<Ref<'_, T>> {
        self.force()?;
        Ref::filter_map(self.value.borrow(), Option::as_ref).map_err(|_| self.disposed_error())
    }

    fn resolve_mut(&self) -> LazyResult<RefMut<'_, T>> {
        self.force()?;
        RefMut::filter_map(self.value.borrow_mut(), Option::as_mut)
            .map_err(|_| self.disposed_error())
    }
}

impl<T: 'static> Drop for Inner<T> {
    fn drop(&mut self) {
        // A release postponed by an outstanding borrow happens here at the latest.
        if self.state.get() == LazyState::Disposed {
            if let Some(value) = self.value.get_mut().take() {
                self.dispose_value(value);
            }
        }
    }
}

/// A handle that constructs its value on first genuine use.
///
/// The handle owns its factory until the first build. The factory runs at
/// most once; success and failure are both cached for the lifetime of the
/// handle. Disposal never runs the factory. A built value is dropped, and
/// for handles made with [`Lazy::disposable`] it is disposed first. Any
/// value type can be held; only the constructor decides how it is released.
pub struct Lazy<T: 'static> {
    inner: Rc<Inner<T>>,
}

impl<T: 'static> Lazy<T> {
    /// Create a handle around an infallible factory
    pub fn new<F>(factory: F) -> Self
    where
        F: FnOnce() -> T + 'static,
    {
        Self::from_factory(Box::new(move || Ok(factory())), None)
    }

    /// Create a handle around a fallible factory
    pub fn try_new<F, E>(factory: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + 'static,
        E: Into<BoxError>,
    {
        Self::from_factory(Box::new(move || factory().map_err(Into::into)), None)
    }

    fn from_factory(factory: Factory<T>, release: Option<Release<T>>) -> Self {
        Self {
            inner: Rc::new(Inner {
                id: ResourceId::new(),
                label: RefCell::new(None),
                tracked: Cell::new(false),
                warn_on_drop: Cell::new(true),
                release,
                state: Cell::new(LazyState::Unresolved),
                factory: Cell::new(Some(factory)),
                hint: Cell::new(None),
                value: RefCell::new(None),
                fault: RefCell::new(None),
            }),
        }
    }

    /// Build a placeholder directly, without keeping the handle.
    ///
    /// The value can no longer be disposed through the handle; use this for
    /// values that hold no resources.
    pub fn deferred<F>(factory: F) -> Placeholder<T>
    where
        F: FnOnce() -> T + 'static,
    {
        let lazy = Self::new(factory);
        lazy.inner.state.set(LazyState::Placeholder);
        Placeholder {
            inner: Rc::clone(&lazy.inner),
        }
    }

    /// Answer type checks as `hint` until the value is built.
    #[must_use]
    pub fn with_hint(self, hint: TypeHint) -> Self {
        if !self.has() {
            self.inner.hint.set(Some(hint));
        }
        self
    }

    /// Name this handle in logs and errors
    #[must_use]
    pub fn with_label(self, label: ResourceLabel) -> Self {
        if self.inner.tracked.get() {
            global_leak_detector().set_label(&self.inner.id, &label);
        }
        *self.inner.label.borrow_mut() = Some(label);
        self
    }

    /// Apply lifecycle configuration
    #[must_use]
    pub fn with_config(self, config: &LifecycleConfig) -> Self {
        self.inner.warn_on_drop.set(config.warn_on_undisposed_drop);
        if config.track_leaks && !self.inner.tracked.replace(true) {
            global_leak_detector().register_creation(
                self.inner.id,
                "Lazy",
                self.inner.label.borrow().as_ref(),
            );
        }
        self
    }

    /// Identifier used for leak tracking
    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> LazyState {
        self.inner.state.get()
    }

    /// Run the factory if it has not run yet.
    ///
    /// Returns `Ok(true)` when the factory ran, whether it succeeded or
    /// failed, and `Ok(false)` when the value was already built. A handle
    /// that faulted earlier returns its cached failure.
    pub fn build(&self) -> LazyResult<bool> {
        self.inner.build()
    }

    /// True once the value has been built successfully.
    pub fn has(&self) -> bool {
        self.inner.state.get() == LazyState::Resolved
    }

    /// The forwarding reference for this handle.
    ///
    /// Does not build. Every placeholder of one handle forwards to the same
    /// value, including across a later build.
    pub fn get(&self) -> LazyResult<Placeholder<T>> {
        match self.inner.state.get() {
            LazyState::Disposed => {
                self.inner.release_value();
                return Err(self.inner.disposed_error());
            }
            LazyState::Faulted => return Err(self.inner.cached_fault()),
            LazyState::Unresolved => self.inner.state.set(LazyState::Placeholder),
            LazyState::Placeholder | LazyState::Resolved => {}
        }
        Ok(Placeholder {
            inner: Rc::clone(&self.inner),
        })
    }

    /// Borrow the value, building it first if needed.
    ///
    /// # Panics
    ///
    /// Panics if the value is currently mutably borrowed.
    pub fn resolve(&self) -> LazyResult<Ref<'_, T>> {
        self.inner.resolve()
    }

    /// Mutably borrow the value, building it first if needed.
    ///
    /// # Panics
    ///
    /// Panics if the value is currently borrowed.
    pub fn resolve_mut(&self) -> LazyResult<RefMut<'_, T>> {
        self.inner.resolve_mut()
    }
}

impl<T: AsDispose + 'static> Lazy<T> {
    /// Create a handle whose built value is disposed along with the handle.
    ///
    /// Handles from [`Lazy::new`] only drop their value on dispose.
    pub fn disposable<F>(factory: F) -> Self
    where
        F: FnOnce() -> T + 'static,
    {
        let release: Release<T> = dispose_if_supported::<T>;
        Self::from_factory(Box::new(move || Ok(factory())), Some(release))
    }

    /// Fallible counterpart of [`Lazy::disposable`]
    pub fn try_disposable<F, E>(factory: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + 'static,
        E: Into<BoxError>,
    {
        let release: Release<T> = dispose_if_supported::<T>;
        Self::from_factory(
            Box::new(move || factory().map_err(Into::into)),
            Some(release),
        )
    }
}

impl<T: 'static> Dispose for Lazy<T> {
    fn dispose(&self) -> CleanupResult {
        let inner = &self.inner;
        let previous = inner.state.replace(LazyState::Disposed);
        if previous == LazyState::Disposed {
            inner.release_value();
            return Ok(());
        }

        drop(inner.factory.take());
        inner.fault.borrow_mut().take();
        if !inner.release_value() {
            debug!(
                resource = %inner.resource_name(),
                "Deferred value still borrowed - release postponed"
            );
        }

        if inner.tracked.get() {
            global_leak_detector().register_disposal(&inner.id);
        }
        debug!(
            resource = %inner.resource_name(),
            previous = ?previous,
            "Disposed deferred handle"
        );
        Ok(())
    }
}

impl<T: 'static> Drop for Lazy<T> {
    fn drop(&mut self) {
        let inner = &self.inner;
        if inner.warn_on_drop.get()
            && inner.release.is_some()
            && inner.state.get() == LazyState::Resolved
        {
            warn!(
                resource = %inner.resource_name(),
                "Lazy dropped without dispose - built value was not released"
            );
        }
    }
}

impl<T: 'static> DisposeState for Lazy<T> {
    fn disposed(&self) -> bool {
        self.inner.state.get() == LazyState::Disposed
    }

    fn resource_name(&self) -> String {
        self.inner.resource_name()
    }
}

impl<T: 'static> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("resource", &self.inner.resource_name())
            .field("state", &self.inner.state.get())
            .field("hint", &self.inner.hint.get())
            .finish_non_exhaustive()
    }
}

/// Forwarding reference handed out by [`Lazy::get`].
///
/// Type checks ([`Placeholder::is`], [`Placeholder::type_hint`]) never
/// build. Every access to the value (`with`, `with_mut`, `resolve`,
/// `resolve_mut`) builds first if needed and then forwards to the value.
pub struct Placeholder<T: 'static> {
    inner: Rc<Inner<T>>,
}

impl<T: 'static> Placeholder<T> {
    /// The current identity marker, without building.
    pub fn type_hint(&self) -> Option<TypeHint> {
        self.inner.hint.get()
    }

    /// Type check answered from the identity marker, without building.
    ///
    /// Before the build this reflects the hint given to [`Lazy::with_hint`];
    /// afterwards it reflects the built value's own type.
    pub fn is<U: ?Sized + 'static>(&self) -> bool {
        self.inner.hint.get().is_some_and(|hint| hint.is::<U>())
    }

    /// True once the value behind this reference has been built.
    pub fn has(&self) -> bool {
        self.inner.state.get() == LazyState::Resolved
    }

    /// Read through the reference.
    pub fn with<R>(&self, read: impl FnOnce(&T) -> R) -> LazyResult<R> {
        let value = self.inner.resolve()?;
        Ok(read(&value))
    }

    /// Write through the reference.
    pub fn with_mut<R>(&self, write: impl FnOnce(&mut T) -> R) -> LazyResult<R> {
        let mut value = self.inner.resolve_mut()?;
        Ok(write(&mut value))
    }

    /// Borrow the value, building it first if needed.
    ///
    /// # Panics
    ///
    /// Panics if the value is currently mutably borrowed.
    pub fn resolve(&self) -> LazyResult<Ref<'_, T>> {
        self.inner.resolve()
    }

    /// Mutably borrow the value, building it first if needed.
    ///
    /// # Panics
    ///
    /// Panics if the value is currently borrowed.
    pub fn resolve_mut(&self) -> LazyResult<RefMut<'_, T>> {
        self.inner.resolve_mut()
    }

    /// True when both references forward to the same handle.
    pub fn same_handle(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// True when this reference forwards to `lazy`.
    pub fn belongs_to(&self, lazy: &Lazy<T>) -> bool {
        Rc::ptr_eq(&self.inner, &lazy.inner)
    }
}

impl<T: 'static> Clone for Placeholder<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> PartialEq for Placeholder<T> {
    fn eq(&self, other: &Self) -> bool {
        self.same_handle(other)
    }
}

impl<T: 'static> Eq for Placeholder<T> {}

impl<T: 'static> DisposeState for Placeholder<T> {
    fn disposed(&self) -> bool {
        self.inner.state.get() == LazyState::Disposed
    }

    fn resource_name(&self) -> String {
        self.inner.resource_name()
    }
}

impl<T: 'static> fmt::Debug for Placeholder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Placeholder")
            .field("resource", &self.inner.resource_name())
            .field("state", &self.inner.state.get())
            .field("hint", &self.inner.hint.get())
            .finish()
    }
}

/// True when `value` is a [`Placeholder`] for values of type `T`.
///
/// Never builds. Placeholders only come from [`Lazy::get`] and
/// [`Lazy::deferred`], so any match is a deferred forwarding reference.
pub fn is_deferred_placeholder<T: 'static>(value: &dyn Any) -> bool {
    value.is::<Placeholder<T>>()
}

mod sealed {
    pub trait Sealed {}
}

/// Type-erased view of a [`Placeholder`].
///
/// Lets callers keep placeholders of different value types side by side
/// and inspect them without knowing `T`. Implemented only by
/// [`Placeholder`]; no method builds the value.
pub trait DeferredPlaceholder: sealed::Sealed {
    /// The current identity marker
    fn type_hint(&self) -> Option<TypeHint>;

    /// Lifecycle state of the handle behind the reference
    fn state(&self) -> LazyState;

    /// The placeholder itself, for a checked downcast once `T` is known
    fn as_any(&self) -> &dyn Any;
}

impl<T: 'static> sealed::Sealed for Placeholder<T> {}

impl<T: 'static> DeferredPlaceholder for Placeholder<T> {
    fn type_hint(&self) -> Option<TypeHint> {
        self.inner.hint.get()
    }

    fn state(&self) -> LazyState {
        self.inner.state.get()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
