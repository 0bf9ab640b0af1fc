//! The disposal protocol.
//!
//! A type opts into disposal by implementing [`Dispose`]. Code that holds
//! values which *may* be disposable (heterogeneous collections, optional
//! slots) goes through [`AsDispose`], which answers the capability check
//! without requiring every element to support it.
//!
//! Releasing through [`dispose_if_supported`] and [`dispose_all_if_supported`]
//! never propagates a failure: a returned error or a panic inside a release
//! operation is captured and handed back to the caller.
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use deferral::dispose::{dispose_all_if_supported, from_callback, AsDispose};
//!
//! let closed = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&closed);
//! let socket = from_callback(move || counter.set(counter.get() + 1));
//!
//! let values: Vec<&dyn AsDispose> = vec![&socket, &42_u32, &true];
//! let errors = dispose_all_if_supported(values);
//!
//! assert!(errors.is_empty());
//! assert_eq!(closed.get(), 1);
//! ```

use std::any::{type_name, Any};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::errors::{CleanupError, CleanupResult, DisposedError};

/// Capability to release held resources.
///
/// Implementations take `&self` and keep their own state in cells, so a
/// disposable can be shared through `Rc` and released by whichever owner
/// gets there first. Implementations should treat a second call as a no-op
/// unless repeating the release is meaningful for the resource.
pub trait Dispose {
    /// Release the resources held by this value.
    fn dispose(&self) -> CleanupResult;
}

/// Read-only observer for the disposed flag.
pub trait DisposeState {
    /// Returns true once the instance has been disposed. Never reverts.
    fn disposed(&self) -> bool;

    /// Name used when reporting access to a disposed instance
    fn resource_name(&self) -> String {
        short_type_name(type_name::<Self>())
    }
}

impl<T: Dispose + ?Sized> Dispose for Rc<T> {
    fn dispose(&self) -> CleanupResult {
        (**self).dispose()
    }
}

impl<T: Dispose + ?Sized> Dispose for Box<T> {
    fn dispose(&self) -> CleanupResult {
        (**self).dispose()
    }
}

impl<T: DisposeState + ?Sized> DisposeState for Rc<T> {
    fn disposed(&self) -> bool {
        (**self).disposed()
    }

    fn resource_name(&self) -> String {
        (**self).resource_name()
    }
}

/// Runtime check for the disposal capability.
///
/// Every sized [`Dispose`] type gets this for free. Types that are *not*
/// disposable but need to sit next to disposables in a collection opt in
/// with an empty impl, or through [`not_disposable!`](crate::not_disposable).
pub trait AsDispose {
    /// Returns the release capability of this value, if it has one.
    fn as_dispose(&self) -> Option<&dyn Dispose> {
        None
    }
}

impl<T: Dispose> AsDispose for T {
    fn as_dispose(&self) -> Option<&dyn Dispose> {
        Some(self)
    }
}

impl<'a> AsDispose for dyn Dispose + 'a {
    fn as_dispose(&self) -> Option<&dyn Dispose> {
        Some(self)
    }
}

/// `None` is the absent value: nothing to release.
impl<T: AsDispose> AsDispose for Option<T> {
    fn as_dispose(&self) -> Option<&dyn Dispose> {
        self.as_ref().and_then(AsDispose::as_dispose)
    }
}

/// Declares types that never hold releasable resources.
///
/// ```rust
/// struct Point { x: i32, y: i32 }
/// deferral::not_disposable!(Point);
///
/// assert!(deferral::dispose::dispose_if_supported(&Point { x: 1, y: 2 }).is_none());
/// ```
#[macro_export]
macro_rules! not_disposable {
    ($($ty:ty),* $(,)?) => {
        $(impl $crate::dispose::AsDispose for $ty {})*
    };
}

not_disposable!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    str,
    String,
);

impl<T> AsDispose for Vec<T> {}

/// A disposable built from a plain callback.
///
/// Each call to [`Dispose::dispose`] invokes the callback once. There is no
/// guard against repeated calls; owners that need exactly-once semantics
/// provide it themselves.
pub struct CallbackDisposable<F> {
    callback: F,
}

impl<F> fmt::Debug for CallbackDisposable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackDisposable").finish_non_exhaustive()
    }
}

impl<F: Fn()> Dispose for CallbackDisposable<F> {
    fn dispose(&self) -> CleanupResult {
        (self.callback)();
        Ok(())
    }
}

/// Wraps a callback as a disposable.
pub const fn from_callback<F: Fn()>(callback: F) -> CallbackDisposable<F> {
    CallbackDisposable { callback }
}

/// Disposes `value` if it supports disposal.
///
/// The release runs inside a guarded region: an error it returns, or a
/// panic it raises, comes back as `Some(error)` instead of propagating.
/// Values without the capability are left alone and yield `None`.
pub fn dispose_if_supported<V: AsDispose + ?Sized>(value: &V) -> Option<CleanupError> {
    let disposable = value.as_dispose()?;
    match guarded(|| disposable.dispose()) {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(error),
        Err(message) => Some(CleanupError::Panicked(message)),
    }
}

/// Disposes every element that supports disposal, in iteration order.
///
/// Returns the captured failures in the order they occurred. Elements that
/// released cleanly or are not disposable contribute nothing, so the result
/// may be shorter than the input.
pub fn dispose_all_if_supported<'a, I, V>(values: I) -> Vec<CleanupError>
where
    I: IntoIterator<Item = &'a V>,
    V: AsDispose + ?Sized + 'a,
{
    values.into_iter().filter_map(dispose_if_supported).collect()
}

/// Fails with [`DisposedError`] when `instance` has been disposed.
pub fn assert_not_disposed<T: DisposeState + ?Sized>(instance: &T) -> Result<(), DisposedError> {
    if instance.disposed() {
        Err(DisposedError::new(instance.resource_name()))
    } else {
        Ok(())
    }
}

/// Runs `f`, converting a panic into its message.
pub(crate) fn guarded<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Logs swallowed cleanup failures, at most `max` of them individually.
pub(crate) fn log_failures(resource: &str, errors: &[CleanupError], max: usize) {
    for error in errors.iter().take(max) {
        tracing::warn!(resource, error = %error, "Cleanup failure swallowed during disposal");
    }
    if errors.len() > max {
        tracing::warn!(
            resource,
            suppressed = errors.len() - max,
            "Additional cleanup failures not logged"
        );
    }
}

/// Strips module paths from every segment of a type name.
pub(crate) fn short_type_name(full: &str) -> String {
    let mut short = String::with_capacity(full.len());
    let mut segment = String::new();
    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            segment.push(ch);
        } else {
            short.push_str(segment.rsplit("::").next().unwrap_or_default());
            segment.clear();
            short.push(ch);
        }
    }
    short.push_str(segment.rsplit("::").next().unwrap_or_default());
    short
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Tracked {
        calls: Cell<usize>,
        disposed: Cell<bool>,
    }

    impl Dispose for Tracked {
        fn dispose(&self) -> CleanupResult {
            self.calls.set(self.calls.get() + 1);
            self.disposed.set(true);
            Ok(())
        }
    }

    impl DisposeState for Tracked {
        fn disposed(&self) -> bool {
            self.disposed.get()
        }
    }

    struct Failing;

    impl Dispose for Failing {
        fn dispose(&self) -> CleanupResult {
            Err(CleanupError::failed("handle already closed"))
        }
    }

    struct Panicking;

    impl Dispose for Panicking {
        fn dispose(&self) -> CleanupResult {
            panic!("release exploded");
        }
    }

    #[test]
    fn test_callback_runs_once_per_call() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let disposable = from_callback(move || counter.set(counter.get() + 1));

        assert_eq!(calls.get(), 0);
        disposable.dispose().unwrap();
        assert_eq!(calls.get(), 1);
        disposable.dispose().unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_dispose_if_supported_disposes_capable_values() {
        let tracked = Tracked::default();
        assert!(dispose_if_supported(&tracked).is_none());
        assert_eq!(tracked.calls.get(), 1);
    }

    #[test]
    fn test_dispose_if_supported_ignores_plain_values() {
        assert!(dispose_if_supported(&5_u8).is_none());
        assert!(dispose_if_supported("text").is_none());
        assert!(dispose_if_supported(&None::<Tracked>).is_none());
        assert!(dispose_if_supported(&vec![1, 2, 3]).is_none());
    }

    #[test]
    fn test_dispose_if_supported_captures_errors_and_panics() {
        assert_eq!(
            dispose_if_supported(&Failing),
            Some(CleanupError::failed("handle already closed"))
        );
        assert_eq!(
            dispose_if_supported(&Panicking),
            Some(CleanupError::Panicked("release exploded".to_string()))
        );
    }

    #[test]
    fn test_dispose_if_supported_through_smart_pointers() {
        let tracked = Rc::new(Tracked::default());
        let shared: Rc<dyn Dispose> = tracked.clone();
        assert!(dispose_if_supported(&shared).is_none());
        assert!(dispose_if_supported(&Some(Rc::clone(&tracked))).is_none());
        let boxed: Box<dyn Dispose> = Box::new(Failing);
        assert!(dispose_if_supported(&boxed).is_some());
        assert!(dispose_if_supported(&*boxed).is_some());
        assert_eq!(tracked.calls.get(), 2);
    }

    #[test]
    fn test_dispose_all_keeps_only_failures_in_order() {
        let first = Tracked::default();
        let last = Tracked::default();
        let values: Vec<&dyn AsDispose> = vec![&first, &Panicking, &7_i32, &Failing, &last];

        let errors = dispose_all_if_supported(values);

        assert_eq!(
            errors,
            vec![
                CleanupError::Panicked("release exploded".to_string()),
                CleanupError::failed("handle already closed"),
            ]
        );
        assert_eq!(first.calls.get(), 1);
        assert_eq!(last.calls.get(), 1);
    }

    #[test]
    fn test_dispose_all_of_nothing() {
        let absent: Option<&Vec<Tracked>> = None;
        assert!(dispose_all_if_supported(absent.into_iter().flatten()).is_empty());
        assert!(dispose_all_if_supported(&Vec::<Tracked>::new()).is_empty());
    }

    #[test]
    fn test_assert_not_disposed() {
        let tracked = Tracked::default();
        assert!(assert_not_disposed(&tracked).is_ok());

        tracked.dispose().unwrap();
        let error = assert_not_disposed(&tracked).unwrap_err();
        assert_eq!(error.resource(), "Tracked");
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("alloc::string::String"), "String");
        assert_eq!(
            short_type_name("deferral::lazy::Lazy<alloc::vec::Vec<u8>>"),
            "Lazy<Vec<u8>>"
        );
        assert_eq!(short_type_name("u32"), "u32");
    }
}
