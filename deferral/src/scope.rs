//! Scoped disposal.
//!
//! Disposal is never implicit. A [`DisposeScope`] is the opt-in guard that
//! disposes its resource on every exit path of the enclosing block, early
//! returns and panics included.

use std::ops::Deref;

use tracing::error;

use crate::dispose::{dispose_if_supported, Dispose, DisposeState};
use crate::errors::CleanupResult;

/// Guard that disposes its resource when dropped.
///
/// Use [`DisposeScope::close`] to observe the disposal result, or
/// [`DisposeScope::into_inner`] to take the resource back undisposed.
/// A failure during the implicit disposal on drop is logged.
pub struct DisposeScope<D: Dispose> {
    resource: Option<D>,
}

impl<D: Dispose> DisposeScope<D> {
    /// Guard `resource`
    pub const fn new(resource: D) -> Self {
        Self {
            resource: Some(resource),
        }
    }

    /// Dispose now and report the outcome.
    pub fn close(mut self) -> CleanupResult {
        self.resource
            .take()
            .and_then(|resource| dispose_if_supported(&resource))
            .map_or(Ok(()), Err)
    }

    /// Release the resource from the guard without disposing it.
    pub fn into_inner(mut self) -> D {
        match self.resource.take() {
            Some(resource) => resource,
            None => unreachable!("DisposeScope resource is only taken by consuming methods"),
        }
    }
}

impl<D: Dispose> Deref for DisposeScope<D> {
    type Target = D;

    fn deref(&self) -> &D {
        match self.resource.as_ref() {
            Some(resource) => resource,
            None => unreachable!("DisposeScope resource is only taken by consuming methods"),
        }
    }
}

impl<D: Dispose + DisposeState> DisposeState for DisposeScope<D> {
    fn disposed(&self) -> bool {
        self.resource.as_ref().map_or(true, DisposeState::disposed)
    }
}

impl<D: Dispose> Drop for DisposeScope<D> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            if let Some(failure) = dispose_if_supported(&resource) {
                error!(error = %failure, "DisposeScope ended with a failing disposal");
            }
        }
    }
}

/// Extension trait wrapping any disposable in a [`DisposeScope`]
pub trait DisposeExt: Dispose + Sized {
    /// Dispose `self` when the returned guard goes out of scope
    fn scoped(self) -> DisposeScope<Self> {
        DisposeScope::new(self)
    }
}

impl<D: Dispose> DisposeExt for D {}
