//! Error types for deferral.
//!
//! Every failure the lifecycle subsystem can report falls into one of three
//! categories:
//!
//! - **Disposed**: an operation reached an instance after it was disposed.
//!   Always fatal to that call and never retried.
//! - **Construction**: a deferred factory failed. The failure is cached
//!   verbatim and replayed on every later access.
//! - **Cleanup**: releasing a child or a wrapped value failed. Cascading
//!   disposal isolates these per item; batch callers receive them as a list.
//!
//! # Example Usage
//!
//! ```rust
//! use deferral::errors::LazyError;
//! use deferral::lazy::Lazy;
//!
//! let lazy: Lazy<u32> = Lazy::try_new(|| Err::<u32, _>("offline"));
//! lazy.build().unwrap();
//!
//! match lazy.get() {
//!     Err(LazyError::Faulted(cause)) => assert_eq!(cause.to_string(), "Construction failed: offline"),
//!     other => panic!("expected a cached construction failure, got {other:?}"),
//! }
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// Boxed error accepted from user factories.
pub type BoxError = Box<dyn StdError + 'static>;

/// Raised when an operation reaches an instance that has already been disposed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Try to access a disposed {resource}")]
pub struct DisposedError {
    resource: String,
}

impl DisposedError {
    /// Creates a new error naming the disposed resource
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
        }
    }

    /// The resource that was accessed after disposal
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

/// Errors raised while releasing a resource.
///
/// Cascading disposal never propagates these; it either logs and discards
/// them or hands them back as a list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CleanupError {
    /// The release operation reported a failure.
    #[error("Cleanup failed: {0}")]
    Failed(String),

    /// The release operation panicked. The panic was contained.
    #[error("Cleanup panicked: {0}")]
    Panicked(String),

    /// A child was rejected because its owner had already been disposed.
    #[error(transparent)]
    Disposed(#[from] DisposedError),
}

impl CleanupError {
    /// Wraps any displayable failure as [`CleanupError::Failed`].
    pub fn failed(reason: impl fmt::Display) -> Self {
        Self::Failed(reason.to_string())
    }
}

/// A cached factory failure.
///
/// Cloning shares the underlying error, so every replay of a faulted handle
/// hands out the *same* error. Equality is identity.
#[derive(Debug, Clone, Error)]
#[error("Construction failed: {cause}")]
pub struct ConstructionError {
    cause: Rc<dyn StdError + 'static>,
}

impl ConstructionError {
    /// Wraps a factory error for caching
    pub fn new(cause: impl Into<BoxError>) -> Self {
        Self {
            cause: Rc::from(cause.into()),
        }
    }

    /// The error returned by the factory.
    pub fn cause(&self) -> &(dyn StdError + 'static) {
        &*self.cause
    }

    /// Returns true when both values replay the same factory failure.
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cause, &other.cause)
    }
}

impl PartialEq for ConstructionError {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for ConstructionError {}

/// Errors returned when accessing a deferred handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LazyError {
    /// The handle was disposed.
    #[error(transparent)]
    Disposed(#[from] DisposedError),

    /// The factory failed earlier; this is the cached failure.
    #[error(transparent)]
    Faulted(#[from] ConstructionError),

    /// The factory tried to use its own handle while it was running.
    #[error("Construction of {resource} re-entered its own handle")]
    Reentrant {
        /// The handle under construction
        resource: String,
    },
}

/// Errors raised while loading lifecycle configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for deferred handle access
pub type LazyResult<T> = Result<T, LazyError>;

/// Result type for release operations
pub type CleanupResult = Result<(), CleanupError>;
