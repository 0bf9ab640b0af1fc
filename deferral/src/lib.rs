//! `deferral` - deferred construction and deterministic disposal
//!
//! This library provides two layered building blocks:
//!
//! - a disposal protocol ([`dispose`], [`host`]) that releases resources
//!   exactly once, cascades from owners to registered children and isolates
//!   the failure of any single release;
//! - deferred handles ([`lazy`]) that postpone an expensive or side-effecting
//!   construction until first genuine use, answer type checks without
//!   building, and take part in the disposal protocol.
//!
//! Everything here is single-threaded: hosts and handles share state through
//! `Rc` and cells, and every operation runs to completion synchronously.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dispose;
pub mod errors;
pub mod host;
pub mod lazy;
pub mod monitor;
pub mod scope;
pub mod types;

pub use config::{LateRegistration, LifecycleConfig, MaxLoggedFailures};
pub use dispose::{
    assert_not_disposed, dispose_all_if_supported, dispose_if_supported, from_callback, AsDispose,
    CallbackDisposable, Dispose, DisposeState,
};
pub use errors::{
    CleanupError, CleanupResult, ConfigError, ConstructionError, DisposedError, LazyError,
    LazyResult,
};
pub use host::DisposeHost;
pub use lazy::{is_deferred_placeholder, DeferredPlaceholder, Lazy, LazyState, Placeholder};
pub use monitor::{global_leak_detector, LeakDetector, LeakReport, LeakStats};
pub use scope::{DisposeExt, DisposeScope};
pub use types::{ResourceId, ResourceLabel, TypeHint};
