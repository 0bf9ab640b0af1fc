//! Lifecycle configuration with type-safe validation.
//!
//! Numeric settings use `nutype` validation so an out-of-range value is
//! rejected while the configuration is parsed rather than when a host is
//! being disposed.

use nutype::nutype;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Maximum number of cleanup failures logged individually per disposal.
///
/// Further failures are summarized in a single event. Validated to be
/// between 1 and 1000.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1000),
    default = 16,
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Default,
        Serialize,
        Deserialize
    )
)]
pub struct MaxLoggedFailures(usize);

/// What a host does with a child registered after the host was disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateRegistration {
    /// Dispose the child right away; the host will never do it later.
    #[default]
    DisposeImmediately,
    /// Refuse the registration with a `DisposedError`.
    Reject,
    /// Drop the registration without touching the child.
    Ignore,
}

/// Settings shared by hosts and deferred handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Policy for registrations that arrive after disposal
    pub late_registration: LateRegistration,
    /// Record live hosts and handles in the global leak detector
    pub track_leaks: bool,
    /// Log a warning when a host still holding children is dropped undisposed
    pub warn_on_undisposed_drop: bool,
    /// Cap on individually logged cleanup failures per disposal
    pub max_logged_failures: MaxLoggedFailures,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            late_registration: LateRegistration::default(),
            track_leaks: false,
            warn_on_undisposed_drop: true,
            max_logged_failures: MaxLoggedFailures::default(),
        }
    }
}

impl LifecycleConfig {
    /// Parses a JSON configuration document. Missing fields take their defaults.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(document)?)
    }

    /// Sets the late registration policy
    #[must_use]
    pub const fn with_late_registration(mut self, policy: LateRegistration) -> Self {
        self.late_registration = policy;
        self
    }

    /// Enables or disables leak tracking
    #[must_use]
    pub const fn with_leak_tracking(mut self, enabled: bool) -> Self {
        self.track_leaks = enabled;
        self
    }

    /// Enables or disables the undisposed drop warning
    #[must_use]
    pub const fn with_undisposed_drop_warning(mut self, enabled: bool) -> Self {
        self.warn_on_undisposed_drop = enabled;
        self
    }

    /// Sets the cap on individually logged failures
    #[must_use]
    pub const fn with_max_logged_failures(mut self, max: MaxLoggedFailures) -> Self {
        self.max_logged_failures = max;
        self
    }
}
