//! Leak detection for hosts and deferred handles.
//!
//! Disposal is explicit, so a host or handle that is dropped or forgotten
//! without being disposed never releases its children. When leak tracking is
//! enabled in [`LifecycleConfig`](crate::config::LifecycleConfig), every host
//! and handle registers itself here on creation and deregisters on disposal.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::types::{ResourceId, ResourceLabel};

/// Tracks instances that were created but not yet disposed
#[derive(Debug, Default)]
pub struct LeakDetector {
    active: Mutex<HashMap<ResourceId, TrackedResource>>,
}

#[derive(Debug, Clone)]
struct TrackedResource {
    kind: String,
    label: Option<String>,
    created_at: Instant,
}

impl LeakDetector {
    /// Create a new leak detector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live instance
    pub fn register_creation(&self, id: ResourceId, kind: &str, label: Option<&ResourceLabel>) {
        self.active.lock().insert(
            id,
            TrackedResource {
                kind: kind.to_string(),
                label: label.map(ToString::to_string),
                created_at: Instant::now(),
            },
        );
    }

    /// Attach a label to an instance registered before it was named
    pub fn set_label(&self, id: &ResourceId, label: &ResourceLabel) {
        if let Some(resource) = self.active.lock().get_mut(id) {
            resource.label = Some(label.to_string());
        }
    }

    /// The label recorded for a live instance
    pub fn label_of(&self, id: &ResourceId) -> Option<String> {
        self.active
            .lock()
            .get(id)
            .and_then(|resource| resource.label.clone())
    }

    /// Forget an instance once it is disposed
    pub fn register_disposal(&self, id: &ResourceId) {
        self.active.lock().remove(id);
    }

    /// Whether `id` is still live
    pub fn is_tracked(&self, id: &ResourceId) -> bool {
        self.active.lock().contains_key(id)
    }

    /// Snapshot of the live instances
    pub fn stats(&self) -> LeakStats {
        let active = self.active.lock();
        let mut by_kind = HashMap::new();
        let mut oldest_age = Duration::ZERO;

        for resource in active.values() {
            *by_kind.entry(resource.kind.clone()).or_insert(0) += 1;
            oldest_age = oldest_age.max(resource.created_at.elapsed());
        }

        LeakStats {
            total_active: active.len(),
            by_kind,
            oldest_age,
        }
    }

    /// Instances live for longer than `threshold`, oldest first
    pub fn find_potential_leaks(&self, threshold: Duration) -> Vec<ResourceId> {
        let mut leaks: Vec<ResourceId> = self
            .active
            .lock()
            .iter()
            .filter(|(_, resource)| resource.created_at.elapsed() > threshold)
            .map(|(id, _)| *id)
            .collect();
        leaks.sort();
        leaks
    }

    /// Live instances older than `threshold`, with their kind and label
    pub fn leak_reports(&self, threshold: Duration) -> Vec<LeakReport> {
        let mut reports: Vec<LeakReport> = self
            .active
            .lock()
            .iter()
            .filter_map(|(id, resource)| {
                let age = resource.created_at.elapsed();
                (age > threshold).then(|| LeakReport {
                    id: *id,
                    kind: resource.kind.clone(),
                    label: resource.label.clone(),
                    age,
                })
            })
            .collect();
        reports.sort_by(|a, b| a.id.cmp(&b.id));
        reports
    }
}

/// Statistics about live instances
#[derive(Debug, Default)]
pub struct LeakStats {
    /// Total number of live instances
    pub total_active: usize,
    /// Live instances per kind
    pub by_kind: HashMap<String, usize>,
    /// Age of the oldest live instance
    pub oldest_age: Duration,
}

/// A live instance that outlived the leak threshold
#[derive(Debug, Clone)]
pub struct LeakReport {
    /// Identifier of the instance
    pub id: ResourceId,
    /// `DisposeHost` or `Lazy`
    pub kind: String,
    /// Label given with `with_label`, if any
    pub label: Option<String>,
    /// Time since creation
    pub age: Duration,
}

static GLOBAL_LEAK_DETECTOR: OnceLock<LeakDetector> = OnceLock::new();

/// The process-wide leak detector used by hosts and handles
pub fn global_leak_detector() -> &'static LeakDetector {
    GLOBAL_LEAK_DETECTOR.get_or_init(LeakDetector::new)
}
