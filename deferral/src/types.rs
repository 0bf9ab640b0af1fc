//! Core value types shared by hosts and deferred handles.
//!
//! All types use smart constructors so an invalid label or identifier can
//! never reach the lifecycle machinery.

use std::any::{type_name, TypeId};
use std::fmt;

use nutype::nutype;
use uuid::Uuid;

/// A human readable name for a host or handle.
///
/// Labels appear in log events and in [`DisposedError`](crate::errors::DisposedError)
/// messages. They are trimmed, non-empty and at most 128 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 128),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ResourceLabel(String);

/// Identifier assigned to every tracked host or handle.
///
/// Uses UUIDv7 so identifiers sort by creation time in leak reports.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ResourceId(Uuid);

impl ResourceId {
    /// Creates a new `ResourceId` with the current timestamp.
    pub fn new() -> Self {
        // Uuid::now_v7() always yields a version 7 UUID
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity marker used to answer type checks on a value that may not exist yet.
///
/// A deferred handle carries a hint supplied at construction; once the value
/// is built the hint is replaced by the value's own type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHint {
    id: TypeId,
    name: &'static str,
}

impl TypeHint {
    /// The hint for type `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Returns true if this hint identifies `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// The `TypeId` behind this hint
    pub const fn type_id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name, for diagnostics only
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeHint").field(&self.name).finish()
    }
}

impl fmt::Display for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
