#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The option algebra: a type-keyed bag of opaque capability options with
//! flatten/union/intersection, keyed by a closed enum and a per-kind
//! operations table rather than reflective type objects.
//!
//! # Design
//!
//! [`OptionKind`] enumerates the fourteen capability categories. [`OptionBag`]
//! is the enum-keyed map from kind to [`OptionValue`]. [`OptionBag::compose`]
//! folds every input bag's declared kinds (including those exposed through
//! the [`AdaptableOption`] relation) under a chosen [`CompositionOp`], then
//! flattens the result.
//!
//! # Invariants
//!
//! - `intersection(a, a) == flatten(a)`.
//! - `union(a, flatten(a)) == flatten(a)`.
//! - Intersecting incompatible [`OptionKind::SubPath`] values raises
//!   [`vfs_error::VfsError::OptionOperationNotSupported`].
//! - Intersecting/unioning is monotone for every kind except
//!   [`OptionKind::Mount`], which deliberately inverts the lattice (see
//!   below).
//!
//! # Design note: `Mount` kind lattice inversion
//!
//! `Mount`-kind booleans intersect with `||` and union with `&&`, inverted
//! from every other kind. This is deliberate: `Mount`-kind booleans describe
//! structural capabilities of a mountpoint (e.g. "this node may be
//! unmounted"), not data-flow capabilities of a request, so when two
//! assignments share a mountpoint the narrowest *structural* capability
//! should not automatically survive a union, and granting the capability
//! anywhere is enough for an intersection view. [`OptionKind::SubPath`]'s
//! intersection cross-compares the two sides (`c1.sub_path == c2.sub_path`)
//! rather than comparing a value against itself.
//!
//! # Errors
//!
//! See [`OptionBag::compose`] and [`OptionBag::intersection`].

use std::collections::BTreeMap;
use std::sync::Arc;

use vfs_error::{VfsError, VfsResult};

/// The fourteen option kinds recognized by the virtual filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptionKind {
    /// Gates `browse`.
    Browse,
    /// Gates `open`.
    Open,
    /// Gates read access within `open`.
    Read,
    /// Gates write access within `open`.
    Write,
    /// Gates `create_directory`.
    Create,
    /// Gates `delete`.
    Delete,
    /// Gates `move`.
    Move,
    /// Gates `observe`.
    Observe,
    /// Gates `mount`. Its algebra is deliberately inverted; see the module
    /// documentation.
    Mount,
    /// Gates `unmount`.
    Unmount,
    /// Gates `list_mountpoints`.
    ListMountpoints,
    /// Virtually shifts a back-end's root within the parent namespace.
    SubPath,
    /// An opaque back-end-specific credential or capability token.
    Token,
    /// Gates automatic mounting of nested archives/containers.
    AutoMount,
}

/// An opaque value classified by an [`OptionKind`].
#[derive(Debug, Clone)]
pub enum OptionValue {
    /// A boolean capability flag.
    Bool(bool),
    /// A `sub-path` reshaping value.
    SubPath(String),
    /// An opaque, back-end-interpreted token. Never inspected by the
    /// algebra; combining two tokens always keeps the first (see
    /// [`OptionBag::compose`]).
    Token(Arc<dyn std::any::Any + Send + Sync>),
}

impl OptionValue {
    /// Constructs a boolean capability value.
    #[must_use]
    pub const fn bool(value: bool) -> Self {
        Self::Bool(value)
    }

    /// Returns the boolean payload, if this is a [`OptionValue::Bool`].
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the sub-path payload, if this is a [`OptionValue::SubPath`].
    #[must_use]
    pub fn as_sub_path(&self) -> Option<&str> {
        match self {
            Self::SubPath(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Flattens a value of `kind` to its canonical form.
///
/// For scalar values this crate stores, flattening is the identity except
/// for [`OptionKind::SubPath`], whose canonical form has no trailing
/// separator.
#[must_use]
pub fn flatten(kind: OptionKind, value: &OptionValue) -> OptionValue {
    match (kind, value) {
        (OptionKind::SubPath, OptionValue::SubPath(s)) => {
            OptionValue::SubPath(s.trim_end_matches('/').to_owned())
        }
        _ => value.clone(),
    }
}

/// Widens two values of `kind` (logical OR on boolean capabilities, except
/// for [`OptionKind::Mount`] which inverts to logical AND).
///
/// # Errors
///
/// Returns [`VfsError::OptionOperationNotSupported`] if `a` and `b` are not
/// the same variant, or if unioning `kind` is structurally impossible (no
/// kind in this crate currently forbids union).
pub fn union(kind: OptionKind, a: &OptionValue, b: &OptionValue) -> VfsResult<OptionValue> {
    match (a, b) {
        (OptionValue::Bool(x), OptionValue::Bool(y)) => {
            let combined = if kind == OptionKind::Mount {
                *x && *y
            } else {
                *x || *y
            };
            Ok(OptionValue::Bool(combined))
        }
        (OptionValue::SubPath(x), OptionValue::SubPath(y)) => {
            if x.trim_end_matches('/') == y.trim_end_matches('/') {
                Ok(flatten(kind, a))
            } else {
                Err(VfsError::OptionOperationNotSupported(format!(
                    "cannot union differing sub-path values {x:?} and {y:?}"
                )))
            }
        }
        (OptionValue::Token(_), OptionValue::Token(_)) => Ok(a.clone()),
        _ => Err(VfsError::OptionOperationNotSupported(
            "mismatched option value variants".to_owned(),
        )),
    }
}

/// Narrows two values of `kind` (logical AND on boolean capabilities, except
/// for [`OptionKind::Mount`] which inverts to logical OR).
///
/// # Errors
///
/// Returns [`VfsError::OptionOperationNotSupported`] when intersecting
/// differing [`OptionKind::SubPath`] values, or when `a`/`b` are mismatched
/// variants.
pub fn intersection(kind: OptionKind, a: &OptionValue, b: &OptionValue) -> VfsResult<OptionValue> {
    match (a, b) {
        (OptionValue::Bool(x), OptionValue::Bool(y)) => {
            let combined = if kind == OptionKind::Mount {
                *x || *y
            } else {
                *x && *y
            };
            Ok(OptionValue::Bool(combined))
        }
        (OptionValue::SubPath(x), OptionValue::SubPath(y)) => {
            if x.trim_end_matches('/') == y.trim_end_matches('/') {
                Ok(flatten(kind, a))
            } else {
                Err(VfsError::OptionOperationNotSupported(format!(
                    "cannot intersect differing sub-path values {x:?} and {y:?}"
                )))
            }
        }
        (OptionValue::Token(_), OptionValue::Token(_)) => Ok(a.clone()),
        _ => Err(VfsError::OptionOperationNotSupported(
            "mismatched option value variants".to_owned(),
        )),
    }
}

/// Selects how [`OptionBag::compose`] resolves a kind declared by more than
/// one input bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionOp {
    /// Keep the first declared value for each kind.
    First,
    /// Keep the last declared value for each kind.
    Last,
    /// Union (widen) conflicting values.
    Union,
    /// Intersect (narrow) conflicting values.
    Intersection,
}

/// A type-keyed bag of capability options.
#[derive(Debug, Clone, Default)]
pub struct OptionBag(BTreeMap<OptionKind, OptionValue>);

impl OptionBag {
    /// An empty option bag (every capability absent/unset).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets (or overwrites) the value for `kind`.
    #[must_use]
    pub fn with(mut self, kind: OptionKind, value: OptionValue) -> Self {
        self.0.insert(kind, value);
        self
    }

    /// Returns the raw value declared for `kind`, if any.
    #[must_use]
    pub fn get(&self, kind: OptionKind) -> Option<&OptionValue> {
        self.0.get(&kind)
    }

    /// Returns the boolean capability for `kind`, defaulting to `false` if
    /// undeclared.
    #[must_use]
    pub fn is_enabled(&self, kind: OptionKind) -> bool {
        self.0
            .get(&kind)
            .and_then(OptionValue::as_bool)
            .unwrap_or(false)
    }

    /// Returns the declared `sub-path`, if any.
    #[must_use]
    pub fn sub_path(&self) -> Option<&str> {
        self.0.get(&OptionKind::SubPath).and_then(OptionValue::as_sub_path)
    }

    /// Flattens every declared value to its canonical form in place.
    pub fn flatten_in_place(&mut self) {
        for (&kind, value) in &mut self.0 {
            *value = flatten(kind, value);
        }
    }

    /// Returns a copy of this bag with every value flattened.
    #[must_use]
    pub fn flattened(&self) -> Self {
        let mut clone = self.clone();
        clone.flatten_in_place();
        clone
    }

    /// Implements `OptionComposition(op, bags)`: folds every declared kind
    /// across all input values — each projected to an [`OptionBag`] through
    /// [`AdaptableOption::adapt`] first, so a composite credential or other
    /// multi-kind value composes exactly like a plain bag — under `op`,
    /// then flattens the result.
    ///
    /// # Errors
    ///
    /// Propagates [`VfsError::OptionOperationNotSupported`] from
    /// [`union`]/[`intersection`] when `op` requires combining incompatible
    /// values.
    pub fn compose(op: CompositionOp, bags: &[&dyn AdaptableOption]) -> VfsResult<Self> {
        let mut result: BTreeMap<OptionKind, OptionValue> = BTreeMap::new();
        for bag in bags {
            let adapted = bag.adapt();
            for (kind, value) in adapted.0 {
                match result.remove(&kind) {
                    None => {
                        result.insert(kind, value);
                    }
                    Some(existing) => {
                        let combined = match op {
                            CompositionOp::First => existing,
                            CompositionOp::Last => value,
                            CompositionOp::Union => union(kind, &existing, &value)?,
                            CompositionOp::Intersection => intersection(kind, &existing, &value)?,
                        };
                        result.insert(kind, combined);
                    }
                }
            }
        }
        let mut bag = Self(result);
        bag.flatten_in_place();
        Ok(bag)
    }

    /// Intersects `self` with `other`, returning the flattened result.
    ///
    /// # Errors
    ///
    /// See [`OptionBag::compose`].
    pub fn intersect_with(&self, other: &Self) -> VfsResult<Self> {
        Self::compose(CompositionOp::Intersection, &[self, other])
    }

    /// Unions `self` with `other`, returning the flattened result.
    ///
    /// # Errors
    ///
    /// See [`OptionBag::compose`].
    pub fn union_with(&self, other: &Self) -> VfsResult<Self> {
        Self::compose(CompositionOp::Union, &[self, other])
    }
}

impl PartialEq for OptionBag {
    fn eq(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        self.0.iter().all(|(kind, value)| {
            other.0.get(kind).is_some_and(|other_value| match (value, other_value) {
                (OptionValue::Bool(a), OptionValue::Bool(b)) => a == b,
                (OptionValue::SubPath(a), OptionValue::SubPath(b)) => a == b,
                (OptionValue::Token(a), OptionValue::Token(b)) => Arc::ptr_eq(a, b),
                _ => false,
            })
        })
    }
}

/// A value able to speak for several option kinds at once, e.g. a composite
/// credential object that also advertises a `sub-path`. `OptionBag` itself
/// always implements this trivially.
pub trait AdaptableOption {
    /// Projects this value onto the option-kind → value mapping it
    /// contributes to a composition.
    fn adapt(&self) -> OptionBag;
}

impl AdaptableOption for OptionBag {
    fn adapt(&self) -> OptionBag {
        self.clone()
    }
}
