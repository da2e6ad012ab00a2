//! Generation-counted handles for resource references.
//!
//! Every resource the core hands out is denoted by a [`Handle`]: an index
//! plus a generation counter, tagged with the resource kind so handles from
//! different subsystems cannot be confused. Slots are reused, but each reuse
//! bumps the slot's generation; dereferencing a handle whose generation no
//! longer matches fails with `InvalidHandle` instead of touching the new
//! occupant.
//!
//! Index `0` is reserved as the invalid handle in every kind namespace.

use crate::error::{Error, ErrorKind, Result};
use core::fmt;
use core::hash::Hash;
use core::marker::PhantomData;
use serde::{Deserialize, Serialize};
use slab::Slab;

/// Marker trait for handle kind tags.
///
/// Each resource type defines a zero-sized tag implementing this trait; the
/// tag's `NAME` shows up in Debug output and error context.
pub trait HandleKind: Copy + Eq + Hash + Send + Sync + 'static {
    /// Short name of the resource kind, e.g. `"allocation"`.
    const NAME: &'static str;
}

/// The untyped interior of a handle: a slot index and a generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RawHandle {
    index: u32,
    generation: u32,
}

impl RawHandle {
    /// The reserved invalid handle (index 0).
    pub const INVALID: Self = Self {
        index: 0,
        generation: 0,
    };

    /// Creates a raw handle from parts.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the slot index. Zero means invalid.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation for this slot use.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// True if this is the reserved invalid handle.
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.index == 0
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle({}:{})", self.index, self.generation)
    }
}

/// A typed, generation-counted reference to a resource of kind `K`.
pub struct Handle<K: HandleKind> {
    raw: RawHandle,
    _kind: PhantomData<K>,
}

impl<K: HandleKind> Handle<K> {
    /// The reserved invalid handle for this kind.
    pub const INVALID: Self = Self {
        raw: RawHandle::INVALID,
        _kind: PhantomData,
    };

    /// Wraps a raw handle with this kind tag.
    #[must_use]
    pub const fn from_raw(raw: RawHandle) -> Self {
        Self {
            raw,
            _kind: PhantomData,
        }
    }

    /// Returns the untyped interior.
    #[must_use]
    pub const fn raw(self) -> RawHandle {
        self.raw
    }

    /// Returns the slot index. Zero means invalid.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.raw.index()
    }

    /// Returns the generation for this slot use.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.raw.generation()
    }

    /// True if this is the reserved invalid handle.
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.raw.is_invalid()
    }
}

impl<K: HandleKind> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: HandleKind> Copy for Handle<K> {}

impl<K: HandleKind> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K: HandleKind> Eq for Handle<K> {}

impl<K: HandleKind> Hash for Handle<K> {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<K: HandleKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Handle<{}>({}:{})",
            K::NAME,
            self.raw.index(),
            self.raw.generation()
        )
    }
}

impl<K: HandleKind> fmt::Display for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", K::NAME, self.raw.index())
    }
}

/// A slot table mapping handles of kind `K` to values of type `T`.
///
/// Backed by a slab; generations live in a parallel vector so they survive
/// slot reuse. External indices are offset by one so index 0 stays reserved.
#[derive(Debug)]
pub struct HandleTable<K: HandleKind, T> {
    slots: Slab<T>,
    generations: Vec<u32>,
    _kind: PhantomData<K>,
}

impl<K: HandleKind, T> HandleTable<K, T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Slab::new(),
            generations: Vec::new(),
            _kind: PhantomData,
        }
    }

    /// Creates an empty table with room for `capacity` live entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Slab::with_capacity(capacity),
            generations: Vec::with_capacity(capacity),
            _kind: PhantomData,
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if no entries are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Inserts a value and returns its handle.
    pub fn insert(&mut self, value: T) -> Handle<K> {
        let key = self.slots.insert(value);
        if key >= self.generations.len() {
            // First use of a fresh slot starts at generation 1.
            self.generations.resize(key + 1, 0);
            self.generations[key] = 1;
        }
        let index = u32::try_from(key + 1).unwrap_or(u32::MAX);
        Handle::from_raw(RawHandle::new(index, self.generations[key]))
    }

    fn slot_of(&self, handle: Handle<K>) -> Result<usize> {
        if handle.is_invalid() {
            return Err(Error::new(ErrorKind::InvalidHandle, "invalid handle"));
        }
        let key = handle.index() as usize - 1;
        if key >= self.generations.len()
            || self.generations[key] != handle.generation()
            || !self.slots.contains(key)
        {
            return Err(Error::new(ErrorKind::InvalidHandle, "stale handle"));
        }
        Ok(key)
    }

    /// Returns a reference to the value, or `InvalidHandle` if stale.
    pub fn get(&self, handle: Handle<K>) -> Result<&T> {
        let key = self.slot_of(handle)?;
        self.slots
            .get(key)
            .ok_or_else(|| Error::new(ErrorKind::InvalidHandle, "stale handle"))
    }

    /// Returns a mutable reference to the value, or `InvalidHandle` if stale.
    pub fn get_mut(&mut self, handle: Handle<K>) -> Result<&mut T> {
        let key = self.slot_of(handle)?;
        self.slots
            .get_mut(key)
            .ok_or_else(|| Error::new(ErrorKind::InvalidHandle, "stale handle"))
    }

    /// True if the handle currently refers to a live entry.
    #[must_use]
    pub fn contains(&self, handle: Handle<K>) -> bool {
        self.slot_of(handle).is_ok()
    }

    /// Removes the value, invalidating the handle.
    ///
    /// The slot's generation is bumped so a later reuse of the same index
    /// yields a distinguishable handle.
    pub fn remove(&mut self, handle: Handle<K>) -> Result<T> {
        let key = self.slot_of(handle)?;
        self.generations[key] = self.generations[key].wrapping_add(1).max(1);
        Ok(self.slots.remove(key))
    }

    /// Iterates over live `(handle, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<K>, &T)> {
        self.slots.iter().map(|(key, value)| {
            let index = u32::try_from(key + 1).unwrap_or(u32::MAX);
            let handle = Handle::from_raw(RawHandle::new(index, self.generations[key]));
            (handle, value)
        })
    }
}

impl<K: HandleKind, T> Default for HandleTable<K, T> {
    fn default() -> Self {
        Self::new()
    }
}
