// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Copy-on-read ordered list.
//!
//! [`SnapshotList`] keeps its items in an `Arc<Vec<T>>` behind a mutex.
//! Readers take a [`Snapshot`] (one `Arc` clone under the lock) and iterate
//! it after the lock is released, so writers are never blocked by a long
//! iteration and an iteration never observes a half-applied mutation.
//! Writers clone the vector only while a snapshot of it is still alive.

use core::fmt;
use core::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

/// An immutable, ordered view of a [`SnapshotList`] at one point in time.
pub struct Snapshot<T> {
    items: Arc<Vec<T>>,
}

impl<T> Snapshot<T> {
    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Deref for Snapshot<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<'a, T> IntoIterator for &'a Snapshot<T> {
    type Item = &'a T;
    type IntoIter = core::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

/// A mutex-guarded, copy-on-write ordered list.
pub struct SnapshotList<T> {
    items: Mutex<Arc<Vec<T>>>,
}

impl<T> Default for SnapshotList<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Arc::new(Vec::new())),
        }
    }
}

impl<T: Clone> SnapshotList<T> {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a consistent view of the current items.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<T> {
        Snapshot {
            items: Arc::clone(&self.items.lock()),
        }
    }

    /// Appends `item` unless an existing entry satisfies `is_duplicate`.
    ///
    /// Returns whether the item was added.
    pub fn push_unique(&self, item: T, is_duplicate: impl Fn(&T) -> bool) -> bool {
        let mut guard = self.items.lock();
        if guard.iter().any(&is_duplicate) {
            return false;
        }
        Arc::make_mut(&mut guard).push(item);
        true
    }

    /// Removes every item matching `pred` and returns how many were removed.
    ///
    /// Removed items are dropped after the lock is released.
    pub fn remove_where(&self, pred: impl Fn(&T) -> bool) -> usize {
        let mut removed = Vec::new();
        {
            let mut guard = self.items.lock();
            if !guard.iter().any(&pred) {
                return 0;
            }
            let items = Arc::make_mut(&mut guard);
            let mut kept = Vec::with_capacity(items.len());
            for item in items.drain(..) {
                if pred(&item) {
                    removed.push(item);
                } else {
                    kept.push(item);
                }
            }
            *items = kept;
        }
        removed.len()
    }

    /// Removes all items, returning them in order.
    pub fn clear(&self) -> Vec<T> {
        let old = core::mem::take(&mut *self.items.lock());
        Arc::try_unwrap(old).unwrap_or_else(|shared| (*shared).clone())
    }

    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T> fmt::Debug for SnapshotList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotList")
            .field("len", &self.items.lock().len())
            .finish_non_exhaustive()
    }
}
