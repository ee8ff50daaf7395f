//! Classification result cache
//!
//! Profiles are pure functions of their descriptor, so a cache only saves the
//! keyword scans and hint parsing. The cache is an explicit object handed to
//! the classifier; there is no process-wide memoization.
//!
//! Eviction policy: the cache holds at most `capacity` profiles. Inserting a
//! new descriptor into a full cache evicts the oldest inserted descriptor
//! (FIFO). Re-inserting an existing descriptor replaces its profile without
//! changing its position (last write wins).

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use crate::descriptor::DeviceDescriptor;
use crate::profile::DeviceProfile;

/// Default number of cached profiles
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<DeviceDescriptor, DeviceProfile>,
    /// Insertion order for eviction
    order: VecDeque<DeviceDescriptor>,
}

/// Read-mostly cache of classification results, safe to share across threads
#[derive(Debug)]
pub struct ProfileCache {
    capacity: usize,
    inner: RwLock<CacheInner>,
}

impl Default for ProfileCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ProfileCache {
    /// Create a cache holding at most `capacity` profiles (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(CacheInner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up a cached profile
    pub fn get(&self, descriptor: &DeviceDescriptor) -> Option<DeviceProfile> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.entries.get(descriptor).cloned()
    }

    /// Store a profile, evicting the oldest entry if the cache is full
    pub fn insert(&self, descriptor: DeviceDescriptor, profile: DeviceProfile) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = inner.entries.get_mut(&descriptor) {
            *existing = profile;
            return;
        }

        while inner.entries.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }

        inner.order.push_back(descriptor.clone());
        inner.entries.insert(descriptor, profile);
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached profile
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.entries.clear();
        inner.order.clear();
    }
}
