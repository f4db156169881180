//! Per-object serialization.
//!
//! Two levels of keyed async locks:
//!
//! - every access group has a read/write barrier. Object events share it,
//!   group events hold it exclusively, so a group-wide update never
//!   interleaves with a handler of one of the group's objects;
//! - every object has a mutex, so events for one object run one at a time.
//!
//! Locks are taken group first, object second. Entries are dropped once no
//! task holds or waits on them.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use workspace_indexer_shared::EventScope;

type GroupMap = DashMap<EventScope, Arc<RwLock<()>>>;
type ObjectMap = DashMap<EventScope, Arc<Mutex<()>>>;

/// Keyed locks, one per access group and object in use.
#[derive(Default)]
pub struct ObjectLocks {
    groups: Arc<GroupMap>,
    objects: Arc<ObjectMap>,
}

impl ObjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for access to `scope`.
    ///
    /// An object scope is exclusive for that object and shared with the
    /// other objects of its group. A group scope is exclusive for the
    /// whole group. tokio's locks are fair, so waiters are served in
    /// arrival order.
    pub async fn lock(&self, scope: &EventScope) -> ScopeGuard {
        let group_key = scope.group_scope();
        let barrier = shared_entry(&self.groups, &group_key, || RwLock::new(()));

        match scope {
            EventScope::AccessGroup { .. } => {
                // The map shard lock is released before awaiting
                let guard = barrier.write_owned().await;
                ScopeGuard {
                    object: None,
                    shared: None,
                    exclusive: Some(guard),
                    group_key,
                    object_key: None,
                    locks: self.handles(),
                }
            }
            EventScope::Object(_) => {
                let group = barrier.read_owned().await;
                let mutex = shared_entry(&self.objects, scope, || Mutex::new(()));
                let object = mutex.lock_owned().await;
                ScopeGuard {
                    object: Some(object),
                    shared: Some(group),
                    exclusive: None,
                    group_key,
                    object_key: Some(scope.clone()),
                    locks: self.handles(),
                }
            }
        }
    }

    /// Number of groups and objects currently held or awaited.
    pub fn active(&self) -> usize {
        self.groups.len() + self.objects.len()
    }

    fn handles(&self) -> (Arc<GroupMap>, Arc<ObjectMap>) {
        (Arc::clone(&self.groups), Arc::clone(&self.objects))
    }
}

fn shared_entry<K, T>(map: &DashMap<K, Arc<T>>, key: &K, init: impl FnOnce() -> T) -> Arc<T>
where
    K: Eq + Hash + Clone,
{
    map.entry(key.clone())
        .or_insert_with(|| Arc::new(init()))
        .clone()
}

/// Access to one scope; released on drop.
pub struct ScopeGuard {
    object: Option<OwnedMutexGuard<()>>,
    shared: Option<OwnedRwLockReadGuard<()>>,
    exclusive: Option<OwnedRwLockWriteGuard<()>>,
    group_key: EventScope,
    object_key: Option<EventScope>,
    locks: (Arc<GroupMap>, Arc<ObjectMap>),
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let (groups, objects) = &self.locks;

        drop(self.object.take());
        if let Some(object_key) = &self.object_key {
            objects.remove_if(object_key, |_, mutex| Arc::strong_count(mutex) == 1);
        }

        drop(self.shared.take());
        drop(self.exclusive.take());
        groups.remove_if(&self.group_key, |_, barrier| Arc::strong_count(barrier) == 1);
    }
}
