use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use heron_common::types::{CommandId, TxnId};

/// Unique identifier for a snapshot within the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotId(pub u64);

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "snap:{}", self.0)
    }
}

/// A point-in-time visibility rule: which transactions' effects a reader
/// may see, plus the command id boundary within its own transaction.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: SnapshotId,
    /// Everything below this id is settled (committed or aborted).
    pub xmin: TxnId,
    /// This id and above had not started when the snapshot was taken.
    pub xmax: TxnId,
    /// Transactions in `[xmin, xmax)` that were still running.
    pub active_txns: Vec<TxnId>,
    /// Within the snapshot's own transaction, effects of commands at or
    /// after this id are invisible.
    pub command_id: CommandId,
}

impl Snapshot {
    /// Whether `txn` was still in progress when this snapshot was taken.
    pub fn considers_in_progress(&self, txn: TxnId) -> bool {
        txn >= self.xmax || self.active_txns.contains(&txn)
    }
}

struct RegistryEntry {
    snapshot: Arc<Snapshot>,
    refcount: u32,
}

/// Process-wide table of snapshots currently pinned by running queries.
///
/// Registration pins a snapshot (storage GC must preserve row versions it
/// can see); each registration must be balanced by exactly one release.
/// [`RegisteredSnapshot`] enforces the balance: explicit
/// [`RegisteredSnapshot::unregister`] on the normal path, release-on-drop
/// on unwind paths.
#[derive(Default)]
pub struct SnapshotRegistry {
    entries: DashMap<u64, RegistryEntry>,
    next_id: AtomicU64,
}

impl SnapshotRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Produce a fresh snapshot owned by this registry. Real ids come from
    /// the transaction manager; the registry only needs them unique.
    pub fn snapshot(
        &self,
        xmin: TxnId,
        xmax: TxnId,
        active_txns: Vec<TxnId>,
        command_id: CommandId,
    ) -> Arc<Snapshot> {
        let id = SnapshotId(self.next_id.fetch_add(1, Ordering::Relaxed));
        Arc::new(Snapshot {
            id,
            xmin,
            xmax,
            active_txns,
            command_id,
        })
    }

    /// Pin `snapshot` and return the handle that must balance the pin.
    pub fn register(self: &Arc<Self>, snapshot: Arc<Snapshot>) -> RegisteredSnapshot {
        let id = snapshot.id;
        self.entries
            .entry(id.0)
            .and_modify(|e| e.refcount += 1)
            .or_insert_with(|| RegistryEntry {
                snapshot: Arc::clone(&snapshot),
                refcount: 1,
            });
        RegisteredSnapshot {
            id,
            snapshot,
            registry: Arc::clone(self),
            released: false,
        }
    }

    /// Current pin count for a snapshot, if registered.
    pub fn refcount(&self, id: SnapshotId) -> Option<u32> {
        self.entries.get(&id.0).map(|e| e.refcount)
    }

    /// Number of distinct snapshots currently pinned.
    pub fn active_count(&self) -> usize {
        self.entries.len()
    }

    /// Oldest xmin across pinned snapshots; the GC horizon.
    pub fn oldest_xmin(&self) -> Option<TxnId> {
        self.entries
            .iter()
            .map(|e| e.snapshot.xmin)
            .min()
    }

    fn release(&self, id: SnapshotId) {
        let remove = match self.entries.get_mut(&id.0) {
            Some(mut entry) => {
                entry.refcount -= 1;
                entry.refcount == 0
            }
            None => {
                tracing::warn!(snapshot = %id, "release of unregistered snapshot");
                return;
            }
        };
        if remove {
            self.entries.remove(&id.0);
        }
    }
}

/// One pin on a registered snapshot.
///
/// Releases exactly once: either through [`Self::unregister`] or, failing
/// that, when dropped. Initialization failure paths therefore cannot leak
/// a pin, and the normal path cannot double-release.
pub struct RegisteredSnapshot {
    id: SnapshotId,
    snapshot: Arc<Snapshot>,
    registry: Arc<SnapshotRegistry>,
    released: bool,
}

impl RegisteredSnapshot {
    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    /// Release this pin.
    pub fn unregister(mut self) {
        self.registry.release(self.id);
        self.released = true;
    }
}

impl Drop for RegisteredSnapshot {
    fn drop(&mut self) {
        if !self.released {
            self.registry.release(self.id);
        }
    }
}

impl fmt::Debug for RegisteredSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredSnapshot")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}
