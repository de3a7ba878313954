pub mod manager;
pub mod snapshot;


pub use manager::TxnHandle;
pub use snapshot::{RegisteredSnapshot, Snapshot, SnapshotId, SnapshotRegistry};
