use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use heron_common::error::TxnError;
use heron_common::types::{CommandId, TxnId};

/// Per-statement command counter state.
///
/// A command id is handed out unchanged until something marks it used
/// (i.e. stamps it on written rows); only then does the next increment
/// actually advance the counter. This keeps ids dense and lets pure reads
/// share the id of the preceding write.
#[derive(Debug)]
struct CommandCounter {
    current: CommandId,
    used: bool,
}

/// Handle to an active transaction. Held by the session and consulted by
/// the executor for mode checks and command-id assignment.
#[derive(Debug)]
pub struct TxnHandle {
    pub txn_id: TxnId,
    /// Transaction access mode (READ ONLY / READ WRITE). When true, any
    /// DML against non-temporary tables is rejected.
    read_only: bool,
    /// True while this process runs as part of a parallel operation.
    /// Writes are forbidden in this mode.
    parallel_mode: AtomicBool,
    command_counter: Mutex<CommandCounter>,
}

impl TxnHandle {
    pub fn new(txn_id: TxnId) -> Self {
        Self {
            txn_id,
            read_only: false,
            parallel_mode: AtomicBool::new(false),
            command_counter: Mutex::new(CommandCounter {
                current: CommandId::FIRST,
                used: false,
            }),
        }
    }

    /// Create a handle for a READ ONLY transaction.
    pub fn new_read_only(txn_id: TxnId) -> Self {
        Self {
            read_only: true,
            ..Self::new(txn_id)
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn in_parallel_mode(&self) -> bool {
        self.parallel_mode.load(Ordering::Acquire)
    }

    pub fn enter_parallel_mode(&self) {
        self.parallel_mode.store(true, Ordering::Release);
    }

    pub fn exit_parallel_mode(&self) {
        self.parallel_mode.store(false, Ordering::Release);
    }

    /// Current command id. With `mark_used`, the id is recorded as stamped
    /// on output rows, so the next [`Self::command_counter_increment`]
    /// advances.
    pub fn current_command_id(&self, mark_used: bool) -> CommandId {
        let mut counter = self.command_counter.lock();
        if mark_used {
            counter.used = true;
        }
        counter.current
    }

    /// Whether the current command id has been stamped on any output row.
    pub fn command_id_used(&self) -> bool {
        self.command_counter.lock().used
    }

    /// Advance to the next command id, if the current one was used.
    /// Returns the id in effect afterwards.
    pub fn command_counter_increment(&self) -> Result<CommandId, TxnError> {
        let mut counter = self.command_counter.lock();
        if counter.used {
            if counter.current.0 == u32::MAX {
                return Err(TxnError::CommandCounterExhausted);
            }
            counter.current = counter.current.next();
            counter.used = false;
        }
        Ok(counter.current)
    }
}
