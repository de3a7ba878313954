use thiserror::Error;

use crate::types::{RangeTableIndex, TableId};

/// Convenience alias for `Result<T, HeronError>`.
pub type HeronResult<T> = Result<T, HeronError>;

/// Error classification for reporting/escalation decisions.
///
/// - `UserError`   — bad input, illegal statement for the session state,
///   permission denied; reported to the client and never retried
/// - `InternalBug` — upstream contract breach (bad planner output); should
///   never happen in correct operation, triggers alert + diagnostic dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserError,
    InternalBug,
}

/// Top-level error type that all crate-specific errors convert into.
#[derive(Error, Debug)]
pub enum HeronError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transaction error: {0}")]
    Txn(#[from] TxnError),

    #[error("Execution error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Read-only: {0}")]
    ReadOnly(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// Internal bug — should never occur in production.
    /// Always carries a unique `error_code` and `debug_context` for post-mortem.
    #[error("InternalBug [{error_code}]: {message} | context: {debug_context}")]
    InternalBug {
        error_code: &'static str,
        message: String,
        debug_context: String,
    },
}

/// Storage / catalog layer errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Table not found: {0}")]
    TableNotFound(TableId),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),
}

/// Transaction layer errors.
#[derive(Error, Debug)]
pub enum TxnError {
    #[error("Snapshot {0} is not registered")]
    SnapshotNotRegistered(u64),

    #[error("Command counter exhausted in current transaction")]
    CommandCounterExhausted,
}

/// Execution engine errors.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Permission denied for {relation}: {reason}")]
    PermissionDenied { relation: String, reason: String },

    #[error("Cannot execute {command} during a parallel operation")]
    ParallelModeWrite { command: String },

    #[error("Cannot lock rows in {kind} \"{relation}\"")]
    InvalidRowMarkTarget { relation: String, kind: &'static str },

    #[error("Range-table reference {0} is out of range")]
    RangeTableIndexOutOfRange(RangeTableIndex),
}

// ── HeronError classification & helpers ──────────────────────────────────────

impl HeronError {
    /// Classify this error for reporting/escalation decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HeronError::ReadOnly(_) => ErrorKind::UserError,
            HeronError::Storage(StorageError::TableNotFound(_)) => ErrorKind::UserError,
            HeronError::Storage(StorageError::TableAlreadyExists(_)) => ErrorKind::UserError,
            HeronError::Executor(ExecutorError::PermissionDenied { .. }) => ErrorKind::UserError,
            HeronError::Executor(ExecutorError::ParallelModeWrite { .. }) => ErrorKind::UserError,
            HeronError::Executor(ExecutorError::InvalidRowMarkTarget { .. }) => {
                ErrorKind::UserError
            }

            // Everything else is an internal bug
            HeronError::Executor(ExecutorError::RangeTableIndexOutOfRange(_)) => {
                ErrorKind::InternalBug
            }
            HeronError::Txn(_) => ErrorKind::InternalBug,
            HeronError::Internal(_) => ErrorKind::InternalBug,
            HeronError::InternalBug { .. } => ErrorKind::InternalBug,
        }
    }

    /// Returns true if this is a user/input error (4xx equivalent).
    pub fn is_user_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::UserError)
    }

    /// Returns true if this is an internal bug that should never occur.
    pub fn is_internal_bug(&self) -> bool {
        matches!(self.kind(), ErrorKind::InternalBug)
    }

    /// Map to a PostgreSQL SQLSTATE code.
    pub fn pg_sqlstate(&self) -> &'static str {
        match self {
            HeronError::ReadOnly(_) => "25006", // read_only_sql_transaction
            HeronError::Storage(StorageError::TableNotFound(_)) => "42P01", // undefined_table
            HeronError::Storage(StorageError::TableAlreadyExists(_)) => "42P07", // duplicate_table
            HeronError::Executor(ExecutorError::PermissionDenied { .. }) => "42501", // insufficient_privilege
            HeronError::Executor(ExecutorError::ParallelModeWrite { .. }) => "25000", // invalid_transaction_state
            HeronError::Executor(ExecutorError::InvalidRowMarkTarget { .. }) => "42809", // wrong_object_type
            HeronError::Executor(ExecutorError::RangeTableIndexOutOfRange(_)) => "XX000", // internal_error
            HeronError::Txn(_) => "XX000",
            HeronError::Internal(_) => "XX000",
            HeronError::InternalBug { .. } => "XX000",
        }
    }

    /// Map to a PostgreSQL severity string.
    pub fn pg_severity(&self) -> &'static str {
        match self.kind() {
            ErrorKind::UserError => "ERROR",
            ErrorKind::InternalBug => "FATAL",
        }
    }

    /// Construct an internal bug error with error code and context.
    pub fn internal_bug(
        error_code: &'static str,
        message: impl Into<String>,
        debug_context: impl Into<String>,
    ) -> Self {
        HeronError::InternalBug {
            error_code,
            message: message.into(),
            debug_context: debug_context.into(),
        }
    }

    /// Emit a structured log entry for Fatal/InternalBug errors.
    /// Must be called for every Fatal error before returning to the client.
    pub fn log_if_fatal(&self) {
        if let HeronError::InternalBug {
            error_code,
            message,
            debug_context,
        } = self
        {
            tracing::error!(
                error_code = error_code,
                error_category = "Fatal",
                sqlstate = self.pg_sqlstate(),
                debug_context = debug_context.as_str(),
                "FATAL [{}]: {} | context: {}",
                error_code,
                message,
                debug_context
            );
        }
    }
}
