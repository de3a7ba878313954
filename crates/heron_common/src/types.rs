use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a table within the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId(pub u64);

/// Unique identifier for a column within a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnId(pub u32);

/// Transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnId(pub u64);

/// Logical timestamp for MVCC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const MIN: Timestamp = Timestamp(0);
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    pub fn next(self) -> Timestamp {
        Timestamp(self.0 + 1)
    }
}

/// Command identifier within a transaction.
///
/// Stamped on rows written by a statement so that later statements of the
/// same transaction can see them (or not) under the transaction's snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct CommandId(pub u32);

impl CommandId {
    pub const FIRST: CommandId = CommandId(0);

    pub fn next(self) -> CommandId {
        CommandId(self.0 + 1)
    }
}

/// 1-based position of a table reference in a statement's range table.
///
/// Index-aligned arrays in the executor are addressed by `slot()`, i.e.
/// position minus one. Position 0 is never a valid reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeTableIndex(pub usize);

impl RangeTableIndex {
    /// Zero-based slot for index-aligned per-reference arrays.
    pub fn slot(self) -> usize {
        self.0 - 1
    }

    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

/// Physical location of a row version, as cached by a row-locking
/// descriptor. Encoding is owned by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowKey(pub Vec<u8>);

/// Statement kind as classified by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmdType {
    Select,
    Insert,
    Update,
    Delete,
    /// Utility statements never reach the executor; the planner routes them
    /// elsewhere. Seeing one here is an upstream contract breach.
    Utility,
}

impl CmdType {
    pub fn is_write(self) -> bool {
        matches!(self, CmdType::Insert | CmdType::Update | CmdType::Delete)
    }
}

impl fmt::Display for CmdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmdType::Select => "SELECT",
            CmdType::Insert => "INSERT",
            CmdType::Update => "UPDATE",
            CmdType::Delete => "DELETE",
            CmdType::Utility => "UTILITY",
        };
        write!(f, "{s}")
    }
}

/// Scan direction for the current execution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanDirection {
    Backward,
    NoMovement,
    #[default]
    Forward,
}

/// SQL data types supported by HeronDB.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float64,
    Text,
    Timestamp,
}

impl DataType {
    /// Return the PG OID for this type.
    pub fn pg_oid(&self) -> i32 {
        match self {
            DataType::Boolean => 16,
            DataType::Int32 => 23,
            DataType::Int64 => 20,
            DataType::Float64 => 701,
            DataType::Text => 25,
            DataType::Timestamp => 1114,
        }
    }

    /// Byte size hint (-1 for variable length).
    pub fn type_len(&self) -> i16 {
        match self {
            DataType::Boolean => 1,
            DataType::Int32 => 4,
            DataType::Int64 => 8,
            DataType::Float64 => 8,
            DataType::Text => -1,
            DataType::Timestamp => 8,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Int32 => write!(f, "INT"),
            DataType::Int64 => write!(f, "BIGINT"),
            DataType::Float64 => write!(f, "FLOAT8"),
            DataType::Text => write!(f, "TEXT"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tbl:{}", self.0)
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ts:{}", self.0)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cid:{}", self.0)
    }
}

impl fmt::Display for RangeTableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rti:{}", self.0)
    }
}
