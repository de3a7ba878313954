use serde::{Deserialize, Serialize};

use crate::types::{ColumnId, DataType, TableId};

/// What kind of relation a catalog entry describes.
///
/// The executor branches on this when validating row-lock targets: only
/// ordinary and partitioned tables can carry every lock kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RelKind {
    #[default]
    Table,
    /// Partitioned table root. Never stores rows itself; leaf partitions do.
    PartitionedTable,
    View,
    ForeignTable,
    Sequence,
}

impl RelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelKind::Table => "table",
            RelKind::PartitionedTable => "partitioned table",
            RelKind::View => "view",
            RelKind::ForeignTable => "foreign table",
            RelKind::Sequence => "sequence",
        }
    }
}

/// Durability class of a relation.
///
/// Temporary relations are exempt from the read-only transaction check:
/// they are session-private, so writing them cannot violate read-only
/// semantics visible to other sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RelPersistence {
    #[default]
    Permanent,
    Temporary,
}

/// Column definition in a table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub id: ColumnId,
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

/// Table schema metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub id: TableId,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub kind: RelKind,
    #[serde(default)]
    pub persistence: RelPersistence,
}

impl TableSchema {
    pub fn new(id: TableId, name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            id,
            name: name.into(),
            columns,
            kind: RelKind::Table,
            persistence: RelPersistence::Permanent,
        }
    }

    pub fn with_kind(mut self, kind: RelKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_persistence(mut self, persistence: RelPersistence) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn is_temporary(&self) -> bool {
        self.persistence == RelPersistence::Temporary
    }

    /// Row shape of the stored tuples.
    pub fn tuple_desc(&self) -> TupleDesc {
        TupleDesc {
            attrs: self
                .columns
                .iter()
                .map(|c| TupleAttr {
                    name: c.name.clone(),
                    data_type: c.data_type.clone(),
                })
                .collect(),
        }
    }
}

/// A single attribute of a tuple shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleAttr {
    pub name: String,
    pub data_type: DataType,
}

/// Describes the shape of tuples flowing out of a plan node, and of the
/// final result handed to the caller.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TupleDesc {
    pub attrs: Vec<TupleAttr>,
}

impl TupleDesc {
    pub fn new(attrs: Vec<TupleAttr>) -> Self {
        Self { attrs }
    }

    pub fn arity(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}
