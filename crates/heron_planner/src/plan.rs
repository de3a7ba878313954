use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use heron_common::config::JitFlags;
use heron_common::datum::Datum;
use heron_common::types::{CmdType, DataType, RangeTableIndex, TableId};

/// The planner's output for one statement — everything the executor needs
/// to prepare a run-time state.
#[derive(Debug, Clone)]
pub struct PlannedStmt {
    pub command: CmdType,
    /// Root of the main plan tree.
    pub plan_tree: PlanNode,
    /// Normalized table-reference set. Positions are 1-based
    /// ([`RangeTableIndex`]); entry `rti` lives at `rti - 1`.
    pub range_table: Vec<RangeTblEntry>,
    /// References targeted by a write. Empty for read-only statements.
    pub result_relations: Vec<RangeTableIndex>,
    /// Partitioned-table roots behind the leaf targets in
    /// `result_relations`. Needed only for statement-level triggers and
    /// run-time row routing.
    pub root_result_relations: Vec<RangeTableIndex>,
    /// Sub-plan fragments referenced from the main tree. Sub-plan ids are
    /// 1-based positions into this list.
    pub subplans: Vec<PlanNode>,
    /// 1-based ids of sub-plans that are parameterless and safe to prepare
    /// for efficient rewind.
    pub rewind_plan_ids: HashSet<usize>,
    /// Planner-level row-locking requests (FOR UPDATE/SHARE et al.).
    pub row_marks: Vec<PlanRowMark>,
    /// Number of executor-internal parameter slots the plan uses.
    pub num_internal_params: usize,
    /// True when a WITH clause contains INSERT/UPDATE/DELETE.
    pub has_modifying_cte: bool,
    /// True when the planner decided parallel workers could help.
    pub parallel_mode_needed: bool,
    pub jit_flags: JitFlags,
}

impl PlannedStmt {
    /// A statement with just a command, a tree, and a range table; every
    /// other field empty. Planner code fills in the rest as it goes.
    pub fn new(command: CmdType, plan_tree: PlanNode, range_table: Vec<RangeTblEntry>) -> Self {
        Self {
            command,
            plan_tree,
            range_table,
            result_relations: Vec::new(),
            root_result_relations: Vec::new(),
            subplans: Vec::new(),
            rewind_plan_ids: HashSet::new(),
            row_marks: Vec::new(),
            num_internal_params: 0,
            has_modifying_cte: false,
            parallel_mode_needed: false,
            jit_flags: JitFlags::default(),
        }
    }

    pub fn range_table_entry(&self, rti: RangeTableIndex) -> Option<&RangeTblEntry> {
        if !rti.is_valid() {
            return None;
        }
        self.range_table.get(rti.slot())
    }
}

/// One entry of the normalized table-reference set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeTblEntry {
    pub alias: String,
    pub kind: RteKind,
    /// What the statement does with this reference; checked against the
    /// caller's privileges before any table is opened.
    pub required_access: AccessMode,
}

impl RangeTblEntry {
    pub fn relation(table_id: TableId, alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            kind: RteKind::Relation { table_id },
            required_access: AccessMode::Read,
        }
    }

    pub fn for_write(mut self) -> Self {
        self.required_access = AccessMode::Write;
        self
    }

    /// Catalog identity, when this reference names a real relation.
    pub fn relation_id(&self) -> Option<TableId> {
        match self.kind {
            RteKind::Relation { table_id } => Some(table_id),
            _ => None,
        }
    }
}

/// The kind of thing a range-table entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RteKind {
    Relation { table_id: TableId },
    Subquery,
    Values,
}

/// Access class a statement needs on a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    Read,
    Write,
}

/// Row-lock strength/kind requested for a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowMarkKind {
    /// FOR UPDATE.
    Exclusive,
    /// FOR NO KEY UPDATE.
    NoKeyExclusive,
    /// FOR SHARE.
    Share,
    /// FOR KEY SHARE.
    KeyShare,
    /// No lock taken; the row identity is carried so the row can be
    /// re-fetched from its table.
    Reference,
    /// No lock and no table access; a full copy of the row was captured at
    /// plan time.
    Copy,
}

impl RowMarkKind {
    /// Whether this kind needs the table opened at initialization.
    pub fn needs_relation(self) -> bool {
        !matches!(self, RowMarkKind::Copy)
    }
}

/// What to do when a to-be-locked row is already locked elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RowWaitPolicy {
    #[default]
    Block,
    /// SKIP LOCKED.
    Skip,
    /// NOWAIT.
    Error,
}

/// Planner-level row-locking request, one per referenced table that a
/// FOR UPDATE/SHARE clause (or similar) reaches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRowMark {
    pub rti: RangeTableIndex,
    /// Parent reference position, for marks pushed down through a
    /// partitioned table. Equal to `rti` when there is no parent.
    pub prti: RangeTableIndex,
    pub rowmark_id: u32,
    pub kind: RowMarkKind,
    pub wait_policy: RowWaitPolicy,
    /// Parent markers describe a partitioned table's ancestor and carry no
    /// run-time meaning; the executor skips them.
    pub is_parent: bool,
}

/// A bound scalar expression. Column references are resolved to positions
/// at plan time, so the executor never sees names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoundExpr {
    ColumnRef(usize),
    Literal(Datum),
}

/// One output column of a plan node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEntry {
    pub expr: BoundExpr,
    pub name: String,
    pub data_type: DataType,
    /// Administrative column carried for the executor's own bookkeeping
    /// (row identity for locking, ordering keys); stripped from the shape
    /// the caller sees.
    pub resjunk: bool,
}

impl TargetEntry {
    pub fn column(col: usize, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            expr: BoundExpr::ColumnRef(col),
            name: name.into(),
            data_type,
            resjunk: false,
        }
    }

    pub fn junk(mut self) -> Self {
        self.resjunk = true;
        self
    }
}

/// Physical plan node — the tree of operators to prepare and execute.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum PlanNode {
    /// Full scan of one referenced table.
    SeqScan {
        rti: RangeTableIndex,
        target_list: Vec<TargetEntry>,
        qual: Option<BoundExpr>,
    },
    /// Projection over an optional child; with no child, produces exactly
    /// one row (SELECT without FROM).
    Result {
        child: Option<Box<PlanNode>>,
        target_list: Vec<TargetEntry>,
    },
    /// In-memory sort of the child's output.
    Sort {
        child: Box<PlanNode>,
        sort_cols: Vec<usize>,
    },
    /// LIMIT/OFFSET window over the child's output.
    Limit {
        child: Box<PlanNode>,
        limit: Option<u64>,
        offset: u64,
    },
    /// Nested-loop join of two children.
    NestLoop {
        outer: Box<PlanNode>,
        inner: Box<PlanNode>,
        join_qual: Option<BoundExpr>,
        target_list: Vec<TargetEntry>,
    },
    /// Concatenation of several children (partitioned scans, UNION ALL).
    Append { children: Vec<PlanNode> },
    /// Reads the output of a separately initialized sub-plan.
    SubPlanScan {
        /// 1-based id into [`PlannedStmt::subplans`].
        subplan_id: usize,
        target_list: Vec<TargetEntry>,
    },
    /// INSERT/UPDATE/DELETE driver node.
    ModifyTable {
        operation: CmdType,
        child: Box<PlanNode>,
        result_rel_indices: Vec<RangeTableIndex>,
    },
}
