use heron_common::error::ExecutorError;
use heron_common::schema::RelKind;
use heron_common::types::{RangeTableIndex, RowKey, TableId};
use heron_planner::plan::{PlanRowMark, RowMarkKind, RowWaitPolicy};
use heron_storage::catalog::Relation;

/// Run-time row-locking descriptor, derived from a planner-level request.
///
/// Built once at initialization; execution mutates `active`, `cur_row`,
/// and `extra` as it locks rows.
#[derive(Debug)]
pub struct ExecRowMark {
    /// Open table handle; absent for [`RowMarkKind::Copy`] marks, which
    /// never touch the table.
    pub relation: Option<Relation>,
    /// Catalog identity; absent when the reference is not a relation
    /// (subquery, VALUES).
    pub table_id: Option<TableId>,
    pub rti: RangeTableIndex,
    pub prti: RangeTableIndex,
    pub rowmark_id: u32,
    pub kind: RowMarkKind,
    pub wait_policy: RowWaitPolicy,
    /// True while a row is currently held under this mark.
    pub active: bool,
    /// Location of the currently-locked row; invalid until first use.
    pub cur_row: Option<RowKey>,
    pub extra: RowMarkExtra,
}

/// Locking-kind-specific state a mark accumulates during execution.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum RowMarkExtra {
    #[default]
    None,
    /// Copy marks resolve the junk attribute holding the plan-time row
    /// image on first use.
    Copy { wholerow_attno: Option<usize> },
}

impl ExecRowMark {
    pub fn new(rc: &PlanRowMark, relation: Option<Relation>, table_id: Option<TableId>) -> Self {
        Self {
            relation,
            table_id,
            rti: rc.rti,
            prti: rc.prti,
            rowmark_id: rc.rowmark_id,
            kind: rc.kind,
            wait_policy: rc.wait_policy,
            active: false,
            cur_row: None,
            extra: RowMarkExtra::default(),
        }
    }
}

/// Validate that `relation` can carry a row mark of `kind`.
///
/// Ordinary and partitioned tables accept every kind. Foreign tables only
/// carry `Reference` marks (their row identity is re-fetched through the
/// foreign server, never locked here). Views and sequences have no rows
/// to mark.
pub fn check_valid_row_mark_rel(
    relation: &Relation,
    kind: RowMarkKind,
) -> Result<(), ExecutorError> {
    let rel_kind = relation.kind();
    let ok = match rel_kind {
        RelKind::Table | RelKind::PartitionedTable => true,
        RelKind::ForeignTable => kind == RowMarkKind::Reference,
        RelKind::View | RelKind::Sequence => false,
    };
    if ok {
        Ok(())
    } else {
        Err(ExecutorError::InvalidRowMarkTarget {
            relation: relation.name().to_string(),
            kind: rel_kind.as_str(),
        })
    }
}
