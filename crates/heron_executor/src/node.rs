use heron_common::error::{HeronError, HeronResult};
use heron_common::schema::{TupleAttr, TupleDesc};
use heron_common::types::{CmdType, RangeTableIndex};
use heron_planner::plan::{BoundExpr, PlanNode, TargetEntry};
use heron_storage::catalog::Relation;

use crate::estate::{EState, ExecFlags};

/// Run-time state for one plan node, produced by [`exec_init_node`].
///
/// Per-node execution behavior lives with the execution loop; the
/// initialization protocol only guarantees that every node yields a state
/// carrying its resolved output shape, with children initialized before
/// their parent.
#[derive(Debug)]
pub enum PlanState {
    SeqScan(SeqScanState),
    Result(ResultState),
    Sort(SortState),
    Limit(LimitState),
    NestLoop(NestLoopState),
    Append(AppendState),
    SubPlanScan(SubPlanScanState),
    ModifyTable(ModifyTableState),
}

#[derive(Debug)]
pub struct SeqScanState {
    pub rti: RangeTableIndex,
    pub relation: Relation,
    pub qual: Option<BoundExpr>,
    pub expr_context: usize,
    pub flags: ExecFlags,
    pub output: TupleDesc,
}

#[derive(Debug)]
pub struct ResultState {
    pub child: Option<Box<PlanState>>,
    pub expr_context: usize,
    pub output: TupleDesc,
}

#[derive(Debug)]
pub struct SortState {
    pub child: Box<PlanState>,
    pub sort_cols: Vec<usize>,
    pub flags: ExecFlags,
    pub output: TupleDesc,
}

#[derive(Debug)]
pub struct LimitState {
    pub child: Box<PlanState>,
    pub limit: Option<u64>,
    pub offset: u64,
    pub output: TupleDesc,
}

#[derive(Debug)]
pub struct NestLoopState {
    pub outer: Box<PlanState>,
    pub inner: Box<PlanState>,
    pub join_qual: Option<BoundExpr>,
    pub expr_context: usize,
    pub output: TupleDesc,
}

#[derive(Debug)]
pub struct AppendState {
    pub children: Vec<PlanState>,
    pub output: TupleDesc,
}

#[derive(Debug)]
pub struct SubPlanScanState {
    pub subplan_id: usize,
    pub output: TupleDesc,
}

#[derive(Debug)]
pub struct ModifyTableState {
    pub operation: CmdType,
    pub child: Box<PlanState>,
    pub result_rel_indices: Vec<RangeTableIndex>,
    pub output: TupleDesc,
}

impl PlanState {
    /// Shape of the tuples this node produces.
    pub fn result_type(&self) -> &TupleDesc {
        match self {
            PlanState::SeqScan(s) => &s.output,
            PlanState::Result(s) => &s.output,
            PlanState::Sort(s) => &s.output,
            PlanState::Limit(s) => &s.output,
            PlanState::NestLoop(s) => &s.output,
            PlanState::Append(s) => &s.output,
            PlanState::SubPlanScan(s) => &s.output,
            PlanState::ModifyTable(s) => &s.output,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PlanState::SeqScan(_) => "SeqScan",
            PlanState::Result(_) => "Result",
            PlanState::Sort(_) => "Sort",
            PlanState::Limit(_) => "Limit",
            PlanState::NestLoop(_) => "NestLoop",
            PlanState::Append(_) => "Append",
            PlanState::SubPlanScan(_) => "SubPlanScan",
            PlanState::ModifyTable(_) => "ModifyTable",
        }
    }
}

fn target_list_desc(target_list: &[TargetEntry]) -> TupleDesc {
    TupleDesc::new(
        target_list
            .iter()
            .map(|te| TupleAttr {
                name: te.name.clone(),
                data_type: te.data_type.clone(),
            })
            .collect(),
    )
}

/// Initialize one plan node and, recursively, everything below it.
///
/// Children are initialized before their parent, since the parent's output
/// shape may derive from theirs. Called exactly once per node; sub-plans
/// must already be initialized when a [`PlanNode::SubPlanScan`] is reached.
pub fn exec_init_node(
    plan: &PlanNode,
    estate: &mut EState,
    flags: ExecFlags,
) -> HeronResult<PlanState> {
    match plan {
        PlanNode::SeqScan {
            rti,
            target_list,
            qual,
        } => {
            let relation = estate.open_relation(*rti)?;
            let expr_context = estate.create_expr_context();
            Ok(PlanState::SeqScan(SeqScanState {
                rti: *rti,
                relation,
                qual: qual.clone(),
                expr_context,
                flags,
                output: target_list_desc(target_list),
            }))
        }
        PlanNode::Result { child, target_list } => {
            let child = match child {
                Some(c) => Some(Box::new(exec_init_node(c, estate, flags)?)),
                None => None,
            };
            let expr_context = estate.create_expr_context();
            Ok(PlanState::Result(ResultState {
                child,
                expr_context,
                output: target_list_desc(target_list),
            }))
        }
        PlanNode::Sort { child, sort_cols } => {
            let child = Box::new(exec_init_node(child, estate, flags)?);
            let output = child.result_type().clone();
            Ok(PlanState::Sort(SortState {
                child,
                sort_cols: sort_cols.clone(),
                flags,
                output,
            }))
        }
        PlanNode::Limit {
            child,
            limit,
            offset,
        } => {
            let child = Box::new(exec_init_node(child, estate, flags)?);
            let output = child.result_type().clone();
            Ok(PlanState::Limit(LimitState {
                child,
                limit: *limit,
                offset: *offset,
                output,
            }))
        }
        PlanNode::NestLoop {
            outer,
            inner,
            join_qual,
            target_list,
        } => {
            let outer = Box::new(exec_init_node(outer, estate, flags)?);
            let inner = Box::new(exec_init_node(inner, estate, flags)?);
            let expr_context = estate.create_expr_context();
            Ok(PlanState::NestLoop(NestLoopState {
                outer,
                inner,
                join_qual: join_qual.clone(),
                expr_context,
                output: target_list_desc(target_list),
            }))
        }
        PlanNode::Append { children } => {
            let mut states = Vec::with_capacity(children.len());
            for child in children {
                states.push(exec_init_node(child, estate, flags)?);
            }
            let output = states
                .first()
                .map(|s| s.result_type().clone())
                .unwrap_or_default();
            Ok(PlanState::Append(AppendState {
                children: states,
                output,
            }))
        }
        PlanNode::SubPlanScan {
            subplan_id,
            target_list,
        } => {
            // the sub-plan list is initialized strictly before the main tree
            if *subplan_id == 0 || *subplan_id > estate.subplan_states.len() {
                return Err(HeronError::internal_bug(
                    "E-EXEC-006",
                    format!("sub-plan {subplan_id} has no initialized state"),
                    format!("initialized={}", estate.subplan_states.len()),
                ));
            }
            Ok(PlanState::SubPlanScan(SubPlanScanState {
                subplan_id: *subplan_id,
                output: target_list_desc(target_list),
            }))
        }
        PlanNode::ModifyTable {
            operation,
            child,
            result_rel_indices,
        } => {
            let child = Box::new(exec_init_node(child, estate, flags)?);
            for rti in result_rel_indices {
                if !estate.result_relations.iter().any(|rr| rr.rti == *rti) {
                    return Err(HeronError::internal_bug(
                        "E-EXEC-007",
                        format!("no result-relation bookkeeping for {rti}"),
                        format!("targets={}", estate.result_relations.len()),
                    ));
                }
            }
            Ok(PlanState::ModifyTable(ModifyTableState {
                operation: *operation,
                child,
                result_rel_indices: result_rel_indices.clone(),
                // DML reports a row count; it produces no tuples here
                output: TupleDesc::default(),
            }))
        }
    }
}
