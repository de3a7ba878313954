use std::mem;
use std::sync::Arc;

use heron_common::error::HeronResult;
use heron_common::types::CmdType;
use heron_planner::plan::{PlanNode, TargetEntry};

use crate::estate::{EState, ExecFlags, QueryDesc};
use crate::executor::Executor;
use crate::junk::JunkFilter;
use crate::node::exec_init_node;
use crate::result_rel::ResultRelInfo;
use crate::row_marks::{check_valid_row_mark_rel, ExecRowMark};

/// Initialize the query plan: check permissions, open tables, build
/// per-target and per-lock bookkeeping, then initialize sub-plans and the
/// main tree and resolve the final output shape.
///
/// Steps run in a strict order; each later step may rely on the state the
/// earlier ones installed. Failures abort the whole query — already-opened
/// tables and registered snapshots are reclaimed by the execution state's
/// teardown, not unwound step by step here.
pub(crate) fn init_plan(
    exec: &Executor,
    qd: &mut QueryDesc,
    estate: &mut EState,
    flags: ExecFlags,
) -> HeronResult<()> {
    let planned = Arc::clone(&qd.planned);
    let operation = qd.operation;

    // permissions first, before any resource is acquired
    exec.access_checker().check(&planned.range_table, true)?;

    estate.init_range_table(&planned);

    // Per-target bookkeeping for writes. The no-target arm resets the
    // arrays explicitly: downstream code treats these fields as
    // authoritative, never as "unset".
    if !planned.result_relations.is_empty() {
        let mut infos = Vec::with_capacity(planned.result_relations.len());
        for &rti in &planned.result_relations {
            let relation = estate.open_relation(rti)?;
            infos.push(ResultRelInfo::new(relation, rti, estate.instrument));
        }
        estate.result_relations = infos;
        estate.active_result_relation = None;

        if !planned.root_result_relations.is_empty() {
            let mut roots = Vec::with_capacity(planned.root_result_relations.len());
            for &rti in &planned.root_result_relations {
                let relation = estate.open_relation(rti)?;
                roots.push(ResultRelInfo::new(relation, rti, estate.instrument));
            }
            estate.root_result_relations = roots;
        } else {
            estate.root_result_relations = Vec::new();
        }
    } else {
        estate.result_relations = Vec::new();
        estate.active_result_relation = None;
        estate.root_result_relations = Vec::new();
    }

    // Row-locking descriptors from the planner's requests.
    if !planned.row_marks.is_empty() {
        estate.row_marks = std::iter::repeat_with(|| None)
            .take(estate.range_table_size())
            .collect();
        estate
            .region
            .alloc(estate.range_table_size() * mem::size_of::<Option<ExecRowMark>>());

        for rc in &planned.row_marks {
            // parent markers have no run-time meaning
            if rc.is_parent {
                continue;
            }

            let table_id = estate.rte(rc.rti)?.relation_id();
            let relation = if rc.kind.needs_relation() {
                Some(estate.open_relation(rc.rti)?)
            } else {
                None
            };
            if let Some(rel) = &relation {
                check_valid_row_mark_rel(rel, rc.kind)?;
            }

            estate.install_row_mark(ExecRowMark::new(rc, relation, table_id))?;
        }
    }

    // Auxiliary state starts empty; read-committed re-evaluation arrays
    // stay absent until that machinery activates them.
    estate.tuple_table = Vec::new();
    estate.trig_tuple_slot = None;
    estate.trig_oldtup_slot = None;
    estate.trig_newtup_slot = None;
    estate.epq_tuples = None;
    estate.epq_scan_done = None;

    // Sub-plans before the main tree: a SubPlanScan in the main tree
    // expects to find its state already present.
    for (i, subplan) in planned.subplans.iter().enumerate() {
        let sp_id = i + 1;
        let sp_flags = flags.subplan_flags(planned.rewind_plan_ids.contains(&sp_id));
        let state = exec_init_node(subplan, estate, sp_flags)?;
        estate.subplan_states.push(state);
    }

    let planstate = exec_init_node(&planned.plan_tree, estate, flags)?;

    // Final output shape. SELECT strips administrative columns through a
    // junk filter; everything else passes the root's shape through.
    let mut tup_type = planstate.result_type().clone();
    if operation == CmdType::Select {
        if let Some(target_list) = top_target_list(&planned.plan_tree) {
            if JunkFilter::needed(target_list) {
                let slot = estate.alloc_extra_slot(None);
                let filter = JunkFilter::new(target_list, slot);
                tup_type = filter.clean_tuple_desc().clone();
                estate.junk_filter = Some(filter);
            }
        }
    }

    qd.result_desc = Some(tup_type);
    qd.planstate = Some(planstate);
    Ok(())
}

/// Target list that shapes the query's top-level output. Pass-through
/// nodes inherit their child's list.
fn top_target_list(plan: &PlanNode) -> Option<&[TargetEntry]> {
    match plan {
        PlanNode::SeqScan { target_list, .. }
        | PlanNode::Result { target_list, .. }
        | PlanNode::NestLoop { target_list, .. }
        | PlanNode::SubPlanScan { target_list, .. } => Some(target_list),
        PlanNode::Sort { child, .. } | PlanNode::Limit { child, .. } => top_target_list(child),
        PlanNode::Append { children } => children.first().and_then(top_target_list),
        PlanNode::ModifyTable { .. } => None,
    }
}
