use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use heron_common::config::JitFlags;
use heron_common::datum::{Datum, OwnedRow};
use heron_common::error::{ExecutorError, HeronError, HeronResult};
use heron_common::schema::{TableSchema, TupleDesc};
use heron_common::types::{CmdType, CommandId, RangeTableIndex, ScanDirection};
use heron_planner::plan::{PlannedStmt, RangeTblEntry};
use heron_storage::catalog::{Catalog, Relation};
use heron_txn::snapshot::{RegisteredSnapshot, Snapshot};

use crate::junk::JunkFilter;
use crate::node::PlanState;
use crate::region::MemoryRegion;
use crate::result_rel::ResultRelInfo;
use crate::row_marks::ExecRowMark;
use crate::trigger::AfterTriggerQueue;

/// Behavioral flags for one executor invocation.
///
/// The caller sets these; the executor records them on the execution state
/// and derives restricted sets for sub-plans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecFlags {
    /// Plan inspection only; no rows will be executed and writes are not
    /// rejected by the transaction-mode guard.
    pub explain_only: bool,
    /// Prepare to rescan from the start efficiently.
    pub rewind: bool,
    /// The scan direction may turn backward.
    pub backward: bool,
    /// Mark/restore of scan positions may be requested.
    pub mark_restore: bool,
    /// Do not open an after-trigger statement context.
    pub skip_triggers: bool,
    /// Rows will not actually be fetched (CREATE TABLE AS ... WITH NO DATA).
    pub with_no_data: bool,
}

impl ExecFlags {
    pub fn for_explain() -> Self {
        Self {
            explain_only: true,
            ..Self::default()
        }
    }

    /// Flag set handed to a sub-plan: explain-only and no-data propagate;
    /// a sub-plan never scans backward or marks positions; the rewind hint
    /// comes from the planner.
    pub fn subplan_flags(self, rewind_hint: bool) -> Self {
        Self {
            explain_only: self.explain_only,
            with_no_data: self.with_no_data,
            rewind: rewind_hint,
            ..Self::default()
        }
    }
}

/// Instrumentation requested for a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstrumentOptions {
    pub timer: bool,
    pub rows: bool,
    pub buffers: bool,
}

impl InstrumentOptions {
    pub fn any(self) -> bool {
        self.timer || self.rows || self.buffers
    }
}

/// Index of a scratch slot in [`EState::tuple_table`].
pub type SlotId = usize;

/// A reusable holder for one tuple.
#[derive(Debug, Default)]
pub struct TupleSlot {
    pub desc: Option<TupleDesc>,
    pub row: Option<OwnedRow>,
}

/// One executor-internal parameter slot, zeroed at start.
#[derive(Debug, Clone, Default)]
pub struct ParamExecData {
    pub value: Datum,
    pub done: bool,
}

/// Query environment handed in by the caller: ephemeral named relations
/// visible to this statement only (e.g. trigger transition tables).
#[derive(Debug, Clone, Default)]
pub struct QueryEnv {
    pub ephemeral_relations: HashMap<String, Arc<TableSchema>>,
}

/// Where result rows go once execution starts pulling them.
pub trait DestReceiver: Send {
    fn startup(&mut self, desc: &TupleDesc);
    /// Returns false to stop early.
    fn receive(&mut self, row: OwnedRow) -> bool;
    fn shutdown(&mut self);
}

/// Destination that swallows all rows.
#[derive(Debug, Default)]
pub struct DiscardDest;

impl DestReceiver for DiscardDest {
    fn startup(&mut self, _desc: &TupleDesc) {}
    fn receive(&mut self, _row: OwnedRow) -> bool {
        true
    }
    fn shutdown(&mut self) {}
}

/// Everything the executor needs to run one query.
///
/// The caller fills in the top section; `Executor::start_query` fills in
/// `result_desc`, `estate`, and `planstate`.
pub struct QueryDesc {
    pub operation: CmdType,
    pub planned: Arc<PlannedStmt>,
    pub source_text: String,
    pub snapshot: Arc<Snapshot>,
    /// Cross-check snapshot for referential-integrity update/delete.
    pub crosscheck_snapshot: Option<Arc<Snapshot>>,
    pub dest: Box<dyn DestReceiver>,
    pub params: Vec<Datum>,
    pub query_env: QueryEnv,
    pub instrument: InstrumentOptions,

    // Filled in by Executor::start_query.
    pub result_desc: Option<TupleDesc>,
    pub estate: Option<EState>,
    pub planstate: Option<PlanState>,

    /// Set by the execution loop once the first pull has happened.
    pub already_executed: bool,
}

impl QueryDesc {
    pub fn new(
        planned: Arc<PlannedStmt>,
        source_text: impl Into<String>,
        snapshot: Arc<Snapshot>,
    ) -> Self {
        Self {
            operation: planned.command,
            planned,
            source_text: source_text.into(),
            snapshot,
            crosscheck_snapshot: None,
            dest: Box::new(DiscardDest),
            params: Vec::new(),
            query_env: QueryEnv::default(),
            instrument: InstrumentOptions::default(),
            result_desc: None,
            estate: None,
            planstate: None,
            already_executed: false,
        }
    }

    pub fn with_params(mut self, params: Vec<Datum>) -> Self {
        self.params = params;
        self
    }

    pub fn with_crosscheck(mut self, snapshot: Arc<Snapshot>) -> Self {
        self.crosscheck_snapshot = Some(snapshot);
        self
    }

    pub fn with_dest(mut self, dest: Box<dyn DestReceiver>) -> Self {
        self.dest = dest;
        self
    }
}

impl std::fmt::Debug for QueryDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryDesc")
            .field("operation", &self.operation)
            .field("source_text", &self.source_text)
            .field("started", &self.estate.is_some())
            .field("result_desc", &self.result_desc)
            .finish_non_exhaustive()
    }
}

/// Per-node expression-evaluation context. Holds a per-tuple child region
/// that is reset between output tuples.
#[derive(Debug)]
pub struct ExprContext {
    pub per_tuple_region: Arc<MemoryRegion>,
}

/// Master working state for one executor invocation.
///
/// Owned by the query from `start_query` until `shutdown`. The snapshot
/// fields hold registry pins that are released exactly once: explicitly in
/// `shutdown`, or on drop for abandoned states.
pub struct EState {
    pub direction: ScanDirection,
    pub snapshot: Option<RegisteredSnapshot>,
    pub crosscheck_snapshot: Option<RegisteredSnapshot>,

    /// Normalized table-reference set, cloned from the planned statement.
    /// The vector order is the reference order; entry `rti` is at
    /// `rti - 1`, giving O(1) lookup without a second structure.
    range_table: Vec<RangeTblEntry>,
    /// Opened-table handles, index-aligned with `range_table`. Populated
    /// lazily; a reference that is never scanned is never opened.
    relations: Vec<Option<Relation>>,
    /// Row-locking descriptors, index-aligned with `range_table`. Empty
    /// vector when the plan has no locking requests.
    pub row_marks: Vec<Option<ExecRowMark>>,

    pub planned: Option<Arc<PlannedStmt>>,
    pub source_text: String,

    pub junk_filter: Option<JunkFilter>,

    /// Command id stamped on rows this query writes. Only set for
    /// statements that may write or lock.
    pub output_cid: Option<CommandId>,

    pub result_relations: Vec<ResultRelInfo>,
    /// Index into `result_relations` of the target currently being
    /// written. None except while a ModifyTable node is running.
    pub active_result_relation: Option<usize>,
    /// Partition-root bookkeeping; leaf partitions live in
    /// `result_relations`, roots only here.
    pub root_result_relations: Vec<ResultRelInfo>,

    pub tuple_table: Vec<TupleSlot>,
    pub trig_tuple_slot: Option<SlotId>,
    pub trig_oldtup_slot: Option<SlotId>,
    pub trig_newtup_slot: Option<SlotId>,

    /// Substitute tuples for read-committed re-evaluation, indexed like
    /// the range table. Absent until that machinery activates.
    pub epq_tuples: Option<Vec<Option<OwnedRow>>>,
    pub epq_scan_done: Option<Vec<bool>>,

    pub processed: u64,
    pub last_row_id: Option<u64>,

    pub params: Vec<Datum>,
    pub internal_params: Vec<ParamExecData>,
    pub query_env: QueryEnv,

    pub region: Arc<MemoryRegion>,
    pub expr_contexts: Vec<ExprContext>,

    /// Sub-plan states in planner order; sub-plan id `n` is at `n - 1`.
    pub subplan_states: Vec<PlanState>,

    pub top_flags: ExecFlags,
    pub instrument: InstrumentOptions,
    pub jit_flags: JitFlags,
    pub use_parallel_mode: bool,

    /// True when this query opened an after-trigger statement context and
    /// owes one close.
    pub trigger_context_opened: bool,
    finished: bool,

    catalog: Arc<Catalog>,
    triggers: Arc<AfterTriggerQueue>,
}

impl EState {
    pub fn new(
        catalog: Arc<Catalog>,
        triggers: Arc<AfterTriggerQueue>,
        region: Arc<MemoryRegion>,
    ) -> Self {
        Self {
            direction: ScanDirection::Forward,
            snapshot: None,
            crosscheck_snapshot: None,
            range_table: Vec::new(),
            relations: Vec::new(),
            row_marks: Vec::new(),
            planned: None,
            source_text: String::new(),
            junk_filter: None,
            output_cid: None,
            result_relations: Vec::new(),
            active_result_relation: None,
            root_result_relations: Vec::new(),
            tuple_table: Vec::new(),
            trig_tuple_slot: None,
            trig_oldtup_slot: None,
            trig_newtup_slot: None,
            epq_tuples: None,
            epq_scan_done: None,
            processed: 0,
            last_row_id: None,
            params: Vec::new(),
            internal_params: Vec::new(),
            query_env: QueryEnv::default(),
            region,
            expr_contexts: Vec::new(),
            subplan_states: Vec::new(),
            top_flags: ExecFlags::default(),
            instrument: InstrumentOptions::default(),
            jit_flags: JitFlags::default(),
            use_parallel_mode: false,
            trigger_context_opened: false,
            finished: false,
            catalog,
            triggers,
        }
    }

    /// Install the statement's table-reference set and size the aligned
    /// per-reference arrays.
    pub fn init_range_table(&mut self, planned: &Arc<PlannedStmt>) {
        self.range_table = planned.range_table.clone();
        self.relations = vec![None; self.range_table.len()];
        self.planned = Some(Arc::clone(planned));
        self.region.alloc(
            self.range_table.len()
                * (mem::size_of::<RangeTblEntry>() + mem::size_of::<Option<Relation>>()),
        );
    }

    pub fn range_table_size(&self) -> usize {
        self.range_table.len()
    }

    pub fn range_table(&self) -> &[RangeTblEntry] {
        &self.range_table
    }

    /// Entry at reference position `rti` (1-based).
    pub fn rte(&self, rti: RangeTableIndex) -> HeronResult<&RangeTblEntry> {
        if !rti.is_valid() || rti.slot() >= self.range_table.len() {
            return Err(ExecutorError::RangeTableIndexOutOfRange(rti).into());
        }
        Ok(&self.range_table[rti.slot()])
    }

    /// Open-table handle for reference `rti`, opening on first access.
    /// Idempotent per reference within the query.
    pub fn open_relation(&mut self, rti: RangeTableIndex) -> HeronResult<Relation> {
        let rte = self.rte(rti)?;
        let Some(table_id) = rte.relation_id() else {
            return Err(HeronError::internal_bug(
                "E-EXEC-003",
                format!("reference {rti} is not a relation"),
                format!("alias={}", rte.alias),
            ));
        };
        let slot = rti.slot();
        if self.relations[slot].is_none() {
            let relation = self.catalog.open(table_id)?;
            self.relations[slot] = Some(relation);
        }
        Ok(self.relations[slot].clone().unwrap())
    }

    /// Already-opened handle for `rti`, if any.
    pub fn relation(&self, rti: RangeTableIndex) -> Option<&Relation> {
        self.relations.get(rti.slot()).and_then(|r| r.as_ref())
    }

    /// Install a row-locking descriptor at its reference slot.
    ///
    /// Invariant: at most one descriptor per reference, slot within the
    /// range-table size. A violation is bad planner output, not user error.
    pub fn install_row_mark(&mut self, erm: ExecRowMark) -> HeronResult<()> {
        let rti = erm.rti;
        if !rti.is_valid() || rti.slot() >= self.row_marks.len() {
            return Err(HeronError::internal_bug(
                "E-EXEC-004",
                format!("row mark reference {rti} out of range"),
                format!("range_table_size={}", self.row_marks.len()),
            ));
        }
        if self.row_marks[rti.slot()].is_some() {
            return Err(HeronError::internal_bug(
                "E-EXEC-005",
                format!("duplicate row mark for reference {rti}"),
                format!("rowmark_id={}", erm.rowmark_id),
            ));
        }
        self.row_marks[rti.slot()] = Some(erm);
        Ok(())
    }

    /// Row-locking descriptor for `rti`, if one was installed.
    pub fn row_mark(&self, rti: RangeTableIndex) -> Option<&ExecRowMark> {
        self.row_marks.get(rti.slot()).and_then(|m| m.as_ref())
    }

    /// Append a scratch tuple slot owned by this query.
    pub fn alloc_extra_slot(&mut self, desc: Option<TupleDesc>) -> SlotId {
        self.region.alloc(mem::size_of::<TupleSlot>());
        self.tuple_table.push(TupleSlot { desc, row: None });
        self.tuple_table.len() - 1
    }

    /// Create an expression-evaluation context owned by this query.
    pub fn create_expr_context(&mut self) -> usize {
        let per_tuple_region = self.region.enter("per-tuple");
        self.expr_contexts.push(ExprContext { per_tuple_region });
        self.expr_contexts.len() - 1
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Tear down this state: release both snapshot pins, close the trigger
    /// context this query opened, and exit the query region. Idempotent;
    /// also runs on drop, so no exit path can leak a pin.
    pub fn shutdown(&mut self) {
        if self.finished {
            return;
        }
        if let Some(snap) = self.snapshot.take() {
            snap.unregister();
        }
        if let Some(snap) = self.crosscheck_snapshot.take() {
            snap.unregister();
        }
        if self.trigger_context_opened {
            self.triggers.end_statement_context();
            self.trigger_context_opened = false;
        }
        for ctx in &self.expr_contexts {
            ctx.per_tuple_region.release();
        }
        self.region.release();
        self.finished = true;
    }
}

impl Drop for EState {
    fn drop(&mut self) {
        self.shutdown();
    }
}
