use std::sync::Arc;

use heron_common::config::ExecutorConfig;
use heron_common::error::{ExecutorError, HeronError, HeronResult};
use heron_common::types::CmdType;
use heron_planner::plan::PlannedStmt;
use heron_storage::catalog::Catalog;
use heron_txn::manager::TxnHandle;
use heron_txn::snapshot::SnapshotRegistry;

use crate::estate::{EState, ExecFlags, ParamExecData, QueryDesc};
use crate::init_plan::init_plan;
use crate::perms::{AccessChecker, AllowAllAccess};
use crate::region::MemoryRegion;
use crate::trigger::AfterTriggerQueue;

/// Pluggable entry point for query startup.
///
/// Extensions swap in their own strategy to observe or wrap startup; the
/// usual pattern delegates to [`standard_start_query`] after doing their
/// own work.
pub trait StartStrategy: Send + Sync {
    fn start(&self, executor: &Executor, qd: &mut QueryDesc, flags: ExecFlags) -> HeronResult<()>;
}

/// The stock startup path.
#[derive(Debug, Default)]
pub struct StandardStart;

impl StartStrategy for StandardStart {
    fn start(&self, executor: &Executor, qd: &mut QueryDesc, flags: ExecFlags) -> HeronResult<()> {
        standard_start_query(executor, qd, flags)
    }
}

/// The executor prepares and runs physical plans against storage, one
/// query at a time, within the session's transaction.
pub struct Executor {
    catalog: Arc<Catalog>,
    txn: Arc<TxnHandle>,
    snapshots: Arc<SnapshotRegistry>,
    triggers: Arc<AfterTriggerQueue>,
    access: Arc<dyn AccessChecker>,
    config: ExecutorConfig,
    /// The session's ambient region; per-query regions are entered under it.
    region: Arc<MemoryRegion>,
    start_strategy: Arc<dyn StartStrategy>,
}

impl Executor {
    pub fn new(
        catalog: Arc<Catalog>,
        txn: Arc<TxnHandle>,
        snapshots: Arc<SnapshotRegistry>,
    ) -> Self {
        Self {
            catalog,
            txn,
            snapshots,
            triggers: AfterTriggerQueue::new(),
            access: Arc::new(AllowAllAccess),
            config: ExecutorConfig::default(),
            region: MemoryRegion::root("executor"),
            start_strategy: Arc::new(StandardStart),
        }
    }

    pub fn with_access_checker(mut self, access: Arc<dyn AccessChecker>) -> Self {
        self.access = access;
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_start_strategy(mut self, strategy: Arc<dyn StartStrategy>) -> Self {
        self.start_strategy = strategy;
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn txn(&self) -> &Arc<TxnHandle> {
        &self.txn
    }

    pub fn snapshots(&self) -> &Arc<SnapshotRegistry> {
        &self.snapshots
    }

    pub fn triggers(&self) -> &Arc<AfterTriggerQueue> {
        &self.triggers
    }

    pub fn access_checker(&self) -> &Arc<dyn AccessChecker> {
        &self.access
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Prepare `qd` for execution: validate, build the execution state,
    /// open and register every resource the plan needs, initialize the
    /// plan tree, and resolve the output row shape.
    ///
    /// Must be called before the first tuple is pulled. Delegates to the
    /// installed [`StartStrategy`].
    pub fn start_query(&self, qd: &mut QueryDesc, flags: ExecFlags) -> HeronResult<()> {
        let strategy = Arc::clone(&self.start_strategy);
        strategy.start(self, qd, flags)
    }

    /// Tear down a started query, releasing everything `start_query`
    /// acquired. Safe to call on a never-started or already-ended
    /// descriptor.
    pub fn end_query(&self, qd: &mut QueryDesc) {
        if let Some(estate) = qd.estate.as_mut() {
            estate.shutdown();
        }
        qd.planstate = None;
    }
}

/// The standard startup orchestration.
///
/// Ordering is load-bearing: the transaction-mode guard runs before any
/// resource is acquired; the after-trigger context opens before node
/// initialization so row-level trigger queuing during init has somewhere
/// to go; sub-plans initialize before the main tree.
pub fn standard_start_query(
    exec: &Executor,
    qd: &mut QueryDesc,
    mut flags: ExecFlags,
) -> HeronResult<()> {
    if qd.estate.is_some() {
        return Err(HeronError::internal_bug(
            "E-EXEC-002",
            "query descriptor already started",
            format!("query=\"{}\"", qd.source_text),
        ));
    }

    let planned = Arc::clone(&qd.planned);
    let txn = exec.txn();

    // Reject doomed writes up front; EXPLAIN is considered read-only.
    if (txn.is_read_only() || txn.in_parallel_mode()) && !flags.explain_only {
        check_xact_read_only(exec, &planned, qd.operation)?;
    }

    let region = exec.region.enter("per-query");
    let mut estate = EState::new(
        Arc::clone(exec.catalog()),
        Arc::clone(exec.triggers()),
        region,
    );

    estate.source_text = qd.source_text.clone();
    estate.params = qd.params.clone();
    estate.internal_params = vec![ParamExecData::default(); planned.num_internal_params];
    estate
        .region
        .alloc(planned.num_internal_params * std::mem::size_of::<ParamExecData>());
    estate.query_env = qd.query_env.clone();

    // Command-id policy by command kind. Writes always stamp rows; a
    // SELECT needs an id only when it locks rows or runs a modifying CTE.
    match qd.operation {
        CmdType::Select => {
            if !planned.row_marks.is_empty() || planned.has_modifying_cte {
                estate.output_cid = Some(txn.current_command_id(true));
            }
            if select_skips_trigger_context(&planned) {
                flags.skip_triggers = true;
            }
        }
        CmdType::Insert | CmdType::Update | CmdType::Delete => {
            estate.output_cid = Some(txn.current_command_id(true));
        }
        CmdType::Utility => {
            let err = HeronError::internal_bug(
                "E-EXEC-001",
                format!("unrecognized operation code: {}", qd.operation),
                format!("query=\"{}\"", qd.source_text),
            );
            err.log_if_fatal();
            return Err(err);
        }
    }

    estate.snapshot = Some(exec.snapshots().register(Arc::clone(&qd.snapshot)));
    estate.crosscheck_snapshot = qd
        .crosscheck_snapshot
        .as_ref()
        .map(|s| exec.snapshots().register(Arc::clone(s)));

    estate.top_flags = flags;
    estate.instrument = qd.instrument;
    estate.jit_flags = planned.jit_flags;
    estate.use_parallel_mode = planned.parallel_mode_needed
        && exec.config().parallel.workers_allowed()
        && !qd.operation.is_write();

    // Open the after-trigger statement context before node init, so any
    // trigger queuing during init has a context to enqueue into.
    if !(flags.skip_triggers || flags.explain_only) {
        exec.triggers().begin_statement_context();
        estate.trigger_context_opened = true;
    }

    tracing::debug!(
        operation = %qd.operation,
        explain_only = flags.explain_only,
        range_table = planned.range_table.len(),
        subplans = planned.subplans.len(),
        "starting query"
    );

    // On failure the local estate drops here, releasing its snapshot pins,
    // trigger context, and region.
    init_plan(exec, qd, &mut estate, flags)?;

    qd.estate = Some(estate);
    Ok(())
}

/// Policy: a SELECT with no modifying CTE can never queue after-triggers,
/// so its statement context is skipped. This is purely an efficiency
/// choice; nothing downstream relies on the skip for correctness.
fn select_skips_trigger_context(planned: &PlannedStmt) -> bool {
    !planned.has_modifying_cte
}

/// Transaction-mode guard: fail if the statement writes any non-temporary
/// table while the transaction is read-only or the process is in parallel
/// mode. Session-private temporary tables are exempt.
fn check_xact_read_only(
    exec: &Executor,
    planned: &PlannedStmt,
    operation: CmdType,
) -> HeronResult<()> {
    use heron_planner::plan::AccessMode;

    for rte in &planned.range_table {
        if rte.required_access != AccessMode::Write {
            continue;
        }
        let Some(table_id) = rte.relation_id() else {
            continue;
        };
        let temporary = exec
            .catalog()
            .schema(table_id)
            .map(|s| s.is_temporary())
            .unwrap_or(false);
        if !temporary {
            return Err(reject_write(exec, operation));
        }
    }

    if planned.has_modifying_cte {
        return Err(reject_write(exec, operation));
    }

    Ok(())
}

fn reject_write(exec: &Executor, operation: CmdType) -> HeronError {
    let err = if exec.txn().is_read_only() {
        HeronError::ReadOnly(format!(
            "cannot execute {operation} in a read-only transaction"
        ))
    } else {
        ExecutorError::ParallelModeWrite {
            command: operation.to_string(),
        }
        .into()
    };
    tracing::debug!(%operation, sqlstate = err.pg_sqlstate(), "write rejected by transaction-mode guard");
    err
}
