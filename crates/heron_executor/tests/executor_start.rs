//! End-to-end tests for query startup: transaction-mode guarding, resource
//! acquisition ordering, row-mark construction, sub-plan initialization,
//! and output-shape resolution.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use heron_common::config::{ExecutorConfig, ParallelConfig};
use heron_common::error::{ErrorKind, HeronError, HeronResult};
use heron_common::schema::{ColumnDef, RelKind, RelPersistence, TableSchema};
use heron_common::types::{
    CmdType, ColumnId, CommandId, DataType, RangeTableIndex, TableId, TxnId,
};
use heron_executor::perms::GrantTable;
use heron_executor::{
    standard_start_query, ExecFlags, Executor, PlanState, QueryDesc, StartStrategy,
};
use heron_planner::plan::{
    PlanNode, PlanRowMark, PlannedStmt, RangeTblEntry, RowMarkKind, RowWaitPolicy, TargetEntry,
};
use heron_storage::catalog::Catalog;
use heron_txn::manager::TxnHandle;
use heron_txn::snapshot::{Snapshot, SnapshotRegistry};

const ACCOUNTS: TableId = TableId(1);
const AUDIT_LOG: TableId = TableId(2);
const SCRATCH: TableId = TableId(3);
const V_ACCOUNTS: TableId = TableId(4);
const EXT_RATES: TableId = TableId(5);
const EVENTS: TableId = TableId(6);
const EVENTS_LEAF: TableId = TableId(7);

fn col(id: u32, name: &str, ty: DataType) -> ColumnDef {
    ColumnDef {
        id: ColumnId(id),
        name: name.into(),
        data_type: ty,
        nullable: true,
    }
}

fn account_cols() -> Vec<ColumnDef> {
    vec![
        col(1, "id", DataType::Int64),
        col(2, "name", DataType::Text),
        col(3, "balance", DataType::Float64),
    ]
}

struct TestEnv {
    catalog: Arc<Catalog>,
    registry: Arc<SnapshotRegistry>,
}

fn env() -> TestEnv {
    let catalog = Catalog::new();
    catalog
        .register_table(TableSchema::new(ACCOUNTS, "accounts", account_cols()))
        .unwrap();
    catalog
        .register_table(TableSchema::new(
            AUDIT_LOG,
            "audit_log",
            vec![col(1, "id", DataType::Int64), col(2, "what", DataType::Text)],
        ))
        .unwrap();
    catalog
        .register_table(
            TableSchema::new(SCRATCH, "scratch", vec![col(1, "id", DataType::Int64)])
                .with_persistence(RelPersistence::Temporary),
        )
        .unwrap();
    catalog
        .register_table(
            TableSchema::new(V_ACCOUNTS, "v_accounts", account_cols()).with_kind(RelKind::View),
        )
        .unwrap();
    catalog
        .register_table(
            TableSchema::new(
                EXT_RATES,
                "ext_rates",
                vec![col(1, "rate", DataType::Float64)],
            )
            .with_kind(RelKind::ForeignTable),
        )
        .unwrap();
    catalog
        .register_table(
            TableSchema::new(EVENTS, "events", vec![col(1, "id", DataType::Int64)])
                .with_kind(RelKind::PartitionedTable),
        )
        .unwrap();
    catalog
        .register_table(TableSchema::new(
            EVENTS_LEAF,
            "events_2026",
            vec![col(1, "id", DataType::Int64)],
        ))
        .unwrap();
    let registry = SnapshotRegistry::new();
    TestEnv { catalog, registry }
}

fn executor(env: &TestEnv, txn: Arc<TxnHandle>) -> Executor {
    Executor::new(
        Arc::clone(&env.catalog),
        txn,
        Arc::clone(&env.registry),
    )
}

fn snapshot(env: &TestEnv) -> Arc<Snapshot> {
    env.registry
        .snapshot(TxnId(5), TxnId(10), vec![TxnId(7)], CommandId::FIRST)
}

fn scan_target_list() -> Vec<TargetEntry> {
    vec![
        TargetEntry::column(0, "id", DataType::Int64),
        TargetEntry::column(1, "name", DataType::Text),
    ]
}

fn seq_scan(rti: usize) -> PlanNode {
    PlanNode::SeqScan {
        rti: RangeTableIndex(rti),
        target_list: scan_target_list(),
        qual: None,
    }
}

/// SELECT id, name FROM accounts
fn select_stmt() -> PlannedStmt {
    PlannedStmt::new(
        CmdType::Select,
        seq_scan(1),
        vec![RangeTblEntry::relation(ACCOUNTS, "accounts")],
    )
}

/// INSERT INTO <table>
fn insert_stmt(table: TableId, name: &str) -> PlannedStmt {
    let mut stmt = PlannedStmt::new(
        CmdType::Insert,
        PlanNode::ModifyTable {
            operation: CmdType::Insert,
            child: Box::new(PlanNode::Result {
                child: None,
                target_list: vec![TargetEntry::column(0, "id", DataType::Int64)],
            }),
            result_rel_indices: vec![RangeTableIndex(1)],
        },
        vec![RangeTblEntry::relation(table, name).for_write()],
    );
    stmt.result_relations = vec![RangeTableIndex(1)];
    stmt
}

fn start(exec: &Executor, stmt: PlannedStmt, env: &TestEnv) -> HeronResult<QueryDesc> {
    let mut qd = QueryDesc::new(Arc::new(stmt), "test query", snapshot(env));
    exec.start_query(&mut qd, ExecFlags::default())?;
    Ok(qd)
}

// ── Transaction-mode guard ───────────────────────────────────────────────

#[test]
fn test_read_only_txn_rejects_insert_before_any_open() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new_read_only(TxnId(1))));

    let err = start(&exec, insert_stmt(ACCOUNTS, "accounts"), &env).unwrap_err();
    assert!(matches!(err, HeronError::ReadOnly(_)));
    assert_eq!(err.pg_sqlstate(), "25006");
    assert_eq!(err.kind(), ErrorKind::UserError);

    // rejected before acquiring anything
    assert_eq!(env.catalog.open_count(), 0);
    assert_eq!(env.registry.active_count(), 0);
}

#[test]
fn test_parallel_mode_rejects_write() {
    let env = env();
    let txn = Arc::new(TxnHandle::new(TxnId(1)));
    txn.enter_parallel_mode();
    let exec = executor(&env, txn);

    let err = start(&exec, insert_stmt(ACCOUNTS, "accounts"), &env).unwrap_err();
    assert_eq!(err.pg_sqlstate(), "25000");
    assert!(err.to_string().contains("parallel"));
    assert_eq!(env.catalog.open_count(), 0);
}

#[test]
fn test_parallel_mode_allows_select() {
    let env = env();
    let txn = Arc::new(TxnHandle::new(TxnId(1)));
    txn.enter_parallel_mode();
    let exec = executor(&env, txn);

    let qd = start(&exec, select_stmt(), &env).unwrap();
    assert!(qd.estate.is_some());
}

#[test]
fn test_explain_only_bypasses_read_only_guard() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new_read_only(TxnId(1))));

    let mut qd = QueryDesc::new(
        Arc::new(insert_stmt(ACCOUNTS, "accounts")),
        "explain insert",
        snapshot(&env),
    );
    exec.start_query(&mut qd, ExecFlags::for_explain()).unwrap();

    let estate = qd.estate.as_ref().unwrap();
    assert!(estate.top_flags.explain_only);
    // explain-only never opens a trigger context
    assert!(!estate.trigger_context_opened);
    assert_eq!(exec.triggers().query_depth(), 0);
}

#[test]
fn test_read_only_txn_allows_temp_table_write() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new_read_only(TxnId(1))));

    let qd = start(&exec, insert_stmt(SCRATCH, "scratch"), &env).unwrap();
    assert_eq!(qd.estate.as_ref().unwrap().result_relations.len(), 1);
}

#[test]
fn test_read_only_txn_rejects_modifying_cte() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new_read_only(TxnId(1))));

    let mut stmt = select_stmt();
    stmt.has_modifying_cte = true;
    let err = start(&exec, stmt, &env).unwrap_err();
    assert!(matches!(err, HeronError::ReadOnly(_)));
}

// ── Command-id policy and trigger-context policy ─────────────────────────

#[test]
fn test_plain_select_gets_no_command_id_and_skips_triggers() {
    let env = env();
    let txn = Arc::new(TxnHandle::new(TxnId(1)));
    let exec = executor(&env, Arc::clone(&txn));

    let qd = start(&exec, select_stmt(), &env).unwrap();
    let estate = qd.estate.as_ref().unwrap();

    assert_eq!(estate.output_cid, None);
    assert!(!txn.command_id_used());
    // skip recorded on the state, and no context was opened
    assert!(estate.top_flags.skip_triggers);
    assert!(!estate.trigger_context_opened);
    assert_eq!(exec.triggers().query_depth(), 0);
}

#[test]
fn test_select_with_modifying_cte_gets_command_id_and_trigger_context() {
    let env = env();
    let txn = Arc::new(TxnHandle::new(TxnId(1)));
    let exec = executor(&env, Arc::clone(&txn));

    let mut stmt = select_stmt();
    stmt.has_modifying_cte = true;
    let mut qd = start(&exec, stmt, &env).unwrap();

    let estate = qd.estate.as_ref().unwrap();
    assert_eq!(estate.output_cid, Some(CommandId::FIRST));
    assert!(txn.command_id_used());
    assert!(!estate.top_flags.skip_triggers);
    assert!(estate.trigger_context_opened);
    assert_eq!(exec.triggers().query_depth(), 1);

    exec.end_query(&mut qd);
    assert_eq!(exec.triggers().query_depth(), 0);
}

#[test]
fn test_select_for_update_gets_command_id() {
    let env = env();
    let txn = Arc::new(TxnHandle::new(TxnId(1)));
    let exec = executor(&env, Arc::clone(&txn));

    let mut stmt = select_stmt();
    stmt.row_marks = vec![PlanRowMark {
        rti: RangeTableIndex(1),
        prti: RangeTableIndex(1),
        rowmark_id: 1,
        kind: RowMarkKind::Exclusive,
        wait_policy: RowWaitPolicy::Block,
        is_parent: false,
    }];
    let qd = start(&exec, stmt, &env).unwrap();
    assert_eq!(qd.estate.as_ref().unwrap().output_cid, Some(CommandId::FIRST));
    assert!(txn.command_id_used());
}

#[test]
fn test_insert_gets_command_id() {
    let env = env();
    let txn = Arc::new(TxnHandle::new(TxnId(1)));
    let exec = executor(&env, Arc::clone(&txn));

    let qd = start(&exec, insert_stmt(ACCOUNTS, "accounts"), &env).unwrap();
    assert_eq!(qd.estate.as_ref().unwrap().output_cid, Some(CommandId::FIRST));
    assert!(txn.command_id_used());
}

#[test]
fn test_utility_operation_is_internal_bug() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    let stmt = PlannedStmt::new(
        CmdType::Utility,
        seq_scan(1),
        vec![RangeTblEntry::relation(ACCOUNTS, "accounts")],
    );
    let err = start(&exec, stmt, &env).unwrap_err();
    assert!(err.is_internal_bug());
    assert_eq!(err.pg_sqlstate(), "XX000");
    // failed before registering anything
    assert_eq!(env.registry.active_count(), 0);
}

#[test]
fn test_double_start_is_internal_bug() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    let mut qd = start(&exec, select_stmt(), &env).unwrap();
    let err = exec.start_query(&mut qd, ExecFlags::default()).unwrap_err();
    assert!(err.is_internal_bug());
}

// ── Snapshot registration lifecycle ──────────────────────────────────────

#[test]
fn test_snapshots_registered_then_released_exactly_once() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    let snap = snapshot(&env);
    let cross = snapshot(&env);
    let mut qd = QueryDesc::new(Arc::new(select_stmt()), "select", Arc::clone(&snap))
        .with_crosscheck(Arc::clone(&cross));
    exec.start_query(&mut qd, ExecFlags::default()).unwrap();

    assert_eq!(env.registry.refcount(snap.id), Some(1));
    assert_eq!(env.registry.refcount(cross.id), Some(1));
    assert_eq!(env.registry.active_count(), 2);

    exec.end_query(&mut qd);
    assert_eq!(env.registry.active_count(), 0);

    // idempotent: a second end releases nothing twice
    exec.end_query(&mut qd);
    assert_eq!(env.registry.active_count(), 0);
}

#[test]
fn test_failed_init_releases_snapshots() {
    let env = env();
    // deny everything: permission check fails after snapshots register
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))))
        .with_access_checker(Arc::new(GrantTable::new()));

    let err = start(&exec, select_stmt(), &env).unwrap_err();
    assert_eq!(err.pg_sqlstate(), "42501");
    assert_eq!(env.registry.active_count(), 0);
    assert_eq!(exec.triggers().query_depth(), 0);
}

#[test]
fn test_dropping_started_query_releases_snapshots() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    {
        let _qd = start(&exec, select_stmt(), &env).unwrap();
        assert_eq!(env.registry.active_count(), 1);
        // dropped without end_query, e.g. session abort
    }
    assert_eq!(env.registry.active_count(), 0);
}

// ── Permission checking ──────────────────────────────────────────────────

#[test]
fn test_grants_admit_select() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))))
        .with_access_checker(Arc::new(GrantTable::new().grant_read(ACCOUNTS)));

    assert!(start(&exec, select_stmt(), &env).is_ok());
}

#[test]
fn test_write_requires_write_grant() {
    let env = env();
    let read_only_grants = GrantTable::new().grant_read(ACCOUNTS);
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))))
        .with_access_checker(Arc::new(read_only_grants));

    let err = start(&exec, insert_stmt(ACCOUNTS, "accounts"), &env).unwrap_err();
    assert_eq!(err.pg_sqlstate(), "42501");

    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))))
        .with_access_checker(Arc::new(GrantTable::new().grant_write(ACCOUNTS)));
    assert!(start(&exec, insert_stmt(ACCOUNTS, "accounts"), &env).is_ok());
}

// ── Result-relation bookkeeping ──────────────────────────────────────────

#[test]
fn test_insert_builds_result_relation_bookkeeping() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    let qd = start(&exec, insert_stmt(ACCOUNTS, "accounts"), &env).unwrap();
    let estate = qd.estate.as_ref().unwrap();

    assert_eq!(estate.result_relations.len(), 1);
    let rr = &estate.result_relations[0];
    assert_eq!(rr.rti, RangeTableIndex(1));
    assert_eq!(rr.relation.id(), ACCOUNTS);
    assert_eq!(estate.active_result_relation, None);
    assert!(estate.root_result_relations.is_empty());
}

#[test]
fn test_partition_roots_tracked_separately() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    let mut stmt = PlannedStmt::new(
        CmdType::Insert,
        PlanNode::ModifyTable {
            operation: CmdType::Insert,
            child: Box::new(PlanNode::Result {
                child: None,
                target_list: vec![TargetEntry::column(0, "id", DataType::Int64)],
            }),
            result_rel_indices: vec![RangeTableIndex(1)],
        },
        vec![
            RangeTblEntry::relation(EVENTS_LEAF, "events_2026").for_write(),
            RangeTblEntry::relation(EVENTS, "events").for_write(),
        ],
    );
    stmt.result_relations = vec![RangeTableIndex(1)];
    stmt.root_result_relations = vec![RangeTableIndex(2)];

    let qd = start(&exec, stmt, &env).unwrap();
    let estate = qd.estate.as_ref().unwrap();

    // leaf in the primary array, root only in the root array
    assert_eq!(estate.result_relations.len(), 1);
    assert_eq!(estate.result_relations[0].relation.id(), EVENTS_LEAF);
    assert_eq!(estate.root_result_relations.len(), 1);
    assert_eq!(estate.root_result_relations[0].relation.id(), EVENTS);
    assert_eq!(
        estate.root_result_relations[0].relation.kind(),
        RelKind::PartitionedTable
    );
}

#[test]
fn test_select_resets_write_bookkeeping_to_empty() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    let qd = start(&exec, select_stmt(), &env).unwrap();
    let estate = qd.estate.as_ref().unwrap();
    assert!(estate.result_relations.is_empty());
    assert_eq!(estate.active_result_relation, None);
    assert!(estate.root_result_relations.is_empty());
    assert!(estate.tuple_table.is_empty());
    assert!(estate.epq_tuples.is_none());
    assert!(estate.epq_scan_done.is_none());
}

#[test]
fn test_modify_table_without_bookkeeping_is_internal_bug() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    // planner forgot result_relations: ModifyTable finds no bookkeeping
    let stmt = PlannedStmt::new(
        CmdType::Insert,
        PlanNode::ModifyTable {
            operation: CmdType::Insert,
            child: Box::new(PlanNode::Result {
                child: None,
                target_list: vec![],
            }),
            result_rel_indices: vec![RangeTableIndex(1)],
        },
        vec![RangeTblEntry::relation(ACCOUNTS, "accounts").for_write()],
    );
    let err = start(&exec, stmt, &env).unwrap_err();
    assert!(err.is_internal_bug());
}

// ── Row-locking descriptors ──────────────────────────────────────────────

fn mark(rti: usize, kind: RowMarkKind) -> PlanRowMark {
    PlanRowMark {
        rti: RangeTableIndex(rti),
        prti: RangeTableIndex(rti),
        rowmark_id: rti as u32,
        kind,
        wait_policy: RowWaitPolicy::Block,
        is_parent: false,
    }
}

#[test]
fn test_row_marks_built_per_reference() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    let mut stmt = PlannedStmt::new(
        CmdType::Select,
        seq_scan(1),
        vec![
            RangeTblEntry::relation(ACCOUNTS, "accounts"),
            RangeTblEntry::relation(AUDIT_LOG, "audit_log"),
        ],
    );
    stmt.row_marks = vec![mark(1, RowMarkKind::Exclusive), mark(2, RowMarkKind::Share)];

    let qd = start(&exec, stmt, &env).unwrap();
    let estate = qd.estate.as_ref().unwrap();

    assert_eq!(estate.row_marks.len(), 2);
    let m1 = estate.row_mark(RangeTableIndex(1)).unwrap();
    assert_eq!(m1.kind, RowMarkKind::Exclusive);
    assert_eq!(m1.table_id, Some(ACCOUNTS));
    assert!(m1.relation.is_some());
    assert!(!m1.active);
    assert!(m1.cur_row.is_none());

    let m2 = estate.row_mark(RangeTableIndex(2)).unwrap();
    assert_eq!(m2.kind, RowMarkKind::Share);
    assert!(m2.relation.is_some());
}

#[test]
fn test_copy_mark_opens_no_relation() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    let mut stmt = PlannedStmt::new(
        CmdType::Select,
        seq_scan(1),
        vec![
            RangeTblEntry::relation(ACCOUNTS, "accounts"),
            RangeTblEntry::relation(AUDIT_LOG, "audit_log"),
        ],
    );
    stmt.row_marks = vec![mark(1, RowMarkKind::Exclusive), mark(2, RowMarkKind::Copy)];

    let opens_before = env.catalog.open_count();
    let qd = start(&exec, stmt, &env).unwrap();
    let estate = qd.estate.as_ref().unwrap();

    let copy = estate.row_mark(RangeTableIndex(2)).unwrap();
    assert!(copy.relation.is_none());
    assert_eq!(copy.table_id, Some(AUDIT_LOG));
    // only the scan target and the exclusive mark's table were opened
    assert_eq!(env.catalog.open_count() - opens_before, 1);
}

#[test]
fn test_parent_marks_are_skipped() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    let mut stmt = PlannedStmt::new(
        CmdType::Select,
        seq_scan(3),
        vec![
            RangeTblEntry::relation(ACCOUNTS, "accounts"),
            RangeTblEntry::relation(EVENTS, "events"),
            RangeTblEntry::relation(EVENTS_LEAF, "events_2026"),
        ],
    );
    let mut parent = mark(2, RowMarkKind::Exclusive);
    parent.is_parent = true;
    let mut leaf = mark(3, RowMarkKind::Exclusive);
    leaf.prti = RangeTableIndex(2);
    stmt.row_marks = vec![parent, leaf];

    let qd = start(&exec, stmt, &env).unwrap();
    let estate = qd.estate.as_ref().unwrap();

    assert!(estate.row_mark(RangeTableIndex(2)).is_none());
    let m = estate.row_mark(RangeTableIndex(3)).unwrap();
    assert_eq!(m.prti, RangeTableIndex(2));
}

#[test]
fn test_row_mark_on_view_is_user_error() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    let mut stmt = PlannedStmt::new(
        CmdType::Select,
        seq_scan(1),
        vec![RangeTblEntry::relation(V_ACCOUNTS, "v_accounts")],
    );
    stmt.row_marks = vec![mark(1, RowMarkKind::Exclusive)];

    let err = start(&exec, stmt, &env).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UserError);
    assert_eq!(err.pg_sqlstate(), "42809");
}

#[test]
fn test_row_mark_on_foreign_table_reference_only() {
    let env = env();

    let mut stmt = PlannedStmt::new(
        CmdType::Select,
        seq_scan(1),
        vec![RangeTblEntry::relation(EXT_RATES, "ext_rates")],
    );
    stmt.row_marks = vec![mark(1, RowMarkKind::Reference)];
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));
    assert!(start(&exec, stmt, &env).is_ok());

    let mut stmt = PlannedStmt::new(
        CmdType::Select,
        seq_scan(1),
        vec![RangeTblEntry::relation(EXT_RATES, "ext_rates")],
    );
    stmt.row_marks = vec![mark(1, RowMarkKind::Exclusive)];
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));
    let err = start(&exec, stmt, &env).unwrap_err();
    assert_eq!(err.pg_sqlstate(), "42809");
}

#[test]
fn test_duplicate_row_mark_is_internal_bug() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    let mut stmt = select_stmt();
    stmt.row_marks = vec![mark(1, RowMarkKind::Exclusive), mark(1, RowMarkKind::Share)];

    let err = start(&exec, stmt, &env).unwrap_err();
    assert!(err.is_internal_bug());
    assert_eq!(err.pg_sqlstate(), "XX000");
}

// ── Sub-plan initialization ordering ─────────────────────────────────────

fn subplan_scan(id: usize) -> PlanNode {
    PlanNode::SubPlanScan {
        subplan_id: id,
        target_list: vec![TargetEntry::column(0, "id", DataType::Int64)],
    }
}

#[test]
fn test_subplans_initialized_in_order_before_main_tree() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    let mut stmt = PlannedStmt::new(
        CmdType::Select,
        PlanNode::Append {
            children: vec![subplan_scan(1), subplan_scan(2), subplan_scan(3)],
        },
        vec![
            RangeTblEntry::relation(ACCOUNTS, "accounts"),
            RangeTblEntry::relation(AUDIT_LOG, "audit_log"),
            RangeTblEntry::relation(EVENTS_LEAF, "events_2026"),
        ],
    );
    stmt.subplans = vec![seq_scan(1), seq_scan(2), seq_scan(3)];

    // main-tree SubPlanScan init fails unless all three states exist first
    let qd = start(&exec, stmt, &env).unwrap();
    let estate = qd.estate.as_ref().unwrap();

    assert_eq!(estate.subplan_states.len(), 3);
    for (i, state) in estate.subplan_states.iter().enumerate() {
        match state {
            PlanState::SeqScan(s) => assert_eq!(s.rti, RangeTableIndex(i + 1)),
            other => panic!("expected SeqScan state, got {}", other.kind_name()),
        }
    }
}

#[test]
fn test_missing_subplan_state_is_internal_bug() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    // references sub-plan 1 but the statement declares none
    let stmt = PlannedStmt::new(
        CmdType::Select,
        subplan_scan(1),
        vec![RangeTblEntry::relation(ACCOUNTS, "accounts")],
    );
    let err = start(&exec, stmt, &env).unwrap_err();
    assert!(err.is_internal_bug());
}

#[test]
fn test_subplan_flag_restriction() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    let mut stmt = PlannedStmt::new(
        CmdType::Select,
        PlanNode::Append {
            children: vec![subplan_scan(1), subplan_scan(2)],
        },
        vec![
            RangeTblEntry::relation(ACCOUNTS, "accounts"),
            RangeTblEntry::relation(AUDIT_LOG, "audit_log"),
        ],
    );
    stmt.subplans = vec![seq_scan(1), seq_scan(2)];
    stmt.rewind_plan_ids = HashSet::from([2]);

    let mut qd = QueryDesc::new(Arc::new(stmt), "select", snapshot(&env));
    let flags = ExecFlags {
        explain_only: true,
        backward: true,
        mark_restore: true,
        ..ExecFlags::default()
    };
    exec.start_query(&mut qd, flags).unwrap();

    let estate = qd.estate.as_ref().unwrap();
    let sub_flags: Vec<ExecFlags> = estate
        .subplan_states
        .iter()
        .map(|s| match s {
            PlanState::SeqScan(s) => s.flags,
            other => panic!("expected SeqScan state, got {}", other.kind_name()),
        })
        .collect();

    // explain-only propagates; backward/mark never do; rewind only where flagged
    assert!(sub_flags.iter().all(|f| f.explain_only));
    assert!(sub_flags.iter().all(|f| !f.backward && !f.mark_restore));
    assert!(!sub_flags[0].rewind);
    assert!(sub_flags[1].rewind);
}

// ── Output-shape resolution ──────────────────────────────────────────────

#[test]
fn test_junk_columns_stripped_from_result_shape() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    // five output columns, two administrative
    let stmt = PlannedStmt::new(
        CmdType::Select,
        PlanNode::SeqScan {
            rti: RangeTableIndex(1),
            target_list: vec![
                TargetEntry::column(0, "id", DataType::Int64),
                TargetEntry::column(1, "name", DataType::Text),
                TargetEntry::column(2, "balance", DataType::Float64),
                TargetEntry::column(3, "ctid", DataType::Text).junk(),
                TargetEntry::column(4, "tableoid", DataType::Int64).junk(),
            ],
            qual: None,
        },
        vec![RangeTblEntry::relation(ACCOUNTS, "accounts")],
    );

    let qd = start(&exec, stmt, &env).unwrap();
    let estate = qd.estate.as_ref().unwrap();

    let desc = qd.result_desc.as_ref().unwrap();
    assert_eq!(desc.arity(), 3);
    let names: Vec<_> = desc.attrs.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "balance"]);

    let filter = estate.junk_filter.as_ref().expect("junk filter installed");
    assert_eq!(filter.clean_tuple_desc(), desc);
    // raw root shape still carries all five
    assert_eq!(qd.planstate.as_ref().unwrap().result_type().arity(), 5);
    // the filter owns a scratch slot in the query's tuple table
    assert_eq!(estate.tuple_table.len(), 1);
}

#[test]
fn test_clean_target_list_passes_raw_shape_through() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    let qd = start(&exec, select_stmt(), &env).unwrap();
    let estate = qd.estate.as_ref().unwrap();

    assert!(estate.junk_filter.is_none());
    assert_eq!(
        qd.result_desc.as_ref().unwrap(),
        qd.planstate.as_ref().unwrap().result_type()
    );
    assert!(estate.tuple_table.is_empty());
}

#[test]
fn test_junk_resolution_skipped_for_dml() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    let qd = start(&exec, insert_stmt(ACCOUNTS, "accounts"), &env).unwrap();
    assert!(qd.estate.as_ref().unwrap().junk_filter.is_none());
    // DML reports counts; the root produces no tuples
    assert!(qd.result_desc.as_ref().unwrap().is_empty());
}

// ── Parallel-mode eligibility and parameters ─────────────────────────────

#[test]
fn test_parallel_eligibility_recorded() {
    let env = env();

    let mut stmt = select_stmt();
    stmt.parallel_mode_needed = true;
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));
    let qd = start(&exec, stmt, &env).unwrap();
    assert!(qd.estate.as_ref().unwrap().use_parallel_mode);

    // disabled by configuration
    let mut stmt = select_stmt();
    stmt.parallel_mode_needed = true;
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1)))).with_config(ExecutorConfig {
        parallel: ParallelConfig::single_threaded(),
        ..ExecutorConfig::default()
    });
    let qd = start(&exec, stmt, &env).unwrap();
    assert!(!qd.estate.as_ref().unwrap().use_parallel_mode);

    // writes never run parallel
    let mut stmt = insert_stmt(ACCOUNTS, "accounts");
    stmt.parallel_mode_needed = true;
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));
    let qd = start(&exec, stmt, &env).unwrap();
    assert!(!qd.estate.as_ref().unwrap().use_parallel_mode);
}

#[test]
fn test_internal_param_array_sized_from_plan() {
    let env = env();
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))));

    let mut stmt = select_stmt();
    stmt.num_internal_params = 4;
    let qd = start(&exec, stmt, &env).unwrap();
    let estate = qd.estate.as_ref().unwrap();
    assert_eq!(estate.internal_params.len(), 4);
    assert!(estate
        .internal_params
        .iter()
        .all(|p| p.value.is_null() && !p.done));

    let qd = start(&exec, select_stmt(), &env).unwrap();
    assert!(qd.estate.as_ref().unwrap().internal_params.is_empty());
}

// ── Pluggable start strategy ─────────────────────────────────────────────

struct CountingStart {
    calls: AtomicUsize,
}

impl StartStrategy for CountingStart {
    fn start(&self, executor: &Executor, qd: &mut QueryDesc, flags: ExecFlags) -> HeronResult<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        standard_start_query(executor, qd, flags)
    }
}

#[test]
fn test_start_strategy_is_swappable() {
    let env = env();
    let strategy = Arc::new(CountingStart {
        calls: AtomicUsize::new(0),
    });
    let exec = executor(&env, Arc::new(TxnHandle::new(TxnId(1))))
        .with_start_strategy(Arc::clone(&strategy) as Arc<dyn StartStrategy>);

    let qd = start(&exec, select_stmt(), &env).unwrap();
    assert_eq!(strategy.calls.load(Ordering::Relaxed), 1);
    assert!(qd.estate.is_some());
}
