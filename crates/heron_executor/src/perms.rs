use std::collections::HashMap;

use heron_common::error::ExecutorError;
use heron_common::types::TableId;
use heron_planner::plan::{AccessMode, RangeTblEntry};

/// Contract for checking the caller's right to touch every table named in
/// a statement's range table.
///
/// `for_execution` distinguishes the pre-execution check (privileges must
/// actually hold) from plan-time revalidation of a cached plan.
pub trait AccessChecker: Send + Sync {
    fn check(
        &self,
        range_table: &[RangeTblEntry],
        for_execution: bool,
    ) -> Result<(), ExecutorError>;
}

/// Checker that admits everything. Single-user deployments and tests.
#[derive(Debug, Default)]
pub struct AllowAllAccess;

impl AccessChecker for AllowAllAccess {
    fn check(&self, _range_table: &[RangeTblEntry], _for_execution: bool) -> Result<(), ExecutorError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Grant {
    read: bool,
    write: bool,
}

/// Table-level grants for one caller.
///
/// References that do not name a relation (subqueries, VALUES) carry no
/// privilege requirement of their own and pass through.
#[derive(Debug, Default)]
pub struct GrantTable {
    grants: HashMap<TableId, Grant>,
}

impl GrantTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_read(mut self, table: TableId) -> Self {
        self.grants.entry(table).or_default().read = true;
        self
    }

    pub fn grant_write(mut self, table: TableId) -> Self {
        let g = self.grants.entry(table).or_default();
        g.read = true;
        g.write = true;
        self
    }
}

impl AccessChecker for GrantTable {
    fn check(
        &self,
        range_table: &[RangeTblEntry],
        _for_execution: bool,
    ) -> Result<(), ExecutorError> {
        for rte in range_table {
            let Some(table_id) = rte.relation_id() else {
                continue;
            };
            let grant = self.grants.get(&table_id).copied().unwrap_or_default();
            let ok = match rte.required_access {
                AccessMode::Read => grant.read,
                AccessMode::Write => grant.write,
            };
            if !ok {
                let needed = match rte.required_access {
                    AccessMode::Read => "SELECT",
                    AccessMode::Write => "DML",
                };
                return Err(ExecutorError::PermissionDenied {
                    relation: rte.alias.clone(),
                    reason: format!("{needed} privilege missing"),
                });
            }
        }
        Ok(())
    }
}
