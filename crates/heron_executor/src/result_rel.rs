use heron_common::types::RangeTableIndex;
use heron_storage::catalog::Relation;

use crate::estate::InstrumentOptions;

/// Per-table bookkeeping for one write target.
///
/// One entry exists per leaf table a statement writes; partitioned-table
/// roots get their own entries in a separate array, kept only for
/// statement-level triggers and run-time row routing.
#[derive(Debug, Clone)]
pub struct ResultRelInfo {
    pub relation: Relation,
    pub rti: RangeTableIndex,
    /// Instrumentation requested for writes through this target.
    pub instrument: InstrumentOptions,
}

impl ResultRelInfo {
    pub fn new(relation: Relation, rti: RangeTableIndex, instrument: InstrumentOptions) -> Self {
        Self {
            relation,
            rti,
            instrument,
        }
    }
}
